//! Source specifier classification and URL normalization.
//!
//! A source is whatever the user typed on the command line: `owner/repo`
//! shorthand, a GitHub or GitLab URL (optionally a `tree/<ref>/<path>`
//! browsing URL), any other git URL, or a local directory. This module
//! decides which one it is, derives the reference string stored in the
//! config, and canonicalizes stored references so re-adding a source finds
//! the block it already has.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static SHORTHAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.-]+/[\w.-]+$").expect("valid shorthand pattern"));

/// Which kind of source a specifier names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Local,
    GitHub,
    GitLab,
    Git,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::GitHub => "github",
            Self::GitLab => "gitlab",
            Self::Git => "git",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured fields of a hosted (GitHub or GitLab) repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedRepo {
    /// Canonical `https://<host>/<owner>/<repo>` URL.
    pub url: String,
    pub owner: String,
    pub repo: String,
    /// Branch, tag or commit from a `tree/<ref>` URL.
    pub git_ref: Option<String>,
    /// Path after `tree/<ref>/`, `None` when empty.
    pub hint_path: Option<String>,
}

/// A parsed source specifier. Exactly one kind per value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    /// Existing filesystem entry, resolved to an absolute directory.
    Local {
        path: PathBuf,
        hint_path: Option<String>,
    },
    GitHub(HostedRepo),
    GitLab(HostedRepo),
    /// Any other git URL or SSH spec, kept verbatim.
    Git { url: String },
}

impl SourceSpec {
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Local { .. } => SourceKind::Local,
            Self::GitHub(_) => SourceKind::GitHub,
            Self::GitLab(_) => SourceKind::GitLab,
            Self::Git { .. } => SourceKind::Git,
        }
    }

    /// URL shown to the user (the local path for local sources).
    pub fn display_url(&self) -> String {
        match self {
            Self::Local { path, .. } => path.display().to_string(),
            Self::GitHub(r) | Self::GitLab(r) => r.url.clone(),
            Self::Git { url } => url.clone(),
        }
    }

    pub fn git_ref(&self) -> Option<&str> {
        match self {
            Self::GitHub(r) | Self::GitLab(r) => r.git_ref.as_deref(),
            _ => None,
        }
    }

    pub fn hint_path(&self) -> Option<&str> {
        match self {
            Self::Local { hint_path, .. } => hint_path.as_deref(),
            Self::GitHub(r) | Self::GitLab(r) => r.hint_path.as_deref(),
            Self::Git { .. } => None,
        }
    }

    /// URL to hand to `git clone`, or `None` for local sources.
    pub fn clone_url(&self) -> Option<&str> {
        match self {
            Self::Local { .. } => None,
            Self::GitHub(r) | Self::GitLab(r) => Some(r.url.as_str()),
            Self::Git { url } => Some(url.as_str()),
        }
    }

    /// Reference string persisted as the block's `url`.
    ///
    /// `github:owner/repo[/ref]`, `gitlab:owner/repo[/ref]`, `git+<url>`
    /// (SSH specs rewritten to `git+ssh://`), or `path:<abs>`.
    pub fn flake_ref(&self) -> String {
        match self {
            Self::Local { path, .. } => format!("path:{}", path.display()),
            Self::GitHub(r) => hosted_ref("github", r),
            Self::GitLab(r) => hosted_ref("gitlab", r),
            Self::Git { url } => {
                if let Some(rest) = url.strip_prefix("git@") {
                    match rest.split_once(':') {
                        Some((host, path)) => format!("git+ssh://git@{host}/{path}"),
                        None => format!("git+ssh://{url}"),
                    }
                } else if url.starts_with("git+") {
                    url.clone()
                } else {
                    format!("git+{url}")
                }
            }
        }
    }

    /// Unsanitized name suggestion for a new block.
    pub fn name_hint(&self) -> String {
        match self {
            Self::Local { path, .. } => path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            Self::GitHub(r) | Self::GitLab(r) => format!("{}-{}", r.owner, r.repo),
            Self::Git { url } => {
                let trimmed = url.trim_end_matches('/');
                let last = trimmed
                    .rsplit(['/', ':'])
                    .next()
                    .unwrap_or(trimmed);
                last.trim_end_matches(".git").to_string()
            }
        }
    }
}

fn hosted_ref(scheme: &str, r: &HostedRepo) -> String {
    match &r.git_ref {
        Some(git_ref) => format!("{scheme}:{}/{}/{git_ref}", r.owner, r.repo),
        None => format!("{scheme}:{}/{}", r.owner, r.repo),
    }
}

/// Cheap check deciding between source mode and bare skill IDs.
pub fn looks_like_source(value: &str) -> bool {
    Path::new(value).exists()
        || value.starts_with("http://")
        || value.starts_with("https://")
        || SHORTHAND.is_match(value)
        || value.starts_with("git@")
        || value.ends_with(".git")
}

/// Classify a source specifier. Returns `None` for unsupported input.
///
/// First match wins: existing path, `owner/repo` shorthand, http(s) URL,
/// then `git@`/`.git` generic git.
pub fn parse_source_input(value: &str) -> Option<SourceSpec> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let as_path = Path::new(value);
    if as_path.exists() {
        return Some(local_source(as_path));
    }

    if SHORTHAND.is_match(value) {
        let (owner, repo) = value.split_once('/')?;
        let repo = repo.trim_end_matches(".git");
        return Some(SourceSpec::GitHub(HostedRepo {
            url: format!("https://github.com/{owner}/{repo}"),
            owner: owner.to_string(),
            repo: repo.to_string(),
            git_ref: None,
            hint_path: None,
        }));
    }

    if value.starts_with("http://") || value.starts_with("https://") {
        return Some(parse_http_source(value));
    }

    if value.starts_with("git@") || value.ends_with(".git") {
        return Some(SourceSpec::Git {
            url: value.to_string(),
        });
    }

    None
}

fn local_source(path: &Path) -> SourceSpec {
    let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| absolutize(path));
    if resolved.is_file() {
        let dir = resolved
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| resolved.clone());
        let file = resolved
            .file_name()
            .map(|n| n.to_string_lossy().to_string());
        return SourceSpec::Local {
            path: dir,
            hint_path: file,
        };
    }
    SourceSpec::Local {
        path: resolved,
        hint_path: None,
    }
}

fn parse_http_source(value: &str) -> SourceSpec {
    let generic = || SourceSpec::Git {
        url: value.to_string(),
    };

    let Ok(parsed) = Url::parse(value) else {
        return generic();
    };
    let host = parsed.host_str().unwrap_or_default().to_lowercase();
    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();
    if segments.len() < 2 {
        return generic();
    }

    let owner = segments[0].to_string();
    let repo = segments[1].trim_end_matches(".git").to_string();

    if host.contains("github.com") {
        // github.com/<owner>/<repo>/tree/<ref>/<path...>
        let (git_ref, hint_path) = tree_parts(&segments, 2);
        return SourceSpec::GitHub(HostedRepo {
            url: format!("https://github.com/{owner}/{repo}"),
            owner,
            repo,
            git_ref,
            hint_path,
        });
    }

    if host.contains("gitlab.com") {
        // gitlab.com/<owner>/<repo>/-/tree/<ref>/<path...>
        let (git_ref, hint_path) = if segments.get(2) == Some(&"-") {
            tree_parts(&segments, 3)
        } else {
            (None, None)
        };
        return SourceSpec::GitLab(HostedRepo {
            url: format!("https://gitlab.com/{owner}/{repo}"),
            owner,
            repo,
            git_ref,
            hint_path,
        });
    }

    generic()
}

/// Read `tree/<ref>/<path...>` starting at `segments[at]`.
///
/// Anything other than a literal `tree` (for example `blob`) yields nothing.
fn tree_parts(segments: &[&str], at: usize) -> (Option<String>, Option<String>) {
    if segments.get(at) != Some(&"tree") {
        return (None, None);
    }
    let Some(git_ref) = segments.get(at + 1) else {
        return (None, None);
    };
    let rest = segments[at + 2..].join("/");
    let hint = if rest.is_empty() { None } else { Some(rest) };
    (Some(git_ref.to_string()), hint)
}

/// Canonicalize a stored or candidate reference for equality comparison.
///
/// Relative `path:` values resolve against `root`. GitHub URLs are
/// lower-cased; other hosts keep their case.
pub fn normalize_url(url: &str, root: &Path) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }

    let url = url.strip_prefix("git+").unwrap_or(url);

    if let Some(rest) = url.strip_prefix("path:") {
        let rest = cut_suffix(rest);
        let path = Path::new(rest);
        let abs = if path.is_absolute() {
            clean_path(path)
        } else {
            clean_path(&root.join(path))
        };
        return Some(abs.display().to_string());
    }

    let expanded = if let Some(rest) = url.strip_prefix("github:") {
        format!("https://github.com/{rest}")
    } else if let Some(rest) = url.strip_prefix("gitlab:") {
        format!("https://gitlab.com/{rest}")
    } else {
        url.to_string()
    };

    let mut out = cut_suffix(&expanded).trim_end_matches('/').to_string();
    if let Some(stripped) = out.strip_suffix(".git") {
        out = stripped.to_string();
    }
    if out.contains("github.com") {
        out = out.to_lowercase();
    }
    Some(out)
}

fn cut_suffix(s: &str) -> &str {
    match s.find(['?', '#']) {
        Some(idx) => &s[..idx],
        None => s,
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return clean_path(path);
    }
    match std::env::current_dir() {
        Ok(cwd) => clean_path(&cwd.join(path)),
        Err(_) => clean_path(path),
    }
}

/// Lexically drop `.` and resolve `..` components.
fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Lower-case a hint and squeeze everything outside `[a-z0-9]` into single dashes.
pub fn sanitize_name(hint: &str) -> String {
    let mut out = String::with_capacity(hint.len());
    let mut pending_dash = false;
    for c in hint.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else {
            pending_dash = true;
        }
    }
    if out.is_empty() {
        "source".to_string()
    } else {
        out
    }
}

/// First of `base`, `base-2`, `base-3`, ... not already in `existing`.
pub fn unique_name(base: &str, existing: &BTreeSet<String>) -> String {
    if !existing.contains(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !existing.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}
