//! Discover selectable skills in a fetched or local repository.
//!
//! A skill is a directory holding a `SKILL.md`. Discovery scans a handful of
//! well-known root directories (or the directory a tree URL points at) one
//! level deep, reads the minimal front matter of each `SKILL.md`, and hides
//! skills marked `internal: true` unless internal skills were requested.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Environment variable that makes internal skills visible.
pub const INCLUDE_INTERNAL_ENV: &str = "INSTALL_INTERNAL_SKILLS";

/// Root-relative directories scanned when no hint path narrows discovery.
/// The repository root itself is scanned last.
pub const CANDIDATE_ROOTS: &[&str] = &[
    "skills",
    "skills/.curated",
    "skills/.experimental",
    "skills/.system",
    ".agents/skills",
    ".claude/skills",
    ".codex/skills",
    ".cursor/skills",
    ".gemini/skills",
    ".github/skills",
];

const SKILL_FILE: &str = "SKILL.md";

/// Front-matter fields discovery cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkillMeta {
    pub name: Option<String>,
    pub internal: bool,
}

/// One discovered skill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillInfo {
    /// Directory name, or the source name for a skill at a scan root.
    pub id: String,
    pub meta: SkillMeta,
    /// Scan root relative to the repository, `.` for the repository itself.
    pub root: String,
    /// Directory holding the `SKILL.md`.
    pub path: PathBuf,
}

/// Inputs to [`discover_skills`].
#[derive(Debug, Clone)]
pub struct DiscoverOptions<'a> {
    pub repo_path: &'a Path,
    /// Repository-relative path from a tree URL or a local file.
    pub path_hint: Option<&'a str>,
    /// Id given to a skill whose `SKILL.md` sits directly in a scan root.
    pub source_name: &'a str,
    pub include_internal: bool,
    /// Appended to [`CANDIDATE_ROOTS`].
    pub extra_roots: &'a [String],
}

/// Result of [`discover_skills`].
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// Every visible skill, sorted by id. Includes `root_skill`.
    pub skills: Vec<SkillInfo>,
    pub root_skill: Option<SkillInfo>,
    /// Scan roots that produced at least one skill, in scan order.
    pub skill_roots: Vec<String>,
    /// Skill named by a hint path that points straight at a skill directory.
    pub implied_skill: Option<String>,
}

impl Discovery {
    pub fn ids(&self) -> Vec<&str> {
        self.skills.iter().map(|s| s.id.as_str()).collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.skills.iter().any(|s| s.id == id)
    }
}

/// Truthiness of an environment-style flag.
///
/// Absent, empty, `0`, `false`, `no` and `off` (any case) are false.
pub fn is_truthy(value: Option<&str>) -> bool {
    match value.map(str::trim) {
        None | Some("") => false,
        Some(v) => !matches!(
            v.to_ascii_lowercase().as_str(),
            "0" | "false" | "no" | "off"
        ),
    }
}

/// Read [`INCLUDE_INTERNAL_ENV`] from the process environment.
pub fn include_internal_from_env() -> bool {
    is_truthy(std::env::var(INCLUDE_INTERNAL_ENV).ok().as_deref())
}

/// Walk the scan roots of a repository and collect its skills.
pub fn discover_skills(opts: &DiscoverOptions<'_>) -> Discovery {
    let repo = opts.repo_path;
    let mut implied_skill = None;

    let scan_roots: Vec<PathBuf> = match opts.path_hint.map(|h| repo.join(h)) {
        Some(hinted) if hinted.is_file() => {
            vec![hinted.parent().map(Path::to_path_buf).unwrap_or_else(|| repo.to_path_buf())]
        }
        Some(hinted) if hinted.is_dir() && hinted.join(SKILL_FILE).is_file() && hinted != repo => {
            let meta = read_meta(&hinted.join(SKILL_FILE));
            if opts.include_internal || !meta.internal {
                implied_skill = hinted
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string());
            } else {
                tracing::debug!(path = %hinted.display(), "Hinted skill is internal, not implied");
            }
            vec![hinted.parent().map(Path::to_path_buf).unwrap_or_else(|| repo.to_path_buf())]
        }
        Some(hinted) if hinted.is_dir() => vec![hinted],
        Some(hinted) => {
            tracing::warn!(
                hint = %hinted.display(),
                "Hint path does not exist in repository, scanning default roots"
            );
            default_roots(repo, opts.extra_roots)
        }
        None => default_roots(repo, opts.extra_roots),
    };

    let mut discovery = Discovery {
        implied_skill,
        ..Discovery::default()
    };
    let mut seen = BTreeSet::new();

    for root in scan_roots {
        if !root.is_dir() {
            continue;
        }
        let rel = relative_root(repo, &root);
        let before = discovery.skills.len();

        let root_skill_md = root.join(SKILL_FILE);
        if root_skill_md.is_file() && discovery.root_skill.is_none() {
            let meta = read_meta(&root_skill_md);
            if visible(&meta, opts.include_internal) && seen.insert(opts.source_name.to_string()) {
                let info = SkillInfo {
                    id: opts.source_name.to_string(),
                    meta,
                    root: rel.clone(),
                    path: root.clone(),
                };
                discovery.root_skill = Some(info.clone());
                discovery.skills.push(info);
            }
        }

        for dir in skill_subdirs(&root) {
            let id = dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let meta = read_meta(&dir.join(SKILL_FILE));
            if !visible(&meta, opts.include_internal) {
                tracing::debug!(skill = %id, "Skipping internal skill");
                continue;
            }
            if !seen.insert(id.clone()) {
                tracing::debug!(skill = %id, root = %rel, "Duplicate skill id, first root wins");
                continue;
            }
            tracing::debug!(skill = %id, root = %rel, "Discovered skill");
            discovery.skills.push(SkillInfo {
                id,
                meta,
                root: rel.clone(),
                path: dir,
            });
        }

        if discovery.skills.len() > before && !discovery.skill_roots.contains(&rel) {
            discovery.skill_roots.push(rel);
        }
    }

    discovery.skills.sort_by(|a, b| a.id.cmp(&b.id));
    discovery
}

fn visible(meta: &SkillMeta, include_internal: bool) -> bool {
    include_internal || !meta.internal
}

fn default_roots(repo: &Path, extra_roots: &[String]) -> Vec<PathBuf> {
    CANDIDATE_ROOTS
        .iter()
        .map(|r| repo.join(r))
        .chain(extra_roots.iter().map(|r| repo.join(r)))
        .chain(std::iter::once(repo.to_path_buf()))
        .collect()
}

fn relative_root(repo: &Path, root: &Path) -> String {
    match root.strip_prefix(repo) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => root.display().to_string(),
    }
}

/// Immediate, non-hidden subdirectories holding a `SKILL.md`, sorted by name.
fn skill_subdirs(root: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(root) {
        Ok(e) => e,
        Err(_) => return Vec::new(),
    };

    let mut subdirs: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .map(|e| e.path())
        .filter(|p| p.join(SKILL_FILE).is_file())
        .collect();
    subdirs.sort();
    subdirs
}

fn read_meta(skill_md: &Path) -> SkillMeta {
    match std::fs::read_to_string(skill_md) {
        Ok(content) => parse_front_matter(&content),
        Err(e) => {
            tracing::debug!(path = %skill_md.display(), error = %e, "Unreadable SKILL.md");
            SkillMeta::default()
        }
    }
}

/// The `---` delimited block at the top of a markdown file, if closed.
fn front_matter_block(content: &str) -> Option<String> {
    let mut lines = content.trim_start_matches('\u{feff}').lines();
    if lines.next()?.trim_end() != "---" {
        return None;
    }
    let mut block = Vec::new();
    for line in lines {
        if line.trim_end() == "---" {
            return Some(block.join("\n"));
        }
        block.push(line);
    }
    None
}

#[derive(Debug, Default, Deserialize)]
struct RawFrontMatter {
    #[serde(default)]
    name: Option<serde_yaml::Value>,
    #[serde(default)]
    internal: Option<serde_yaml::Value>,
    #[serde(default)]
    metadata: Option<RawMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMetadata {
    #[serde(default)]
    internal: Option<serde_yaml::Value>,
}

fn yaml_true(value: Option<&serde_yaml::Value>) -> bool {
    match value {
        Some(serde_yaml::Value::Bool(b)) => *b,
        Some(serde_yaml::Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Read `name` and the `internal` flag from `SKILL.md` front matter.
///
/// YAML that does not parse (unquoted colons in descriptions are common)
/// falls back to [`scan_front_matter`].
pub fn parse_front_matter(content: &str) -> SkillMeta {
    let Some(block) = front_matter_block(content) else {
        return SkillMeta::default();
    };

    match serde_yaml::from_str::<RawFrontMatter>(&block) {
        Ok(raw) => SkillMeta {
            name: raw.name.as_ref().and_then(|v| match v {
                serde_yaml::Value::String(s) => Some(s.clone()),
                serde_yaml::Value::Number(n) => Some(n.to_string()),
                _ => None,
            }),
            internal: yaml_true(raw.internal.as_ref())
                || yaml_true(raw.metadata.as_ref().and_then(|m| m.internal.as_ref())),
        },
        Err(e) => {
            tracing::debug!(error = %e, "Front matter is not valid YAML, scanning lines");
            scan_front_matter(&block)
        }
    }
}

/// Line scan of a front-matter block.
///
/// `internal:` counts at the top level, or under `metadata:` at exactly the
/// indentation of the first child line; the `metadata:` block ends at the
/// first non-blank line indented no deeper than the key itself.
pub fn scan_front_matter(block: &str) -> SkillMeta {
    let mut meta = SkillMeta::default();
    let mut metadata_indent: Option<usize> = None;
    let mut child_indent: Option<usize> = None;

    for line in block.lines() {
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        let indent = line.len() - line.trim_start().len();
        let trimmed = line.trim();

        if let Some(key_indent) = metadata_indent {
            if indent > key_indent {
                let child = *child_indent.get_or_insert(indent);
                if indent == child
                    && let Some(value) = field_value(trimmed, "internal")
                    && value.eq_ignore_ascii_case("true")
                {
                    meta.internal = true;
                }
                continue;
            }
            metadata_indent = None;
            child_indent = None;
        }

        if indent != 0 {
            continue;
        }
        if let Some(value) = field_value(trimmed, "name") {
            if !value.is_empty() {
                meta.name = Some(value.to_string());
            }
        } else if let Some(value) = field_value(trimmed, "internal") {
            if value.eq_ignore_ascii_case("true") {
                meta.internal = true;
            }
        } else if field_value(trimmed, "metadata").is_some() {
            metadata_indent = Some(indent);
        }
    }

    meta
}

/// Value of `key: value` with surrounding quotes removed.
fn field_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(key)?.trim_start();
    let value = rest.strip_prefix(':')?.trim();
    Some(value.trim_matches('"').trim_matches('\''))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_skill(dir: &Path, front_matter: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(
            dir.join(SKILL_FILE),
            format!("---\n{front_matter}\n---\n\n# Skill\n"),
        )
        .unwrap();
    }

    fn opts<'a>(repo: &'a Path, hint: Option<&'a str>) -> DiscoverOptions<'a> {
        DiscoverOptions {
            repo_path: repo,
            path_hint: hint,
            source_name: "owner-repo",
            include_internal: false,
            extra_roots: &[],
        }
    }

    #[test]
    fn truthiness_convention() {
        assert!(!is_truthy(None));
        assert!(!is_truthy(Some("")));
        for falsy in ["0", "false", "FALSE", "no", "Off", " off "] {
            assert!(!is_truthy(Some(falsy)), "{falsy} should be false");
        }
        for truthy in ["1", "true", "yes", "on", "anything"] {
            assert!(is_truthy(Some(truthy)), "{truthy} should be true");
        }
    }

    #[test]
    fn front_matter_top_level_fields() {
        let meta = parse_front_matter("---\nname: pdf\ninternal: true\n---\nbody");
        assert_eq!(meta.name.as_deref(), Some("pdf"));
        assert!(meta.internal);
    }

    #[test]
    fn front_matter_nested_internal() {
        let meta = parse_front_matter("---\nname: x\nmetadata:\n  internal: true\n---\n");
        assert!(meta.internal);
    }

    #[test]
    fn front_matter_absent_or_unclosed() {
        assert_eq!(parse_front_matter("# Title\n"), SkillMeta::default());
        assert_eq!(parse_front_matter("---\nname: x\n"), SkillMeta::default());
    }

    #[test]
    fn invalid_yaml_falls_back_to_line_scan() {
        let block = "name: tricky\ndescription: use when: things: break\nmetadata:\n  internal: true";
        let meta = parse_front_matter(&format!("---\n{block}\n---\n"));
        assert_eq!(meta.name.as_deref(), Some("tricky"));
        assert!(meta.internal);
    }

    #[test]
    fn line_scan_is_indentation_bounded() {
        // internal under a deeper mapping is not the metadata flag
        let block = "metadata:\n  author: me\n  extra:\n    internal: true\nname: a";
        let meta = scan_front_matter(block);
        assert!(!meta.internal);
        assert_eq!(meta.name.as_deref(), Some("a"));

        // indented internal outside any metadata block is ignored
        let meta = scan_front_matter("other:\n  internal: true\n");
        assert!(!meta.internal);

        // metadata block ends at the next top-level key
        let meta = scan_front_matter("metadata:\n  version: 1\ninternal: 'true'\n");
        assert!(meta.internal);
    }

    #[test]
    fn discovers_default_roots() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path();
        write_skill(&repo.join("skills/pdf"), "name: pdf");
        write_skill(&repo.join("skills/docx"), "name: docx");
        write_skill(&repo.join(".claude/skills/review"), "name: review");
        std::fs::create_dir_all(repo.join("skills/not-a-skill")).unwrap();

        let d = discover_skills(&opts(repo, None));
        assert_eq!(d.ids(), vec!["docx", "pdf", "review"]);
        assert_eq!(d.skill_roots, vec!["skills", ".claude/skills"]);
        assert!(d.root_skill.is_none());
        assert!(d.implied_skill.is_none());
    }

    #[test]
    fn root_level_skill_uses_source_name() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "name: solo");

        let d = discover_skills(&opts(tmp.path(), None));
        assert_eq!(d.ids(), vec!["owner-repo"]);
        assert_eq!(d.skill_roots, vec!["."]);
        let root = d.root_skill.unwrap();
        assert_eq!(root.meta.name.as_deref(), Some("solo"));
        assert_eq!(root.root, ".");
    }

    #[test]
    fn internal_skills_hidden_unless_requested() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path();
        write_skill(&repo.join("skills/public"), "name: public");
        write_skill(&repo.join("skills/secret"), "name: secret\ninternal: true");
        write_skill(
            &repo.join("skills/nested"),
            "name: nested\nmetadata:\n  internal: true",
        );

        let d = discover_skills(&opts(repo, None));
        assert_eq!(d.ids(), vec!["public"]);

        let mut with_internal = opts(repo, None);
        with_internal.include_internal = true;
        let d = discover_skills(&with_internal);
        assert_eq!(d.ids(), vec!["nested", "public", "secret"]);
    }

    #[test]
    fn hint_to_skill_dir_implies_skill() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path();
        write_skill(&repo.join("skills/find-skills"), "name: find-skills");
        write_skill(&repo.join("skills/other"), "name: other");

        let d = discover_skills(&opts(repo, Some("skills/find-skills")));
        assert_eq!(d.implied_skill.as_deref(), Some("find-skills"));
        assert_eq!(d.ids(), vec!["find-skills", "other"]);
        assert_eq!(d.skill_roots, vec!["skills"]);
    }

    #[test]
    fn hint_to_internal_skill_is_not_implied() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path();
        write_skill(&repo.join("skills/hidden"), "internal: true");

        let d = discover_skills(&opts(repo, Some("skills/hidden")));
        assert!(d.implied_skill.is_none());
        assert!(d.skills.is_empty());
    }

    #[test]
    fn hint_to_plain_dir_scans_it() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path();
        write_skill(&repo.join("prompts/a"), "name: a");
        write_skill(&repo.join("skills/b"), "name: b");

        let d = discover_skills(&opts(repo, Some("prompts")));
        assert_eq!(d.ids(), vec!["a"]);
        assert_eq!(d.skill_roots, vec!["prompts"]);
    }

    #[test]
    fn hint_to_file_scans_its_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path();
        write_skill(&repo.join("pack/a"), "name: a");
        std::fs::write(repo.join("pack/README.md"), "readme").unwrap();

        let d = discover_skills(&opts(repo, Some("pack/README.md")));
        assert_eq!(d.ids(), vec!["a"]);
    }

    #[test]
    fn missing_hint_falls_back_to_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path();
        write_skill(&repo.join("skills/a"), "name: a");

        let d = discover_skills(&opts(repo, Some("does/not/exist")));
        assert_eq!(d.ids(), vec!["a"]);
    }

    #[test]
    fn extra_roots_are_scanned() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path();
        write_skill(&repo.join("custom/place/x"), "name: x");
        let extra = vec!["custom/place".to_string()];
        let mut o = opts(repo, None);
        o.extra_roots = &extra;

        let d = discover_skills(&o);
        assert_eq!(d.ids(), vec!["x"]);
        assert_eq!(d.skill_roots, vec!["custom/place"]);
    }

    #[test]
    fn duplicate_ids_first_root_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path();
        write_skill(&repo.join("skills/dup"), "name: first");
        write_skill(&repo.join(".claude/skills/dup"), "name: second");

        let d = discover_skills(&opts(repo, None));
        assert_eq!(d.skills.len(), 1);
        assert_eq!(d.skills[0].meta.name.as_deref(), Some("first"));
        assert_eq!(d.skill_roots, vec!["skills"]);
    }
}
