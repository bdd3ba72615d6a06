//! Fetching remote sources.
//!
//! Shells out to the `git` CLI for clone, checkout, and HEAD inspection.

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use crate::error::Error;

/// A repository on disk. Remote sources live in a temp dir removed on drop.
#[derive(Debug)]
pub struct Checkout {
    path: PathBuf,
    _tmp: Option<TempDir>,
}

impl Checkout {
    /// An existing local directory; nothing is cleaned up.
    pub fn local(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            _tmp: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn run_git(args: &[&str], cwd: Option<&Path>, operation: &str) -> crate::error::Result<String> {
    let mut cmd = Command::new("git");
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    let output = cmd.output().map_err(|e| Error::Io {
        context: format!("failed to run git {operation}"),
        source: e,
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(Error::Git {
            operation: operation.to_string(),
            stderr,
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Clone `url` into `target`, shallow when possible.
///
/// With a ref, tries `--depth 1 --branch <ref>` first. Commits cannot be
/// fetched that way, so on failure it falls back to a full clone followed
/// by `git checkout <ref>`.
pub fn clone(url: &str, git_ref: Option<&str>, target: &Path) -> crate::error::Result<()> {
    let target_str = target.display().to_string();

    let Some(git_ref) = git_ref else {
        run_git(
            &["clone", "--depth", "1", url, &target_str],
            None,
            &format!("clone {url}"),
        )?;
        return Ok(());
    };

    let shallow = run_git(
        &["clone", "--depth", "1", "--branch", git_ref, url, &target_str],
        None,
        &format!("clone {url}"),
    );
    if shallow.is_ok() {
        return Ok(());
    }

    tracing::debug!(url, git_ref, "Shallow clone of ref failed, retrying with full clone");
    if target.exists() {
        std::fs::remove_dir_all(target).map_err(|e| Error::Io {
            context: format!("failed to clean up {}", target.display()),
            source: e,
        })?;
    }
    run_git(&["clone", url, &target_str], None, &format!("clone {url}"))?;
    run_git(
        &["checkout", git_ref],
        Some(target),
        &format!("checkout {git_ref}"),
    )?;
    Ok(())
}

/// Get the current HEAD commit hash.
pub fn head(repo_path: &Path) -> crate::error::Result<String> {
    run_git(&["rev-parse", "HEAD"], Some(repo_path), "rev-parse HEAD")
}

/// Clone a source into a fresh temp directory.
pub fn fetch(url: &str, git_ref: Option<&str>) -> crate::error::Result<Checkout> {
    let tmp = tempfile::Builder::new()
        .prefix("skills-add-")
        .tempdir()
        .map_err(|e| Error::Io {
            context: "failed to create temp directory".to_string(),
            source: e,
        })?;
    let path = tmp.path().join("repo");

    tracing::info!(url, git_ref = git_ref.unwrap_or("HEAD"), "Cloning source");
    clone(url, git_ref, &path)?;

    match head(&path) {
        Ok(commit) => tracing::info!(url, commit = %commit, "Fetched source"),
        Err(e) => tracing::debug!(url, error = %e, "Could not read fetched HEAD"),
    }

    Ok(Checkout {
        path,
        _tmp: Some(tmp),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .arg("-C")
            .arg(dir)
            .args(args)
            .output()
            .unwrap();
        assert!(status.status.success(), "git {args:?} failed");
    }

    /// Create a git repo with an initial commit and a `dev` branch.
    fn make_repo_with_commit() -> TempDir {
        let dir = TempDir::new().unwrap();
        let p = dir.path();
        Command::new("git").args(["init"]).arg(p).output().unwrap();
        git(p, &["config", "user.email", "test@test.com"]);
        git(p, &["config", "user.name", "Test"]);
        std::fs::write(p.join("README.md"), "# Test").unwrap();
        git(p, &["add", "."]);
        git(p, &["-c", "commit.gpgsign=false", "commit", "-m", "init"]);
        git(p, &["branch", "dev"]);
        dir
    }

    fn file_url(dir: &Path) -> String {
        format!("file://{}", dir.display())
    }

    #[test]
    fn head_returns_commit_hash() {
        let repo = make_repo_with_commit();
        let hash = head(repo.path()).unwrap();
        assert_eq!(hash.len(), 40);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn head_fails_on_non_repo() {
        let dir = TempDir::new().unwrap();
        let err = head(dir.path()).unwrap_err();
        assert!(err.to_string().contains("rev-parse HEAD"));
    }

    #[test]
    fn clone_default_branch() {
        let origin = make_repo_with_commit();
        let target = TempDir::new().unwrap();
        let dest = target.path().join("clone");
        clone(&file_url(origin.path()), None, &dest).unwrap();
        assert!(dest.join("README.md").exists());
    }

    #[test]
    fn clone_named_branch() {
        let origin = make_repo_with_commit();
        let target = TempDir::new().unwrap();
        let dest = target.path().join("clone");
        clone(&file_url(origin.path()), Some("dev"), &dest).unwrap();
        assert!(dest.join(".git").exists());
    }

    #[test]
    fn clone_commit_falls_back_to_checkout() {
        let origin = make_repo_with_commit();
        let commit = head(origin.path()).unwrap();
        let target = TempDir::new().unwrap();
        let dest = target.path().join("clone");
        clone(&file_url(origin.path()), Some(&commit), &dest).unwrap();
        assert_eq!(head(&dest).unwrap(), commit);
    }

    #[test]
    fn clone_fails_with_bad_url() {
        let target = TempDir::new().unwrap();
        let dest = target.path().join("clone");
        let err = clone("file:///nonexistent/repo", None, &dest).unwrap_err();
        assert!(matches!(err, Error::Git { .. }));
    }

    #[test]
    fn fetch_keeps_checkout_until_drop() {
        let origin = make_repo_with_commit();
        let checkout = fetch(&file_url(origin.path()), None).unwrap();
        let path = checkout.path().to_path_buf();
        assert!(path.join("README.md").exists());
        drop(checkout);
        assert!(!path.exists());
    }

    #[test]
    fn local_checkout_is_just_a_path() {
        let dir = TempDir::new().unwrap();
        let checkout = Checkout::local(dir.path());
        assert_eq!(checkout.path(), dir.path());
    }
}
