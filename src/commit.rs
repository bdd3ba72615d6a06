//! Two-phase multi-file writes.
//!
//! Every file a run changes is first written to a temp file next to its
//! target and fsynced. Only when all of them are staged are they renamed
//! into place, so a failure while rendering or writing the second file
//! leaves the first untouched.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// Pending whole-file replacements.
#[derive(Debug, Default)]
pub struct StagedWrites {
    staged: Vec<(PathBuf, NamedTempFile)>,
}

impl StagedWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `contents` to a temp file beside `path`.
    ///
    /// The temp file takes over the permissions of an existing target.
    pub fn stage(&mut self, path: &Path, contents: &str) -> Result<()> {
        let write_err = |source| Error::WriteFile {
            path: path.to_path_buf(),
            source,
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(contents.as_bytes()).map_err(write_err)?;
        if let Ok(meta) = std::fs::metadata(path) {
            tmp.as_file()
                .set_permissions(meta.permissions())
                .map_err(write_err)?;
        }
        tmp.as_file().sync_all().map_err(write_err)?;

        tracing::debug!(path = %path.display(), bytes = contents.len(), "Staged write");
        self.staged.push((path.to_path_buf(), tmp));
        Ok(())
    }

    /// Rename every staged file over its target, in staging order.
    pub fn commit(self) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(self.staged.len());
        for (path, tmp) in self.staged {
            tmp.persist(&path).map_err(|e| Error::WriteFile {
                path: path.clone(),
                source: e.error,
            })?;
            tracing::info!(path = %path.display(), "Wrote file");
            written.push(path);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_changes_before_commit() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.nix");
        std::fs::write(&a, "old").unwrap();

        let mut writes = StagedWrites::new();
        writes.stage(&a, "new").unwrap();
        assert_eq!(std::fs::read_to_string(&a).unwrap(), "old");

        let written = writes.commit().unwrap();
        assert_eq!(written, vec![a.clone()]);
        assert_eq!(std::fs::read_to_string(&a).unwrap(), "new");
    }

    #[test]
    fn dropped_stage_leaves_no_files_behind() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.nix");
        {
            let mut writes = StagedWrites::new();
            writes.stage(&a, "new").unwrap();
            assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
        }
        assert!(!a.exists());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn commits_multiple_files() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.nix");
        let b = tmp.path().join("flake.nix");
        let mut writes = StagedWrites::new();
        writes.stage(&a, "a").unwrap();
        writes.stage(&b, "b").unwrap();
        writes.commit().unwrap();
        assert_eq!(std::fs::read_to_string(&a).unwrap(), "a");
        assert_eq!(std::fs::read_to_string(&b).unwrap(), "b");
    }

    #[test]
    fn staging_into_missing_directory_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let mut writes = StagedWrites::new();
        let err = writes
            .stage(&tmp.path().join("missing/dir/a.nix"), "x")
            .unwrap_err();
        assert!(matches!(err, Error::WriteFile { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn keeps_existing_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.nix");
        std::fs::write(&a, "old").unwrap();
        std::fs::set_permissions(&a, std::fs::Permissions::from_mode(0o644)).unwrap();

        let mut writes = StagedWrites::new();
        writes.stage(&a, "new").unwrap();
        writes.commit().unwrap();
        let mode = std::fs::metadata(&a).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }
}
