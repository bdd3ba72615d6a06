//! Consolidated error types for the skills-add library.
//!
//! All library modules use `crate::error::{Error, Result}`. The binary
//! crate (`main.rs`) uses `anyhow` at the edge where appropriate.

use std::path::PathBuf;

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for skills-add library operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // -- Settings --
    #[error("failed to read settings at {path}: {source}")]
    SettingsRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse settings at {path}: {source}")]
    SettingsParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    // -- Files --
    #[error("required file not found: {}", path.display())]
    MissingFile { path: PathBuf },
    #[error("failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    // -- Git --
    #[error("git {operation} failed: {stderr}")]
    Git { operation: String, stderr: String },

    // -- Resolution --
    #[error("unsupported source: {0}")]
    UnsupportedSource(String),
    #[error("unknown skill '{name}' (available: {available})")]
    UnknownSkill { name: String, available: String },
    #[error("source '{0}' not found in config")]
    SourceNotFound(String),
    #[error("{0}")]
    Resolution(String),

    // -- Structure --
    #[error("unexpected config structure: {0}")]
    Structure(String),

    // -- Sync --
    #[error("sync command `{command}` exited with code {code}")]
    SyncCommand { command: String, code: i32 },

    // -- Generic --
    #[error("{context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },
}

impl Error {
    /// Process exit code the CLI should use for this error.
    ///
    /// A failing sync command propagates its own code; everything else is 1.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::SyncCommand { code, .. } => u8::try_from(*code)
                .ok()
                .filter(|c| *c != 0)
                .unwrap_or(1),
            _ => 1,
        }
    }
}

/// Allow converting `std::io::Error` into `Error` for `?` in simple cases.
impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Error::Io {
            context: "I/O error".to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_command_code_is_propagated() {
        let err = Error::SyncCommand {
            command: "sync.sh".to_string(),
            code: 3,
        };
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn out_of_range_codes_fall_back_to_one() {
        let err = Error::SyncCommand {
            command: "sync.sh".to_string(),
            code: -1,
        };
        assert_eq!(err.exit_code(), 1);
        assert_eq!(Error::SourceNotFound("x".into()).exit_code(), 1);
    }
}
