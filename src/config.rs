//! Tool settings: where the skills config and companion flake live.
//!
//! The settings file lives at `~/.config/skills-add/config.toml`. Every
//! field has a default so the file is optional; CLI flags override it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top-level skills-add settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub paths: PathsConfig,
    pub discovery: DiscoveryConfig,
    pub sync: SyncConfig,
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of the dotfiles checkout. Defaults to the current directory.
    pub root: Option<PathBuf>,
    /// Skills config, relative to `root` unless absolute.
    pub config: PathBuf,
    /// Companion flake, relative to `root` unless absolute.
    pub flake: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: None,
            config: PathBuf::from("agent-skills.nix"),
            flake: PathBuf::from("flake.nix"),
        }
    }
}

/// `[discovery]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Show internal skills even without `INSTALL_INTERNAL_SKILLS`.
    pub include_internal: bool,
    /// Extra repository-relative roots to scan.
    pub extra_roots: Vec<String>,
}

/// `[sync]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// External command (argv) regenerating the flake instead of the
    /// built-in sync. Runs from the root directory.
    pub command: Vec<String>,
}

/// Command-line overrides for [`Settings::workspace`].
#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub root: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub flake: Option<PathBuf>,
}

/// Resolved locations for one run.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub flake_path: PathBuf,
    pub sync_command: Vec<String>,
    pub include_internal: bool,
    pub extra_roots: Vec<String>,
}

impl Settings {
    /// Resolve paths against the root. Flags win over the settings file.
    pub fn workspace(&self, overrides: &PathOverrides) -> Result<Workspace> {
        let root = match overrides.root.as_ref().or(self.paths.root.as_ref()) {
            Some(root) => root.clone(),
            None => std::env::current_dir().map_err(|e| Error::Io {
                context: "failed to resolve current directory".to_string(),
                source: e,
            })?,
        };
        let root = std::fs::canonicalize(&root).unwrap_or(root);

        let config = overrides.config.as_ref().unwrap_or(&self.paths.config);
        let flake = overrides.flake.as_ref().unwrap_or(&self.paths.flake);

        Ok(Workspace {
            config_path: root.join(config),
            flake_path: root.join(flake),
            root,
            sync_command: self.sync.command.clone(),
            include_internal: self.discovery.include_internal,
            extra_roots: self.discovery.extra_roots.clone(),
        })
    }
}

/// Load settings from `~/.config/skills-add/config.toml`.
///
/// Returns defaults if the file is absent. Errors if present but malformed.
pub fn load_settings() -> Result<Settings> {
    let path = settings_dir().join("config.toml");
    if !path.is_file() {
        return Ok(Settings::default());
    }
    load_settings_from(&path)
}

/// Load settings from a specific path (for testing).
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    let raw = std::fs::read_to_string(path).map_err(|e| Error::SettingsRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    toml::from_str(&raw).map_err(|e| Error::SettingsParse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// The settings directory: `~/.config/skills-add/`.
pub fn settings_dir() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".config").join("skills-add")
    } else {
        PathBuf::from("/tmp").join("skills-add").join("config")
    }
}
