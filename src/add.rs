//! The add pipeline.
//!
//! classify source -> match or name a block -> fetch -> discover -> select
//! -> merge or insert -> stage config (+ flake) -> commit -> sync.
//!
//! Planning never touches the filesystem beyond reads and temp clones, so
//! `--dry-run` is just "plan, print, stop".

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::commit::StagedWrites;
use crate::config::Workspace;
use crate::discover::{self, DiscoverOptions, Discovery};
use crate::error::{Error, Result};
use crate::git::{self, Checkout};
use crate::nixconf::blocks::ExtractedConfig;
use crate::nixconf::{
    NewSource, build_source_block, derive_catalogs, extract_source_blocks, insert_source_block,
    update_selection_in_lines,
};
use crate::source::{SourceSpec, normalize_url, sanitize_name, unique_name};
use crate::sync;

/// How a source maps onto the config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockMatch {
    /// A block whose normalized url equals the source's.
    Existing { name: String, url: Option<String> },
    /// No such block; a new one will be created under this name.
    New { name: String },
}

impl BlockMatch {
    pub fn name(&self) -> &str {
        match self {
            Self::Existing { name, .. } | Self::New { name } => name,
        }
    }
}

/// What the user asked for in source mode.
#[derive(Debug, Clone, Default)]
pub struct SourceRequest<'a> {
    /// Explicit skill IDs (`--skill` plus extra positionals).
    pub skills: &'a [String],
    pub all: bool,
    /// Block name for a new source.
    pub name: Option<&'a str>,
}

/// The computed change to the config, not yet written.
#[derive(Debug, Clone)]
pub struct AddPlan {
    pub source_name: String,
    pub url: Option<String>,
    pub created: bool,
    pub added: Vec<String>,
    pub already: Vec<String>,
    pub changed: bool,
    pub config_text: String,
}

/// What happened to the companion flake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Updated,
    UpToDate,
    /// The external sync command ran.
    Command,
    /// No flake at the configured path.
    MissingFlake,
}

/// Result of [`apply`] and [`sync_only`].
#[derive(Debug, Clone)]
pub struct Applied {
    pub written: Vec<PathBuf>,
    pub sync: SyncStatus,
}

/// Read a file that must exist.
pub fn read_required(path: &Path) -> Result<String> {
    if !path.is_file() {
        return Err(Error::MissingFile {
            path: path.to_path_buf(),
        });
    }
    std::fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Find the block holding this source, or pick a name for a new one.
///
/// Blocks match on normalized url, so `owner/repo`, its GitHub URL and a
/// stored `github:owner/repo` all land in the same block.
pub fn resolve_block(
    config: &ExtractedConfig,
    spec: &SourceSpec,
    root: &Path,
    requested_name: Option<&str>,
) -> Result<BlockMatch> {
    let candidates: BTreeSet<String> = [spec.flake_ref(), spec.display_url()]
        .iter()
        .filter_map(|u| normalize_url(u, root))
        .collect();

    let existing = config.sources.iter().find(|block| {
        block
            .url
            .as_deref()
            .and_then(|u| normalize_url(u, root))
            .is_some_and(|u| candidates.contains(&u))
    });
    if let Some(block) = existing {
        if let Some(requested) = requested_name
            && requested != block.name
        {
            tracing::warn!(
                requested,
                existing = %block.name,
                "Source already configured under another name, ignoring --name"
            );
        }
        return Ok(BlockMatch::Existing {
            name: block.name.clone(),
            url: block.url.clone(),
        });
    }

    let used: BTreeSet<String> = config.sources.iter().map(|s| s.name.clone()).collect();
    let name = match requested_name {
        Some(requested) => {
            let name = sanitize_name(requested);
            if used.contains(&name) {
                return Err(Error::Resolution(format!(
                    "source block '{name}' already exists with a different url"
                )));
            }
            name
        }
        None => unique_name(&sanitize_name(&spec.name_hint()), &used),
    };
    Ok(BlockMatch::New { name })
}

/// Put the source on disk: local sources in place, remote ones cloned.
pub fn fetch_source(spec: &SourceSpec) -> Result<Checkout> {
    match (spec, spec.clone_url()) {
        (SourceSpec::Local { path, .. }, _) => Ok(Checkout::local(path)),
        (_, Some(url)) => git::fetch(url, spec.git_ref()),
        (_, None) => Err(Error::UnsupportedSource(spec.display_url())),
    }
}

/// Discover skills in a checkout using the workspace's discovery settings.
pub fn discover_in(
    workspace: &Workspace,
    spec: &SourceSpec,
    checkout: &Checkout,
    source_name: &str,
) -> Discovery {
    discover::discover_skills(&DiscoverOptions {
        repo_path: checkout.path(),
        path_hint: spec.hint_path(),
        source_name,
        include_internal: workspace.include_internal || discover::include_internal_from_env(),
        extra_roots: &workspace.extra_roots,
    })
}

/// Fetch and discover a source for `--list`. The config is optional here.
pub fn list_source(workspace: &Workspace, spec: &SourceSpec) -> Result<Discovery> {
    let name = if workspace.config_path.is_file() {
        let text = read_required(&workspace.config_path)?;
        let config = extract_source_blocks(&text);
        resolve_block(&config, spec, &workspace.root, None)?
            .name()
            .to_string()
    } else {
        sanitize_name(&spec.name_hint())
    };
    let checkout = fetch_source(spec)?;
    Ok(discover_in(workspace, spec, &checkout, &name))
}

/// Decide which discovered skills to enable.
///
/// Explicit IDs (each must exist), else `--all`, else the skill a hint path
/// points at, else the only skill there is.
pub fn select_skills(discovery: &Discovery, requested: &[String], all: bool) -> Result<Vec<String>> {
    let available = || discovery.ids().join(", ");

    if discovery.skills.is_empty() {
        return Err(Error::Resolution("no skills found in source".to_string()));
    }

    if !requested.is_empty() {
        let mut picked = Vec::new();
        for id in requested {
            if !discovery.contains(id) {
                return Err(Error::UnknownSkill {
                    name: id.clone(),
                    available: available(),
                });
            }
            if !picked.contains(id) {
                picked.push(id.clone());
            }
        }
        return Ok(picked);
    }

    if all {
        return Ok(discovery.ids().into_iter().map(str::to_string).collect());
    }

    if let Some(implied) = &discovery.implied_skill {
        return Ok(vec![implied.clone()]);
    }

    if let [only] = discovery.skills.as_slice() {
        return Ok(vec![only.id.clone()]);
    }

    Err(Error::Resolution(format!(
        "source has {} skills; pass --skill <id> or --all (available: {})",
        discovery.skills.len(),
        available()
    )))
}

/// Compute the config change for adding `selected` skills of `spec`.
pub fn plan_source_add(
    config_text: &str,
    spec: &SourceSpec,
    block: &BlockMatch,
    discovery: &Discovery,
    selected: &[String],
) -> Result<AddPlan> {
    let config = extract_source_blocks(config_text);
    match block {
        BlockMatch::Existing { name, url } => {
            let outcome = update_selection_in_lines(&config.lines, name, selected)?;
            Ok(AddPlan {
                source_name: name.clone(),
                url: url.clone(),
                created: false,
                added: outcome.added,
                already: outcome.already,
                changed: outcome.changed,
                config_text: config.render(&outcome.lines),
            })
        }
        BlockMatch::New { name } => {
            let layout = derive_catalogs(name, &discovery.skill_roots);
            let url = spec.flake_ref();
            let indent = config.block_indent();
            let block_lines = build_source_block(&NewSource {
                name,
                url: &url,
                flake: false,
                base_dir: &layout.base_dir,
                catalogs: &layout.catalogs,
                selection: selected,
                indent: &indent,
            });
            let lines = insert_source_block(&config.lines, &block_lines)?;

            let mut added: Vec<String> = selected.to_vec();
            added.sort();
            added.dedup();
            Ok(AddPlan {
                source_name: name.clone(),
                url: Some(url),
                created: true,
                added,
                already: Vec::new(),
                changed: true,
                config_text: config.render(&lines),
            })
        }
    }
}

/// Plan an add in source mode: resolve, fetch, discover, select, merge.
pub fn plan_add(workspace: &Workspace, spec: &SourceSpec, request: &SourceRequest<'_>) -> Result<AddPlan> {
    let config_text = read_required(&workspace.config_path)?;
    let config = extract_source_blocks(&config_text);
    let block = resolve_block(&config, spec, &workspace.root, request.name)?;
    tracing::debug!(block = ?block, kind = %spec.kind(), "Resolved source block");

    let checkout = fetch_source(spec)?;
    let discovery = discover_in(workspace, spec, &checkout, block.name());
    let selected = select_skills(&discovery, request.skills, request.all)?;

    plan_source_add(&config_text, spec, &block, &discovery, &selected)
}

/// Plan an add of bare skill IDs into an existing block.
///
/// The block is `source` when given, otherwise the config's only block.
/// IDs are not checked against the source's skills.
pub fn plan_legacy_add(config_text: &str, source: Option<&str>, ids: &[String]) -> Result<AddPlan> {
    let config = extract_source_blocks(config_text);
    let block = match source {
        Some(name) => config
            .find(name)
            .ok_or_else(|| Error::SourceNotFound(name.to_string()))?,
        None => match config.sources.as_slice() {
            [only] => only,
            [] => return Err(Error::Resolution("config has no source blocks".to_string())),
            many => {
                let names: Vec<&str> = many.iter().map(|s| s.name.as_str()).collect();
                return Err(Error::Resolution(format!(
                    "config has several sources; pass --source <name> (one of: {})",
                    names.join(", ")
                )));
            }
        },
    };

    let outcome = update_selection_in_lines(&config.lines, &block.name, ids)?;
    Ok(AddPlan {
        source_name: block.name.clone(),
        url: block.url.clone(),
        created: false,
        added: outcome.added,
        already: outcome.already,
        changed: outcome.changed,
        config_text: config.render(&outcome.lines),
    })
}

/// Plan a legacy add against the workspace config.
pub fn plan_legacy(workspace: &Workspace, source: Option<&str>, ids: &[String]) -> Result<AddPlan> {
    let config_text = read_required(&workspace.config_path)?;
    plan_legacy_add(&config_text, source, ids)
}

/// Write a plan and bring the companion flake up to date.
///
/// With the built-in sync, config and flake are committed together. With
/// an external sync command the config is committed first and the command
/// run afterwards; its failure leaves the config written.
pub fn apply(workspace: &Workspace, plan: &AddPlan) -> Result<Applied> {
    if !plan.changed {
        return Ok(Applied {
            written: Vec::new(),
            sync: SyncStatus::UpToDate,
        });
    }

    let mut writes = StagedWrites::new();
    writes.stage(&workspace.config_path, &plan.config_text)?;

    if !workspace.sync_command.is_empty() {
        let written = writes.commit()?;
        sync::run_sync_command(&workspace.sync_command, &workspace.root)?;
        return Ok(Applied {
            written,
            sync: SyncStatus::Command,
        });
    }

    let status = stage_flake_sync(workspace, &plan.config_text, &mut writes)?;
    let written = writes.commit()?;
    Ok(Applied {
        written,
        sync: status,
    })
}

/// Regenerate the companion flake from the config as it is on disk.
pub fn sync_only(workspace: &Workspace) -> Result<Applied> {
    let config_text = read_required(&workspace.config_path)?;

    if !workspace.sync_command.is_empty() {
        sync::run_sync_command(&workspace.sync_command, &workspace.root)?;
        return Ok(Applied {
            written: Vec::new(),
            sync: SyncStatus::Command,
        });
    }

    if !workspace.flake_path.is_file() {
        return Err(Error::MissingFile {
            path: workspace.flake_path.clone(),
        });
    }
    let mut writes = StagedWrites::new();
    let status = stage_flake_sync(workspace, &config_text, &mut writes)?;
    let written = writes.commit()?;
    Ok(Applied {
        written,
        sync: status,
    })
}

fn stage_flake_sync(
    workspace: &Workspace,
    config_text: &str,
    writes: &mut StagedWrites,
) -> Result<SyncStatus> {
    if !workspace.flake_path.is_file() {
        tracing::warn!(
            path = %workspace.flake_path.display(),
            "Flake not found, skipping sync"
        );
        return Ok(SyncStatus::MissingFlake);
    }

    let flake_text = read_required(&workspace.flake_path)?;
    let sources = extract_source_blocks(config_text).sources;
    let synced = sync::sync_flake_text(&flake_text, &sources)?;
    if synced == flake_text {
        return Ok(SyncStatus::UpToDate);
    }
    writes.stage(&workspace.flake_path, &synced)?;
    Ok(SyncStatus::Updated)
}
