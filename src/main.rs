//! skills-add CLI
//!
//! Binary entry point. CLI parsing (clap), logging setup, and user-facing
//! output. Core logic lives in the library crate.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;

use skills_add::add::{self, AddPlan, Applied, SourceRequest, SyncStatus};
use skills_add::config::{self, PathOverrides, Workspace};
use skills_add::discover::Discovery;
use skills_add::error::Error;
use skills_add::source::{looks_like_source, parse_source_input};

#[derive(Parser, Debug)]
#[command(name = "skills-add", version)]
#[command(about = "Add agent skill sources to a declarative Nix skills config")]
struct Cli {
    /// Source (owner/repo, URL, or local path) followed by skill IDs, or
    /// bare skill IDs to merge into an existing source
    args: Vec<String>,

    /// List the source's skills and exit
    #[arg(short, long)]
    list: bool,

    /// Skills to enable (can be given several times)
    #[arg(short, long, num_args = 1..)]
    skill: Vec<String>,

    /// Enable every discovered skill
    #[arg(long)]
    all: bool,

    /// Skip confirmations
    #[arg(short, long)]
    yes: bool,

    /// Show what would change without writing any file
    #[arg(long)]
    dry_run: bool,

    /// Accepted for compatibility; has no effect
    #[arg(short, long)]
    global: bool,

    /// Accepted for compatibility; has no effect
    #[arg(short, long, num_args = 1..)]
    agent: Vec<String>,

    /// Source block to merge bare skill IDs into
    #[arg(long, visible_alias = "src")]
    source: Option<String>,

    /// Block name for a new source (default: derived from the source)
    #[arg(long)]
    name: Option<String>,

    /// Print --list output as JSON
    #[arg(long, requires = "list")]
    json: bool,

    /// Only regenerate the companion flake from the config
    #[arg(long, conflicts_with_all = ["list", "dry_run"])]
    sync_only: bool,

    /// Root of the dotfiles checkout (default: settings file, then cwd)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Skills config file, relative to the root
    #[arg(long)]
    config: Option<PathBuf>,

    /// Companion flake, relative to the root
    #[arg(long)]
    flake: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version come through here too. A failed write
            // to the terminal leaves nowhere to report it, so only the exit
            // code is kept.
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    init_tracing(&cli.log_level);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            let code = e.downcast_ref::<Error>().map_or(1, Error::exit_code);
            ExitCode::from(code)
        }
    }
}

fn init_tracing(level: &str) {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    match format!("skills_add={level}").parse() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(_) => eprintln!("Warning: invalid log level '{level}', ignoring"),
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = config::load_settings()?;
    let workspace = settings.workspace(&PathOverrides {
        root: cli.root.clone(),
        config: cli.config.clone(),
        flake: cli.flake.clone(),
    })?;
    tracing::debug!(
        root = %workspace.root.display(),
        config = %workspace.config_path.display(),
        flake = %workspace.flake_path.display(),
        "Resolved workspace"
    );

    if cli.global {
        eprintln!("Warning: --global has no effect; sources are added to the config only");
    }
    if !cli.agent.is_empty() {
        eprintln!("Warning: --agent has no effect; sources are added to the config only");
    }
    if cli.yes {
        tracing::debug!("--yes given, nothing to confirm");
    }

    if cli.sync_only {
        let applied = add::sync_only(&workspace)?;
        print_applied(&workspace, &applied);
        if applied.sync == SyncStatus::UpToDate {
            println!("{} is up to date.", workspace.flake_path.display());
        }
        return Ok(());
    }

    let plan = match cli.args.split_first() {
        Some((first, rest)) if looks_like_source(first) => {
            let spec = parse_source_input(first)
                .ok_or_else(|| Error::UnsupportedSource(first.clone()))?;
            if let Some(source) = &cli.source {
                eprintln!("Warning: --source {source} is ignored when a source is given");
            }

            if cli.list {
                let discovery = add::list_source(&workspace, &spec)?;
                print_list(&discovery, cli.json)?;
                return Ok(());
            }

            let mut skills = cli.skill.clone();
            skills.extend(rest.iter().cloned());
            add::plan_add(
                &workspace,
                &spec,
                &SourceRequest {
                    skills: &skills,
                    all: cli.all,
                    name: cli.name.as_deref(),
                },
            )?
        }
        _ => {
            if cli.list {
                anyhow::bail!(Error::Resolution("--list needs a source".to_string()));
            }
            let mut ids = cli.args.clone();
            ids.extend(cli.skill.iter().cloned());
            if ids.is_empty() {
                anyhow::bail!(Error::Resolution(
                    "nothing to add: pass a source or skill IDs (see --help)".to_string()
                ));
            }
            add::plan_legacy(&workspace, cli.source.as_deref(), &ids)?
        }
    };

    print_plan(&plan);

    if cli.dry_run {
        if plan.changed {
            println!(
                "Dry run: {} not written.",
                workspace.config_path.display()
            );
        }
        return Ok(());
    }

    let applied = add::apply(&workspace, &plan)?;
    print_applied(&workspace, &applied);
    Ok(())
}

#[derive(Serialize)]
struct ListedSkill<'a> {
    id: &'a str,
    name: Option<&'a str>,
    internal: bool,
    root: &'a str,
}

fn print_list(discovery: &Discovery, json: bool) -> anyhow::Result<()> {
    if json {
        let listed: Vec<ListedSkill<'_>> = discovery
            .skills
            .iter()
            .map(|s| ListedSkill {
                id: &s.id,
                name: s.meta.name.as_deref(),
                internal: s.meta.internal,
                root: &s.root,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&listed)?);
        return Ok(());
    }

    for id in discovery.ids() {
        println!("{id}");
    }
    Ok(())
}

fn print_plan(plan: &AddPlan) {
    let url = plan.url.as_deref().unwrap_or("no url");
    if plan.created {
        println!("Creating source '{}' ({url})", plan.source_name);
    } else {
        println!("Using source '{}' ({url})", plan.source_name);
    }
    for id in &plan.added {
        println!("  + {id}");
    }
    for id in &plan.already {
        println!("  = {id} (already selected)");
    }
    if !plan.changed {
        println!("Nothing to change.");
    }
}

fn print_applied(workspace: &Workspace, applied: &Applied) {
    for path in &applied.written {
        println!("Wrote {}", path.display());
    }
    match applied.sync {
        SyncStatus::Updated | SyncStatus::UpToDate => {}
        SyncStatus::Command => println!("Ran sync command: {}", workspace.sync_command.join(" ")),
        SyncStatus::MissingFlake => println!(
            "Skipped sync: {} not found.",
            workspace.flake_path.display()
        ),
    }
}
