use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use claude_fleet::agent::{RequirementSource, RetryPolicy};
use claude_fleet::cli::{Cli, Commands, Display, RunArgs};
use claude_fleet::config::{FleetConfig, ProjectPaths};
use claude_fleet::engine::EngineKind;
use claude_fleet::error::{FleetError, Result};
use claude_fleet::git::GitRunner;
use claude_fleet::notification::Notifier;
use claude_fleet::process::tmux;
use claude_fleet::scheduler::{RunOptions, Scheduler};
use claude_fleet::state::{StateRegistry, spawn_signal_cleanup};
use claude_fleet::tasks::{MarkdownTaskSource, TaskSource, YamlTaskSource};
use claude_fleet::workspace::WorktreeProvider;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            Display::new().print_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("claude_fleet=debug")
    } else {
        EnvFilter::new("claude_fleet=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Run(args) => cmd_run(args).await,
        Commands::Status => cmd_status().await,
        Commands::Cleanup => cmd_cleanup().await,
    }
}

fn find_project_root() -> Result<PathBuf> {
    let current = std::env::current_dir()?;

    let mut path = current.as_path();
    loop {
        if path.join(".git").exists() {
            return Ok(path.to_path_buf());
        }
        path = path.parent().ok_or(FleetError::NotInGitRepo)?;
    }
}

fn ensure_initialized(paths: &ProjectPaths) -> Result<()> {
    if !paths.fleet_dir.exists() {
        return Err(FleetError::NotInitialized);
    }
    Ok(())
}

async fn cmd_init() -> Result<()> {
    let display = Display::new();
    let root = find_project_root()?;
    let paths = ProjectPaths::new(root);

    if paths.fleet_dir.exists() {
        display.print_warning("claude-fleet is already initialized in this project.");
        return Ok(());
    }

    paths.ensure_dirs().await?;
    FleetConfig::default().save(&paths.fleet_dir).await?;

    display.print_success("Initialized claude-fleet.");
    display.print_info(&format!(
        "Configuration: {}",
        paths.fleet_dir.join("config.toml").display()
    ));
    display.print_info(&format!("State file: {}", paths.state_file.display()));

    Ok(())
}

fn load_task_source(path: &PathBuf) -> Result<Box<dyn TaskSource>> {
    if !path.exists() {
        return Err(FleetError::TaskSource(format!(
            "task file not found: {}",
            path.display()
        )));
    }

    let is_markdown = path
        .extension()
        .is_some_and(|ext| ext == "md" || ext == "markdown");

    if is_markdown {
        Ok(Box::new(MarkdownTaskSource::load(path)?))
    } else {
        Ok(Box::new(YamlTaskSource::load(path)?))
    }
}

async fn cmd_run(args: RunArgs) -> Result<()> {
    let display = Display::new();
    let root = find_project_root()?;
    let paths = ProjectPaths::new(root);
    ensure_initialized(&paths)?;
    paths.ensure_dirs().await?;

    let config = FleetConfig::load(&paths.fleet_dir).await?;

    let kind: EngineKind = match args.engine {
        Some(arg) => arg.into(),
        None => config.engine.kind.parse()?,
    };
    let engine = kind.create();
    if !engine.is_available().await {
        return Err(FleetError::EngineNotFound(engine.command().to_string()));
    }

    let source = load_task_source(&paths.root.join(&args.tasks))?;

    let requirements = args.requirements.map(|path| {
        let is_folder = paths.root.join(&path).is_dir();
        RequirementSource { path, is_folder }
    });

    let options = RunOptions {
        skip_tests: args.skip_tests,
        skip_lint: args.skip_lint,
        dry_run: args.dry_run,
        max_iterations: args
            .max_iterations
            .unwrap_or(config.orchestrator.max_iterations),
        retry: RetryPolicy {
            max_retries: config.retry.max_retries,
            delay: Duration::from_secs(config.retry.delay_secs),
        },
        base_branch: args
            .base_branch
            .or_else(|| Some(config.git.base_branch.clone()).filter(|b| !b.is_empty())),
        max_parallel: args.max_parallel.unwrap_or(config.orchestrator.max_parallel),
        requirements,
        browser: args.browser,
        model_override: args.model.or_else(|| config.engine.model.clone()),
        skip_merge: args.skip_merge,
        tmux: args.tmux,
    };

    let registry = StateRegistry::new(paths.state_file.clone());
    spawn_signal_cleanup(Arc::clone(&registry));

    let notifier = Notifier::new(config.notification.clone(), Some(paths.logs_dir.clone()));
    let provider = Arc::new(WorktreeProvider::new(config.git.branch_prefix.clone()));

    let mut scheduler = Scheduler::new(
        engine,
        source,
        provider,
        Arc::clone(&registry),
        notifier,
        &paths,
        options,
    );

    let report = scheduler.run().await?;

    println!();
    display.print_header("Run summary");
    display.print_success(&format!("{} tasks completed", report.completed));
    if report.failed > 0 {
        display.print_warning(&format!("{} tasks failed", report.failed));
    }
    if !report.merged.is_empty() {
        display.print_success(&format!("{} branches merged", report.merged.len()));
    }
    for branch in &report.merge_failed {
        display.print_warning(&format!("unmerged branch kept for review: {}", branch));
    }

    Ok(())
}

async fn cmd_status() -> Result<()> {
    let display = Display::new();
    let root = find_project_root()?;
    let paths = ProjectPaths::new(root);
    ensure_initialized(&paths)?;

    match StateRegistry::read_file(&paths.state_file) {
        Some(state) => {
            display.print_header("Fleet status");
            display.print_state(&state);
        }
        None => display.print_warning("No run state recorded yet."),
    }

    Ok(())
}

async fn cmd_cleanup() -> Result<()> {
    let display = Display::new();
    let root = find_project_root()?;
    let paths = ProjectPaths::new(root.clone());
    ensure_initialized(&paths)?;

    let mut killed = 0usize;
    if let Some(state) = StateRegistry::read_file(&paths.state_file) {
        for record in state.agents.values() {
            if let Some(session) = &record.tmux_session
                && !record.status.is_terminal()
            {
                tmux::kill_session(session).await;
                killed += 1;
            }
        }
    }

    GitRunner::new(&root).worktree_prune().await;

    display.print_success(&format!(
        "Cleanup finished ({} tmux sessions killed, worktrees pruned).",
        killed
    ));

    Ok(())
}
