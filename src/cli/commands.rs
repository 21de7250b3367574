use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::engine::EngineKind;

#[derive(Parser)]
#[command(
    name = "claude-fleet",
    about = "Parallel AI-agent orchestrator: fan tasks out to isolated worktrees, merge the survivors back",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the .fleet directory and default configuration.
    Init,

    /// Run the backlog to completion.
    Run(RunArgs),

    /// Show the state of the current or last run.
    Status,

    /// Kill leftover fleet tmux sessions and prune stale worktrees.
    Cleanup,
}

#[derive(clap::Args)]
pub struct RunArgs {
    /// Task backlog file (.yaml with groups, or a .md checklist).
    #[arg(long, default_value = "tasks.yaml")]
    pub tasks: PathBuf,

    /// Engine to drive.
    #[arg(long, value_enum)]
    pub engine: Option<EngineArg>,

    /// Model override passed through to the engine.
    #[arg(long)]
    pub model: Option<String>,

    /// Maximum number of agents in flight per batch.
    #[arg(long)]
    pub max_parallel: Option<usize>,

    /// Maximum batch iterations; 0 runs until the backlog drains.
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Branch to merge completed work into (defaults to the current branch).
    #[arg(long)]
    pub base_branch: Option<String>,

    /// Requirements file or folder copied into each workspace.
    #[arg(long)]
    pub requirements: Option<PathBuf>,

    /// Do not ask agents to run the test suite.
    #[arg(long)]
    pub skip_tests: bool,

    /// Do not ask agents to run the linter.
    #[arg(long)]
    pub skip_lint: bool,

    /// Leave completed branches unmerged.
    #[arg(long)]
    pub skip_merge: bool,

    /// Select batches and report without launching agents.
    #[arg(long)]
    pub dry_run: bool,

    /// Host each agent in a tmux session you can attach to.
    #[arg(long)]
    pub tmux: bool,

    /// Allow agents to verify behavior in a browser.
    #[arg(long)]
    pub browser: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum EngineArg {
    Claude,
    Codex,
}

impl From<EngineArg> for EngineKind {
    fn from(arg: EngineArg) -> Self {
        match arg {
            EngineArg::Claude => EngineKind::Claude,
            EngineArg::Codex => EngineKind::Codex,
        }
    }
}
