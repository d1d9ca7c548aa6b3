use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use qbot_core::RunOptions;
use qbot_runner::{QueueKind, QueueRunner};

#[derive(Parser)]
#[command(name = "qbot", version)]
struct Cli {
    /// Config file (default: .qbot/qbot.toml in the current directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Do not ask before discarding local changes
    #[arg(long, global = true)]
    no_confirm: bool,

    /// Stop after this many loop iterations (0 for no limit)
    #[arg(long, global = true)]
    exit_after_iteration: Option<u32>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create .qbot/ with a default config, status database and tracker directory
    Init,

    /// Build, test and land patches marked commit-queue+
    CommitQueue,

    /// Run check-style on patches up for review
    StyleQueue,

    /// Upload patches marked in-rietveld? to the code review site
    RietveldUploadQueue,

    /// Publish the commit queue's work list
    FeederQueue,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let repo_root = std::env::current_dir()?;

    let kind = match cli.cmd {
        Command::Init => {
            QueueRunner::init_repo(&repo_root)?;
            println!("Initialized qbot in {}", repo_root.display());
            return Ok(());
        }
        Command::CommitQueue => QueueKind::Commit,
        Command::StyleQueue => QueueKind::Style,
        Command::RietveldUploadQueue => QueueKind::RietveldUpload,
        Command::FeederQueue => QueueKind::Feeder,
    };

    let runner = QueueRunner::open(repo_root, cli.config)?;
    let options = RunOptions {
        confirm: !cli.no_confirm,
        iterations: cli.exit_after_iteration,
        ..RunOptions::default()
    };
    let summary = runner.run_queue(kind, options);
    tracing::debug!(?summary, "done");
    std::process::exit(summary.exit_code);
}
