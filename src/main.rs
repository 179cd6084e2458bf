use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hgmirror::process::SystemRunner;
use hgmirror::shell::{Shell, ShellCommand};
use hgmirror::{Config, GitHubSession, MirrorEngine, Registry};

#[derive(Parser)]
#[command(name = "hgmirror")]
#[command(about = "Mirror Tryton Mercurial repositories to GitHub")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create cache folders and one bare git repository per module
    Setup,

    /// Clone every hg repository and enable hg-git
    CloneAll,

    /// Pull and update every hg working copy
    PullAll,

    /// Convert every hg working copy into its local git repository
    HgToGit,

    /// Mirror every local git repository to its remotes
    PushToRemotes,

    /// Run every mirror stage in order
    Sync,

    /// Create GitHub repositories missing from the organization
    CreateMissing,

    /// Correct settings of existing GitHub repositories
    Reconcile,

    /// Check whether a GitHub repository exists
    Exists {
        /// Repository name within the organization
        name: String,
    },

    /// List the mirrored repositories
    List,

    /// Start the interactive shell (default)
    Shell,
}

impl Commands {
    fn into_shell_command(self) -> Option<(ShellCommand, Vec<String>)> {
        let command = match self {
            Commands::Setup => ShellCommand::Setup,
            Commands::CloneAll => ShellCommand::CloneAll,
            Commands::PullAll => ShellCommand::PullAll,
            Commands::HgToGit => ShellCommand::HgToGit,
            Commands::PushToRemotes => ShellCommand::PushToRemotes,
            Commands::Sync => ShellCommand::Sync,
            Commands::CreateMissing => ShellCommand::CreateMissing,
            Commands::Reconcile => ShellCommand::Reconcile,
            Commands::Exists { name } => return Some((ShellCommand::Exists, vec![name])),
            Commands::List => ShellCommand::List,
            Commands::Shell => return None,
        };
        Some((command, Vec::new()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config).await?;
    init_logging(cli.verbose, &config.logging.level)?;

    info!("Starting hgmirror v{}", env!("CARGO_PKG_VERSION"));

    let registry = Registry::initialize(&config)
        .await
        .context("Failed to build repository registry")?;
    let session = GitHubSession::new(config.github.clone());
    let engine = MirrorEngine::new(config, registry, Arc::new(SystemRunner));
    let shell = Shell::new(engine, session);

    match cli.command.and_then(Commands::into_shell_command) {
        Some((command, args)) => {
            shell.execute(command, &args).await?;
            if shell.failed_operations() > 0 {
                bail!("{} repository operation(s) failed", shell.failed_operations());
            }
            Ok(())
        }
        None => shell.run().await,
    }
}

/// Initialize logging; RUST_LOG overrides the configured level
fn init_logging(verbose: bool, level: &str) -> Result<()> {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level))
            .with_context(|| format!("Invalid log level: {}", level))?
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

/// Load configuration from specified path or default location
async fn load_config(config_path: Option<std::path::PathBuf>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load(&path),
        None => Config::load_or_default(),
    }
}
