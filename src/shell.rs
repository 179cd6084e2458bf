//! Line-oriented command shell over the mirror stages and the reconciler

use anyhow::{bail, Context, Result};
use futures::future::{FutureExt, LocalBoxFuture};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::cell::Cell;
use tracing::{debug, error};

use crate::github::GitHubSession;
use crate::mirror::{MirrorEngine, MirrorResult, StageSummary};
use crate::reconcile::{ReconcileReport, Reconciler};

const PROMPT: &str = "hgmirror> ";

/// Commands understood by the shell and the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellCommand {
    Setup,
    CloneAll,
    PullAll,
    HgToGit,
    PushToRemotes,
    Sync,
    CreateMissing,
    Reconcile,
    Exists,
    List,
    Help,
    Quit,
}

/// Whether the shell keeps reading after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

type Handler = for<'a> fn(&'a Shell, &'a [String]) -> LocalBoxFuture<'a, Result<Flow>>;

struct CommandSpec {
    command: ShellCommand,
    name: &'static str,
    help: &'static str,
    handler: Handler,
}

const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: ShellCommand::Setup,
        name: "setup",
        help: "Create cache folders and an empty bare git repository per module",
        handler: cmd_setup,
    },
    CommandSpec {
        command: ShellCommand::CloneAll,
        name: "clone_all",
        help: "Clone all hg repositories and enable hg-git in them",
        handler: cmd_clone_all,
    },
    CommandSpec {
        command: ShellCommand::PullAll,
        name: "pull_all",
        help: "Pull and update every hg working copy",
        handler: cmd_pull_all,
    },
    CommandSpec {
        command: ShellCommand::HgToGit,
        name: "hg_to_git",
        help: "Bookmark branches and push each hg repository into its local git repository",
        handler: cmd_hg_to_git,
    },
    CommandSpec {
        command: ShellCommand::PushToRemotes,
        name: "push_to_remotes",
        help: "Mirror every local git repository to its remotes",
        handler: cmd_push_to_remotes,
    },
    CommandSpec {
        command: ShellCommand::Sync,
        name: "sync",
        help: "Run setup, clone_all, pull_all, hg_to_git and push_to_remotes",
        handler: cmd_sync,
    },
    CommandSpec {
        command: ShellCommand::CreateMissing,
        name: "create_missing",
        help: "Create GitHub repositories missing from the organization",
        handler: cmd_create_missing,
    },
    CommandSpec {
        command: ShellCommand::Reconcile,
        name: "reconcile",
        help: "Fix homepage, wiki, issues and default branch of existing GitHub repositories",
        handler: cmd_reconcile,
    },
    CommandSpec {
        command: ShellCommand::Exists,
        name: "exists",
        help: "exists <name>: check whether a GitHub repository exists",
        handler: cmd_exists,
    },
    CommandSpec {
        command: ShellCommand::List,
        name: "list",
        help: "List the mirrored repositories",
        handler: cmd_list,
    },
    CommandSpec {
        command: ShellCommand::Help,
        name: "help",
        help: "Show this help",
        handler: cmd_help,
    },
    CommandSpec {
        command: ShellCommand::Quit,
        name: "quit",
        help: "Leave the shell (also: exit, Ctrl-D)",
        handler: cmd_quit,
    },
];

impl ShellCommand {
    /// Parse a command name; dashes and underscores are interchangeable
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase().replace('-', "_");
        if name == "exit" {
            return Some(ShellCommand::Quit);
        }
        COMMANDS
            .iter()
            .find(|spec| spec.name == name)
            .map(|spec| spec.command)
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    fn spec(self) -> &'static CommandSpec {
        COMMANDS
            .iter()
            .find(|spec| spec.command == self)
            .expect("every command has a table entry")
    }
}

/// Dispatches commands to the mirror engine and the reconciler
pub struct Shell {
    engine: MirrorEngine,
    session: GitHubSession,
    failed_operations: Cell<usize>,
}

impl Shell {
    pub fn new(engine: MirrorEngine, session: GitHubSession) -> Self {
        Self {
            engine,
            session,
            failed_operations: Cell::new(0),
        }
    }

    /// Failed repository operations seen since the shell started
    pub fn failed_operations(&self) -> usize {
        self.failed_operations.get()
    }

    pub async fn execute(&self, command: ShellCommand, args: &[String]) -> Result<Flow> {
        (command.spec().handler)(self, args).await
    }

    /// Parse and run one input line
    pub async fn execute_line(&self, line: &str) -> Result<Flow> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(Flow::Continue);
        };
        let args: Vec<String> = words.map(str::to_string).collect();

        match ShellCommand::from_name(name) {
            Some(command) => self.execute(command, &args).await,
            None => bail!("Unknown command: {} (try 'help')", name),
        }
    }

    /// Read commands until quit or end of input
    pub async fn run(&self) -> Result<()> {
        let mut editor = DefaultEditor::new().context("Failed to initialize line editor")?;

        println!("hgmirror shell - type 'help' for commands");

        loop {
            let line = match editor.readline(PROMPT) {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(e) => return Err(e).context("Failed to read command"),
            };

            if line.trim().is_empty() {
                continue;
            }
            if let Err(e) = editor.add_history_entry(line.as_str()) {
                debug!("Failed to record shell history: {}", e);
            }

            match self.execute_line(&line).await {
                Ok(Flow::Exit) => break,
                Ok(Flow::Continue) => {}
                Err(e) => {
                    error!("{:#}", e);
                    println!("❌ {:#}", e);
                }
            }
        }

        Ok(())
    }

    fn record(&self, summary: &StageSummary) {
        self.failed_operations
            .set(self.failed_operations.get() + summary.failed_operations);
        print_summary(summary);
    }

    async fn reconciler_report(&self, create: bool) -> Result<ReconcileReport> {
        let client = self.session.client().await?;
        let reconciler = Reconciler::new(
            client,
            self.engine.registry(),
            &self.engine.config().hg_base_url,
        );
        let report = if create {
            reconciler.create_missing().await?
        } else {
            reconciler.reconcile_existing().await?
        };
        Ok(report)
    }
}

/// Print a stage summary in the same layout for the shell and the CLI
pub fn print_summary(summary: &StageSummary) {
    println!("\n📦 {}", summary.stage);
    for result in &summary.results {
        let icon = match result {
            MirrorResult::Failed { .. } => "❌",
            MirrorResult::Skipped { .. } => "⏭️ ",
            _ => "✅",
        };
        println!("   {} {}", icon, result);
    }
    println!(
        "   {} repositories: {} ok, {} failed, {} skipped in {:.2}s",
        summary.total_repositories,
        summary.successful_operations,
        summary.failed_operations,
        summary.skipped_operations,
        summary.duration.as_secs_f64()
    );
}

fn print_report(report: &ReconcileReport) {
    for name in &report.created {
        println!("   🆕 created {}", name);
    }
    for name in &report.updated {
        println!("   🔧 updated {}", name);
    }
    for name in &report.missing {
        println!("   ⚠️  missing {} (run create_missing)", name);
    }
    println!(
        "   {} created, {} updated, {} unchanged",
        report.created.len(),
        report.updated.len(),
        report.unchanged.len()
    );
}

fn cmd_setup<'a>(shell: &'a Shell, _args: &'a [String]) -> LocalBoxFuture<'a, Result<Flow>> {
    async move {
        let summary = shell.engine.initialize().await?;
        shell.record(&summary);
        Ok(Flow::Continue)
    }
    .boxed_local()
}

fn cmd_clone_all<'a>(shell: &'a Shell, _args: &'a [String]) -> LocalBoxFuture<'a, Result<Flow>> {
    async move {
        shell.record(&shell.engine.clone_all().await);
        Ok(Flow::Continue)
    }
    .boxed_local()
}

fn cmd_pull_all<'a>(shell: &'a Shell, _args: &'a [String]) -> LocalBoxFuture<'a, Result<Flow>> {
    async move {
        shell.record(&shell.engine.pull_all().await);
        Ok(Flow::Continue)
    }
    .boxed_local()
}

fn cmd_hg_to_git<'a>(shell: &'a Shell, _args: &'a [String]) -> LocalBoxFuture<'a, Result<Flow>> {
    async move {
        shell.record(&shell.engine.convert_all().await);
        Ok(Flow::Continue)
    }
    .boxed_local()
}

fn cmd_push_to_remotes<'a>(
    shell: &'a Shell,
    _args: &'a [String],
) -> LocalBoxFuture<'a, Result<Flow>> {
    async move {
        shell.record(&shell.engine.push_to_remotes().await);
        Ok(Flow::Continue)
    }
    .boxed_local()
}

fn cmd_sync<'a>(shell: &'a Shell, _args: &'a [String]) -> LocalBoxFuture<'a, Result<Flow>> {
    async move {
        for summary in shell.engine.sync_all().await? {
            shell.record(&summary);
        }
        Ok(Flow::Continue)
    }
    .boxed_local()
}

fn cmd_create_missing<'a>(
    shell: &'a Shell,
    _args: &'a [String],
) -> LocalBoxFuture<'a, Result<Flow>> {
    async move {
        println!("\n🔍 Checking organization for missing repositories");
        print_report(&shell.reconciler_report(true).await?);
        Ok(Flow::Continue)
    }
    .boxed_local()
}

fn cmd_reconcile<'a>(shell: &'a Shell, _args: &'a [String]) -> LocalBoxFuture<'a, Result<Flow>> {
    async move {
        println!("\n🔍 Reconciling repository settings");
        print_report(&shell.reconciler_report(false).await?);
        Ok(Flow::Continue)
    }
    .boxed_local()
}

fn cmd_exists<'a>(shell: &'a Shell, args: &'a [String]) -> LocalBoxFuture<'a, Result<Flow>> {
    async move {
        let [name] = args else {
            bail!("Usage: exists <name>");
        };
        let client = shell.session.client().await?;
        let reconciler = Reconciler::new(
            client,
            shell.engine.registry(),
            &shell.engine.config().hg_base_url,
        );
        if reconciler.repo_exists(name).await? {
            println!("✅ {}/{} exists", shell.engine.config().github.organization, name);
        } else {
            println!("❌ {}/{} does not exist", shell.engine.config().github.organization, name);
        }
        Ok(Flow::Continue)
    }
    .boxed_local()
}

fn cmd_list<'a>(shell: &'a Shell, _args: &'a [String]) -> LocalBoxFuture<'a, Result<Flow>> {
    async move {
        let registry = shell.engine.registry();
        println!("Repositories ({}):", registry.len());
        for mapping in registry {
            println!(
                "  📁 {} -> {}",
                mapping.source_path, mapping.destination_name
            );
        }
        Ok(Flow::Continue)
    }
    .boxed_local()
}

fn cmd_help<'a>(_shell: &'a Shell, _args: &'a [String]) -> LocalBoxFuture<'a, Result<Flow>> {
    async move {
        println!("Commands:");
        for spec in COMMANDS {
            println!("  {:<16} {}", spec.name, spec.help);
        }
        Ok(Flow::Continue)
    }
    .boxed_local()
}

fn cmd_quit<'a>(_shell: &'a Shell, _args: &'a [String]) -> LocalBoxFuture<'a, Result<Flow>> {
    async move { Ok(Flow::Exit) }.boxed_local()
}
