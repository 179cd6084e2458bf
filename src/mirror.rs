//! Mirror Engine - runs the Mercurial to Git mirroring stages
//!
//! Each stage walks the whole registry in order and records one result per
//! repository (one per remote for publishing). A failure is recorded and the
//! stage moves on to the next repository. Stages are idempotent, so an
//! interrupted pipeline can simply be run again.

use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{MirrorError, Result};
use crate::hgrc::{self, BOOKMARK_SUFFIX};
use crate::process::{CommandRunner, Invocation};
use crate::registry::{Registry, RepositoryMapping};

/// Mercurial's default named branch
pub const DEFAULT_BRANCH: &str = "default";

/// Git branch the Mercurial default branch is published as
pub const DEVELOP_BRANCH: &str = "develop";

/// The mirroring stages, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Initialize,
    Clone,
    Pull,
    Convert,
    Publish,
}

impl Stage {
    pub const PIPELINE: [Stage; 5] = [
        Stage::Initialize,
        Stage::Clone,
        Stage::Pull,
        Stage::Convert,
        Stage::Publish,
    ];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Initialize => "setup",
            Stage::Clone => "clone_all",
            Stage::Pull => "pull_all",
            Stage::Convert => "hg_to_git",
            Stage::Publish => "push_to_remotes",
        };
        f.write_str(name)
    }
}

/// Outcome for one repository (or one remote) within a stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorResult {
    /// Bare Git repository was created
    Initialized { name: String, path: PathBuf },
    /// Mercurial repository was cloned and configured for hg-git
    Cloned { name: String, path: PathBuf },
    /// Working copy was updated to the latest upstream revision
    Pulled { name: String },
    /// Bookmarks were refreshed and pushed into the bare repository
    Converted {
        name: String,
        bookmarks: Vec<String>,
        changed: bool,
    },
    /// Bare repository was mirrored to a remote
    Pushed { name: String, remote: String },
    /// Nothing to do for this repository
    Skipped { name: String, reason: String },
    /// Operation failed with error
    Failed { name: String, error: String },
}

impl MirrorResult {
    pub fn name(&self) -> &str {
        match self {
            MirrorResult::Initialized { name, .. }
            | MirrorResult::Cloned { name, .. }
            | MirrorResult::Pulled { name }
            | MirrorResult::Converted { name, .. }
            | MirrorResult::Pushed { name, .. }
            | MirrorResult::Skipped { name, .. }
            | MirrorResult::Failed { name, .. } => name,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, MirrorResult::Failed { .. })
    }
}

impl fmt::Display for MirrorResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MirrorResult::Initialized { name, path } => {
                write!(f, "{}: initialized {}", name, path.display())
            }
            MirrorResult::Cloned { name, path } => write!(f, "{}: cloned into {}", name, path.display()),
            MirrorResult::Pulled { name } => write!(f, "{}: pulled", name),
            MirrorResult::Converted {
                name,
                bookmarks,
                changed,
            } => write!(
                f,
                "{}: converted {} bookmark(s){}",
                name,
                bookmarks.len(),
                if *changed { "" } else { ", no changes" }
            ),
            MirrorResult::Pushed { name, remote } => write!(f, "{}: pushed to {}", name, remote),
            MirrorResult::Skipped { name, reason } => write!(f, "{}: skipped ({})", name, reason),
            MirrorResult::Failed { name, error } => write!(f, "{}: FAILED {}", name, error),
        }
    }
}

/// Results from a complete stage run
#[derive(Debug, Clone)]
pub struct StageSummary {
    pub stage: Stage,
    pub total_repositories: usize,
    pub successful_operations: usize,
    pub failed_operations: usize,
    pub skipped_operations: usize,
    pub duration: Duration,
    pub results: Vec<MirrorResult>,
}

impl StageSummary {
    fn compile(
        stage: Stage,
        total_repositories: usize,
        results: Vec<MirrorResult>,
        duration: Duration,
    ) -> Self {
        let mut successful_operations = 0;
        let mut failed_operations = 0;
        let mut skipped_operations = 0;

        for result in &results {
            match result {
                MirrorResult::Skipped { .. } => skipped_operations += 1,
                MirrorResult::Failed { .. } => failed_operations += 1,
                _ => successful_operations += 1,
            }
        }

        Self {
            stage,
            total_repositories,
            successful_operations,
            failed_operations,
            skipped_operations,
            duration,
            results,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed_operations > 0
    }

    /// Destination names with at least one failed operation
    pub fn failed_repositories(&self) -> HashSet<String> {
        self.results
            .iter()
            .filter(|result| result.is_failure())
            .map(|result| result.name().to_string())
            .collect()
    }
}

/// Name of the bookmark that carries `branch` into Git
pub fn bookmark_for_branch(branch: &str) -> String {
    if branch == DEFAULT_BRANCH {
        format!("{}{}", DEVELOP_BRANCH, BOOKMARK_SUFFIX)
    } else {
        format!("{}{}", branch, BOOKMARK_SUFFIX)
    }
}

/// Runs the mirroring stages over a registry
pub struct MirrorEngine {
    config: Arc<Config>,
    registry: Registry,
    runner: Arc<dyn CommandRunner>,
}

impl MirrorEngine {
    pub fn new(config: Config, registry: Registry, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            runner,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Mercurial working copy of a mapping
    pub fn hg_path(&self, mapping: &RepositoryMapping) -> PathBuf {
        Path::new(&self.config.hg_cache).join(&mapping.source_path)
    }

    /// Bare Git repository of a mapping
    pub fn git_path(&self, mapping: &RepositoryMapping) -> PathBuf {
        Path::new(&self.config.git_cache).join(&mapping.destination_name)
    }

    /// GitHub SSH remote of a mapping
    pub fn default_remote(&self, mapping: &RepositoryMapping) -> String {
        format!(
            "git@{}:{}/{}.git",
            self.config.github.ssh_host, self.config.github.organization, mapping.destination_name
        )
    }

    /// The GitHub remote followed by any configured additional remotes
    pub fn remotes_for(&self, mapping: &RepositoryMapping) -> Vec<String> {
        let mut remotes = vec![self.default_remote(mapping)];
        for remote in self.config.additional_remotes_for(&mapping.destination_name) {
            if !remotes.contains(remote) {
                remotes.push(remote.clone());
            }
        }
        remotes
    }

    /// Create cache roots and a bare Git repository per mapping
    pub async fn initialize(&self) -> Result<StageSummary> {
        for root in [&self.config.hg_cache, &self.config.git_cache] {
            tokio::fs::create_dir_all(root)
                .await
                .map_err(|e| MirrorError::io(root, e))?;
        }

        Ok(self
            .run_stage(Stage::Initialize, |mapping| async move {
                vec![outcome(mapping, self.initialize_repository(mapping).await)]
            })
            .await)
    }

    /// Clone every missing Mercurial repository and enable hg-git in it
    pub async fn clone_all(&self) -> StageSummary {
        self.run_stage(Stage::Clone, |mapping| async move {
            vec![outcome(mapping, self.clone_repository(mapping).await)]
        })
        .await
    }

    /// Update every working copy from upstream
    pub async fn pull_all(&self) -> StageSummary {
        self.run_stage(Stage::Pull, |mapping| async move {
            vec![outcome(mapping, self.pull_repository(mapping).await)]
        })
        .await
    }

    /// Refresh bookmarks and push each working copy into its bare repository
    pub async fn convert_all(&self) -> StageSummary {
        self.run_stage(Stage::Convert, |mapping| async move {
            vec![outcome(mapping, self.convert_repository(mapping).await)]
        })
        .await
    }

    /// Mirror every bare repository to all of its remotes
    pub async fn push_to_remotes(&self) -> StageSummary {
        self.publish(&HashSet::new()).await
    }

    /// Run every stage in order
    ///
    /// Repositories whose conversion failed are not published, so a remote
    /// never receives a half-converted mirror.
    pub async fn sync_all(&self) -> Result<Vec<StageSummary>> {
        let mut summaries = vec![self.initialize().await?];
        summaries.push(self.clone_all().await);
        summaries.push(self.pull_all().await);

        let converted = self.convert_all().await;
        let held_back = converted.failed_repositories();
        summaries.push(converted);

        summaries.push(self.publish(&held_back).await);
        Ok(summaries)
    }

    async fn publish(&self, held_back: &HashSet<String>) -> StageSummary {
        self.run_stage(Stage::Publish, |mapping| async move {
            if held_back.contains(&mapping.destination_name) {
                return vec![MirrorResult::Skipped {
                    name: mapping.destination_name.clone(),
                    reason: "conversion failed".to_string(),
                }];
            }
            self.push_repository(mapping).await
        })
        .await
    }

    async fn run_stage<'a, F, Fut>(&'a self, stage: Stage, operation: F) -> StageSummary
    where
        F: Fn(&'a RepositoryMapping) -> Fut,
        Fut: Future<Output = Vec<MirrorResult>>,
    {
        let start_time = Instant::now();
        let parallel = self.config.sync.max_parallel.max(1);

        info!(
            "Running {} over {} repositories (parallel={})",
            stage,
            self.registry.len(),
            parallel
        );

        // `buffered` keeps results in registry order
        let results: Vec<MirrorResult> = stream::iter(self.registry.iter())
            .map(operation)
            .buffered(parallel)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .flatten()
            .collect();

        let summary =
            StageSummary::compile(stage, self.registry.len(), results, start_time.elapsed());

        info!(
            "{} completed in {:.2}s: {} successful, {} failed, {} skipped",
            stage,
            summary.duration.as_secs_f64(),
            summary.successful_operations,
            summary.failed_operations,
            summary.skipped_operations
        );

        summary
    }

    async fn initialize_repository(&self, mapping: &RepositoryMapping) -> Result<MirrorResult> {
        let path = self.git_path(mapping);
        if path.exists() {
            return Ok(skipped(mapping, "already initialized"));
        }

        let invocation = Invocation::new("git").args(["init", "--bare"]).arg(&path);
        self.runner.run(&invocation).await?.ensure_success(&invocation)?;

        info!("Initialized bare repository {}", path.display());
        Ok(MirrorResult::Initialized {
            name: mapping.destination_name.clone(),
            path,
        })
    }

    async fn clone_repository(&self, mapping: &RepositoryMapping) -> Result<MirrorResult> {
        let path = self.hg_path(mapping);
        if path.exists() {
            debug!("{} is already cloned", path.display());
            return Ok(skipped(mapping, "already cloned"));
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MirrorError::io(parent, e))?;
        }

        let url = mapping.source_url(&self.config.hg_base_url);
        info!("Cloning {} -> {}", url, path.display());

        let invocation = Invocation::new("hg").arg("clone").arg(&url).arg(&path);
        let cloned = match self.runner.run(&invocation).await {
            Ok(output) => output.ensure_success(&invocation).map(drop),
            Err(e) => Err(e),
        };

        // A clone without its hgrc cannot be converted; drop it so the
        // next clone_all starts over
        if let Err(e) = cloned.and_then(|()| hgrc::enable_hggit(&path)) {
            remove_partial_clone(&path).await;
            return Err(e);
        }

        Ok(MirrorResult::Cloned {
            name: mapping.destination_name.clone(),
            path,
        })
    }

    async fn pull_repository(&self, mapping: &RepositoryMapping) -> Result<MirrorResult> {
        let path = self.existing_working_copy(mapping)?;

        let invocation = Invocation::new("hg")
            .arg("--cwd")
            .arg(&path)
            .args(["pull", "-u"]);
        self.runner.run(&invocation).await?.ensure_success(&invocation)?;

        Ok(MirrorResult::Pulled {
            name: mapping.destination_name.clone(),
        })
    }

    async fn convert_repository(&self, mapping: &RepositoryMapping) -> Result<MirrorResult> {
        let path = self.existing_working_copy(mapping)?;

        let mut bookmarks = Vec::new();
        for branch in self.branch_names(&path).await? {
            let bookmark = bookmark_for_branch(&branch);
            let invocation = Invocation::new("hg")
                .arg("--cwd")
                .arg(&path)
                .args(["bookmark", "-f", "-r", branch.as_str(), bookmark.as_str()]);
            self.runner.run(&invocation).await?.ensure_success(&invocation)?;
            bookmarks.push(bookmark);
        }

        let target = absolute(&self.git_path(mapping))?;
        let invocation = Invocation::new("hg")
            .arg("--cwd")
            .arg(&path)
            .arg("push")
            .arg(&target);
        let no_change = self.config.convert.no_change_exit_code;
        let output = self
            .runner
            .run(&invocation)
            .await?
            .check(&invocation, &[0, no_change])?;

        let changed = output.success();
        if !changed {
            debug!("No changes to push for {}", mapping.destination_name);
        }

        Ok(MirrorResult::Converted {
            name: mapping.destination_name.clone(),
            bookmarks,
            changed,
        })
    }

    async fn push_repository(&self, mapping: &RepositoryMapping) -> Vec<MirrorResult> {
        let git_dir = self.git_path(mapping);
        if !git_dir.exists() {
            let error = MirrorError::WorkingCopyMissing(git_dir);
            return vec![outcome(mapping, Err(error))];
        }

        let mut results = Vec::new();
        for remote in self.remotes_for(mapping) {
            info!("Pushing {} to {}", mapping.destination_name, remote);

            let invocation = Invocation::new("git")
                .arg(format!("--git-dir={}", git_dir.display()))
                .args(["push", "--mirror"])
                .arg(&remote);

            let pushed = match self.runner.run(&invocation).await {
                Ok(output) => output.ensure_success(&invocation).map(drop),
                Err(e) => Err(e),
            };

            results.push(match pushed {
                Ok(()) => MirrorResult::Pushed {
                    name: mapping.destination_name.clone(),
                    remote,
                },
                Err(e) => {
                    warn!("Push of {} to {} failed: {}", mapping.destination_name, remote, e);
                    MirrorResult::Failed {
                        name: mapping.destination_name.clone(),
                        error: format!("{}: {}", remote, e),
                    }
                }
            });
        }
        results
    }

    async fn branch_names(&self, path: &Path) -> Result<Vec<String>> {
        let invocation = Invocation::new("hg")
            .arg("--cwd")
            .arg(path)
            .args(["branches", "--template", "{branch}\n"]);
        let output = self
            .runner
            .run(&invocation)
            .await?
            .ensure_success(&invocation)?;

        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn existing_working_copy(&self, mapping: &RepositoryMapping) -> Result<PathBuf> {
        let path = self.hg_path(mapping);
        if path.is_dir() {
            Ok(path)
        } else {
            Err(MirrorError::WorkingCopyMissing(path))
        }
    }
}

fn outcome(mapping: &RepositoryMapping, result: Result<MirrorResult>) -> MirrorResult {
    result.unwrap_or_else(|e| {
        warn!("{} failed: {}", mapping.destination_name, e);
        MirrorResult::Failed {
            name: mapping.destination_name.clone(),
            error: e.to_string(),
        }
    })
}

fn skipped(mapping: &RepositoryMapping, reason: &str) -> MirrorResult {
    MirrorResult::Skipped {
        name: mapping.destination_name.clone(),
        reason: reason.to_string(),
    }
}

async fn remove_partial_clone(path: &Path) {
    if path.exists() {
        if let Err(e) = tokio::fs::remove_dir_all(path).await {
            warn!("Failed to remove partial clone {}: {}", path.display(), e);
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .map_err(|e| MirrorError::io(path, e))
}
