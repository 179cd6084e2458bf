//! Error types shared by the mirroring stages and the remote reconciler

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`MirrorError`]
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Failures raised while mirroring or reconciling repositories
#[derive(Error, Debug)]
pub enum MirrorError {
    /// An external VCS command exited with a status that is not accepted
    #[error("`{command}` exited with {}: {stderr}", display_code(.code))]
    Process {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// An external command could not be started at all
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch module list from {url}: {source}")]
    ModuleList {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("GitHub API error: {0}")]
    GitHub(#[from] octocrab::Error),

    /// The clone finished but left no `.hg/hgrc` behind
    #[error("Mercurial configuration file missing: {}", .0.display())]
    ConfigurationFileMissing(PathBuf),

    #[error("working copy missing: {} (run clone_all first)", .0.display())]
    WorkingCopyMissing(PathBuf),

    #[error("destination name `{0}` is mapped more than once")]
    DuplicateDestination(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("credentials unavailable: {0}")]
    Credentials(String),
}

impl MirrorError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (terminated by signal)".to_string(),
    }
}
