//! hgmirror - Mirror Tryton's Mercurial repositories to GitHub
//!
//! hgmirror keeps a set of Git mirrors in step with the canonical Mercurial
//! host: it clones and pulls the hg repositories, converts them with hg-git
//! into local bare repositories and pushes those to GitHub. A reconciler keeps
//! the GitHub organization itself in line with the mirrored set.
//!
//! ## Modules
//!
//! - [`config`]: YAML configuration with XDG defaults
//! - [`registry`]: which repositories are mirrored, plus the module list client
//! - [`process`]: external command execution
//! - [`hgrc`]: per-repository Mercurial configuration edits
//! - [`mirror`]: the setup, clone, pull, convert and publish stages
//! - [`github`]: GitHub API client and lazy session
//! - [`reconcile`]: creation and drift correction of GitHub repositories
//! - [`shell`]: interactive command shell

pub mod config;
pub mod error;
pub mod github;
pub mod hgrc;
pub mod mirror;
pub mod process;
pub mod reconcile;
pub mod registry;
pub mod shell;

pub use config::Config;
pub use error::{MirrorError, Result};
pub use github::{GitHubClient, GitHubSession, HostingApi};
pub use mirror::{MirrorEngine, MirrorResult, Stage, StageSummary};
pub use reconcile::{ReconcileReport, Reconciler};
pub use registry::{Registry, RepositoryMapping};
