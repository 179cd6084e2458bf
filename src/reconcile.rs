//! Remote reconciliation - keeps the GitHub organization in line with the registry
//!
//! A pass takes one snapshot of the organization's repositories, creates
//! mirrors that are missing and corrects settings that drifted. Any API failure
//! aborts the pass.

use std::collections::HashMap;
use tracing::{debug, info};

use crate::error::Result;
use crate::github::{HostingApi, NewRepository, RemoteRepository, RepositoryEdit};
use crate::mirror::DEVELOP_BRANCH;
use crate::registry::{Registry, RepositoryMapping};

/// What a reconciliation pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub unchanged: Vec<String>,
    /// Registry entries absent from the host and left alone
    pub missing: Vec<String>,
}

/// Compares the registry against the hosting organization
pub struct Reconciler<'a> {
    api: &'a dyn HostingApi,
    registry: &'a Registry,
    hg_base_url: &'a str,
}

impl<'a> Reconciler<'a> {
    pub fn new(api: &'a dyn HostingApi, registry: &'a Registry, hg_base_url: &'a str) -> Self {
        Self {
            api,
            registry,
            hg_base_url,
        }
    }

    /// Create every registry repository the organization lacks
    pub async fn create_missing(&self) -> Result<ReconcileReport> {
        let existing = self.snapshot().await?;
        let mut report = ReconcileReport::default();

        for mapping in self.registry {
            let name = &mapping.destination_name;
            if existing.contains_key(name) {
                report.unchanged.push(name.clone());
                continue;
            }

            let repository = NewRepository {
                name: name.clone(),
                description: format!("Mirror of {}", name),
                homepage: mapping.source_url(self.hg_base_url),
                has_wiki: false,
                has_issues: false,
            };
            self.api.create_repository(&repository).await?;
            report.created.push(name.clone());
        }

        info!(
            "Created {} missing repositories ({} already present)",
            report.created.len(),
            report.unchanged.len()
        );
        Ok(report)
    }

    /// Correct drifted settings on repositories that already exist
    pub async fn reconcile_existing(&self) -> Result<ReconcileReport> {
        let existing = self.snapshot().await?;
        let mut report = ReconcileReport::default();

        for mapping in self.registry {
            let name = &mapping.destination_name;
            let Some(remote) = existing.get(name) else {
                report.missing.push(name.clone());
                continue;
            };

            match self.drift_correction(mapping, remote).await? {
                Some(edit) => {
                    debug!("Correcting settings of {}: {:?}", name, edit);
                    self.api.edit_repository(&edit).await?;
                    report.updated.push(name.clone());
                }
                None => report.unchanged.push(name.clone()),
            }
        }

        info!(
            "Reconciled repositories: {} updated, {} unchanged, {} missing",
            report.updated.len(),
            report.unchanged.len(),
            report.missing.len()
        );
        Ok(report)
    }

    /// Whether the organization has a repository with this name
    pub async fn repo_exists(&self, name: &str) -> Result<bool> {
        Ok(self.api.get_repository(name).await?.is_some())
    }

    /// The full desired state, or `None` when nothing drifted
    ///
    /// `develop` only becomes the default branch once it exists remotely.
    async fn drift_correction(
        &self,
        mapping: &RepositoryMapping,
        remote: &RemoteRepository,
    ) -> Result<Option<RepositoryEdit>> {
        let homepage = mapping.source_url(self.hg_base_url);
        let mut drifted =
            remote.homepage.as_deref() != Some(homepage.as_str()) || remote.has_wiki || remote.has_issues;

        let default_branch = if remote.default_branch.as_deref() == Some(DEVELOP_BRANCH) {
            Some(DEVELOP_BRANCH.to_string())
        } else if self
            .api
            .list_branches(&mapping.destination_name)
            .await?
            .iter()
            .any(|branch| branch == DEVELOP_BRANCH)
        {
            drifted = true;
            Some(DEVELOP_BRANCH.to_string())
        } else {
            None
        };

        if !drifted {
            return Ok(None);
        }

        Ok(Some(RepositoryEdit {
            name: mapping.destination_name.clone(),
            homepage,
            has_wiki: false,
            has_issues: false,
            default_branch,
        }))
    }

    async fn snapshot(&self) -> Result<HashMap<String, RemoteRepository>> {
        Ok(self
            .api
            .list_repositories()
            .await?
            .into_iter()
            .map(|repo| (repo.name.clone(), repo))
            .collect())
    }
}
