use async_trait::async_trait;
use octocrab::models::Repository;
use octocrab::Octocrab;
use serde::Serialize;
use std::fmt;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::GitHubConfig;
use crate::error::{MirrorError, Result};

const PER_PAGE: u8 = 100;

/// Snapshot of the settings the reconciler cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRepository {
    pub name: String,
    pub homepage: Option<String>,
    pub has_wiki: bool,
    pub has_issues: bool,
    pub default_branch: Option<String>,
}

impl From<&Repository> for RemoteRepository {
    fn from(repo: &Repository) -> Self {
        Self {
            name: repo.name.clone(),
            homepage: repo.homepage.clone().filter(|homepage| !homepage.is_empty()),
            // GitHub enables both unless told otherwise
            has_wiki: repo.has_wiki.unwrap_or(true),
            has_issues: repo.has_issues.unwrap_or(true),
            default_branch: repo.default_branch.clone(),
        }
    }
}

/// Payload for creating a repository in the organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewRepository {
    pub name: String,
    pub description: String,
    pub homepage: String,
    pub has_wiki: bool,
    pub has_issues: bool,
}

/// Payload for correcting an existing repository in a single call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryEdit {
    pub name: String,
    pub homepage: String,
    pub has_wiki: bool,
    pub has_issues: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_branch: Option<String>,
}

/// The hosting API operations the reconciler needs
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HostingApi: Send + Sync {
    /// All repositories of the organization
    async fn list_repositories(&self) -> Result<Vec<RemoteRepository>>;

    /// A single repository, `None` when the host reports it as not found
    async fn get_repository(&self, name: &str) -> Result<Option<RemoteRepository>>;

    async fn create_repository(&self, repository: &NewRepository) -> Result<()>;

    async fn edit_repository(&self, edit: &RepositoryEdit) -> Result<()>;

    /// Branch names of a repository
    async fn list_branches(&self, name: &str) -> Result<Vec<String>>;
}

/// Username and secret for the hosting API
///
/// The secret is kept in memory only and never printed.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }

    /// Resolve credentials from config, the token env var, or the terminal
    pub async fn obtain(config: &GitHubConfig) -> Result<Self> {
        let username = config.username.clone();
        let secret = config
            .token_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|secret| !secret.is_empty());

        if secret.is_some() {
            debug!("Using GitHub secret from environment");
        }

        tokio::task::spawn_blocking(move || Self::prompt(username, secret))
            .await
            .map_err(|e| MirrorError::Credentials(e.to_string()))?
    }

    fn prompt(username: Option<String>, secret: Option<String>) -> Result<Self> {
        let username = match username {
            Some(username) => username,
            None => dialoguer::Input::<String>::new()
                .with_prompt("GitHub username")
                .interact_text()
                .map_err(|e| MirrorError::Credentials(e.to_string()))?,
        };

        let secret = match secret {
            Some(secret) => secret,
            None => dialoguer::Password::new()
                .with_prompt(format!("GitHub password or token for {}", username))
                .interact()
                .map_err(|e| MirrorError::Credentials(e.to_string()))?,
        };

        Ok(Self { username, secret })
    }
}

/// GitHub client bound to the mirror organization
pub struct GitHubClient {
    client: Octocrab,
    organization: String,
}

impl GitHubClient {
    /// Authenticate and confirm the organization is reachable
    pub async fn connect(config: &GitHubConfig, credentials: Credentials) -> Result<Self> {
        let mut builder =
            Octocrab::builder().basic_auth(credentials.username.clone(), credentials.secret);
        if let Some(api_url) = &config.api_url {
            builder = builder.base_uri(api_url.clone())?;
        }
        let client = builder.build()?;

        let github = Self::with_octocrab(client, config.organization.clone());
        let org = github.client.orgs(&github.organization).get().await?;

        info!(
            "Authenticated as {} for organization {}",
            credentials.username, org.login
        );
        Ok(github)
    }

    /// Wrap an already configured octocrab instance
    pub fn with_octocrab(client: Octocrab, organization: impl Into<String>) -> Self {
        Self {
            client,
            organization: organization.into(),
        }
    }

    pub fn organization(&self) -> &str {
        &self.organization
    }
}

fn is_not_found(error: &octocrab::Error) -> bool {
    matches!(error, octocrab::Error::GitHub { source, .. } if source.status_code.as_u16() == 404)
}

#[async_trait]
impl HostingApi for GitHubClient {
    async fn list_repositories(&self) -> Result<Vec<RemoteRepository>> {
        debug!("Fetching repositories for organization: {}", self.organization);

        let mut repositories = Vec::new();
        let mut page = 1u32;

        loop {
            let page_repos = self
                .client
                .orgs(&self.organization)
                .list_repos()
                .per_page(PER_PAGE)
                .page(page)
                .send()
                .await?;

            let items = page_repos.items;
            let last_page = items.len() < PER_PAGE as usize;
            repositories.extend(items.iter().map(RemoteRepository::from));

            if last_page {
                break;
            }
            page += 1;
        }

        info!(
            "Found {} repositories for organization: {}",
            repositories.len(),
            self.organization
        );
        Ok(repositories)
    }

    async fn get_repository(&self, name: &str) -> Result<Option<RemoteRepository>> {
        match self.client.repos(&self.organization, name).get().await {
            Ok(repo) => Ok(Some(RemoteRepository::from(&repo))),
            Err(e) if is_not_found(&e) => {
                debug!("{}/{} not found", self.organization, name);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn create_repository(&self, repository: &NewRepository) -> Result<()> {
        let route = format!("/orgs/{}/repos", self.organization);
        let _created: serde_json::Value = self.client.post(route, Some(repository)).await?;

        info!("Created {}/{}", self.organization, repository.name);
        Ok(())
    }

    async fn edit_repository(&self, edit: &RepositoryEdit) -> Result<()> {
        let route = format!("/repos/{}/{}", self.organization, edit.name);
        let _edited: serde_json::Value = self.client.patch(route, Some(edit)).await?;

        info!("Updated settings of {}/{}", self.organization, edit.name);
        Ok(())
    }

    async fn list_branches(&self, name: &str) -> Result<Vec<String>> {
        let mut branches = Vec::new();
        let mut page = 1u32;

        loop {
            let page_branches = self
                .client
                .repos(&self.organization, name)
                .list_branches()
                .per_page(PER_PAGE)
                .page(page)
                .send()
                .await?;

            let items = page_branches.items;
            let last_page = items.len() < PER_PAGE as usize;
            branches.extend(items.into_iter().map(|branch| branch.name));

            if last_page {
                break;
            }
            page += 1;
        }

        Ok(branches)
    }
}

/// Lazily authenticated GitHub session
///
/// Created once by the entry point and handed to whoever needs the API. The
/// first call to [`GitHubSession::client`] asks for credentials; later calls
/// reuse the same client.
pub struct GitHubSession {
    config: GitHubConfig,
    client: OnceCell<GitHubClient>,
}

impl GitHubSession {
    pub fn new(config: GitHubConfig) -> Self {
        Self {
            config,
            client: OnceCell::new(),
        }
    }

    /// Session around an existing client, skipping authentication
    pub fn with_client(config: GitHubConfig, client: GitHubClient) -> Self {
        Self {
            config,
            client: OnceCell::new_with(Some(client)),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.client.initialized()
    }

    pub async fn client(&self) -> Result<&GitHubClient> {
        self.client
            .get_or_try_init(|| async {
                let credentials = Credentials::obtain(&self.config).await?;
                GitHubClient::connect(&self.config, credentials).await
            })
            .await
    }
}
