//! Repository registry - which Mercurial repositories are mirrored where
//!
//! The registry is built once at startup from the statically configured
//! mappings plus the canonical module list, and is immutable afterwards.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::config::{Config, ModuleListFormat};
use crate::error::{MirrorError, Result};

/// Maps a path on the canonical Mercurial host to a Git repository name
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RepositoryMapping {
    /// Path relative to the canonical host, e.g. `modules/party`
    pub source_path: String,
    /// Name of the local bare repository and of the GitHub repository
    pub destination_name: String,
}

impl RepositoryMapping {
    pub fn new(source_path: impl Into<String>, destination_name: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            destination_name: destination_name.into(),
        }
    }

    /// URL of the repository on the canonical Mercurial host
    pub fn source_url(&self, hg_base_url: &str) -> String {
        format!(
            "{}/{}",
            hg_base_url.trim_end_matches('/'),
            self.source_path.trim_start_matches('/')
        )
    }
}

/// Immutable, ordered set of mappings with unique destination names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    mappings: Vec<RepositoryMapping>,
}

impl Registry {
    /// Create a registry, rejecting duplicate destination names
    pub fn new(mappings: Vec<RepositoryMapping>) -> Result<Self> {
        let mut seen = HashSet::new();
        for mapping in &mappings {
            if !seen.insert(mapping.destination_name.as_str()) {
                return Err(MirrorError::DuplicateDestination(
                    mapping.destination_name.clone(),
                ));
            }
        }
        Ok(Self { mappings })
    }

    /// Union of the static mappings and discovered modules
    ///
    /// Each module maps `{prefix}/{module}` to `module`. Modules whose name is
    /// already a destination are skipped, so static entries win.
    pub fn with_modules(
        static_mappings: Vec<RepositoryMapping>,
        modules: &[String],
        path_prefix: &str,
    ) -> Result<Self> {
        let mut registry = Self::new(static_mappings)?;
        let prefix = path_prefix.trim_matches('/');

        for module in modules {
            if registry.get(module).is_some() {
                debug!("Module {} already mapped, keeping existing entry", module);
                continue;
            }
            let source_path = if prefix.is_empty() {
                module.clone()
            } else {
                format!("{}/{}", prefix, module)
            };
            registry
                .mappings
                .push(RepositoryMapping::new(source_path, module.clone()));
        }

        Ok(registry)
    }

    /// Build the registry for this run, fetching the module list if configured
    pub async fn initialize(config: &Config) -> Result<Self> {
        let modules = match &config.modules.url {
            Some(url) => {
                ModuleListClient::new(url.clone(), config.modules.format)
                    .fetch()
                    .await?
            }
            None => Vec::new(),
        };

        let registry = Self::with_modules(
            config.repositories.clone(),
            &modules,
            &config.modules.path_prefix,
        )?;

        info!(
            "Registry holds {} repositories ({} static, {} modules fetched)",
            registry.len(),
            config.repositories.len(),
            modules.len()
        );
        Ok(registry)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RepositoryMapping> {
        self.mappings.iter()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Look up a mapping by destination name
    pub fn get(&self, destination_name: &str) -> Option<&RepositoryMapping> {
        self.mappings
            .iter()
            .find(|mapping| mapping.destination_name == destination_name)
    }
}

impl<'a> IntoIterator for &'a Registry {
    type Item = &'a RepositoryMapping;
    type IntoIter = std::slice::Iter<'a, RepositoryMapping>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Client for the canonical module list endpoint
pub struct ModuleListClient {
    http: reqwest::Client,
    url: String,
    format: ModuleListFormat,
}

impl ModuleListClient {
    pub fn new(url: String, format: ModuleListFormat) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
            format,
        }
    }

    /// Fetch and parse the module identifiers
    pub async fn fetch(&self) -> Result<Vec<String>> {
        debug!("Fetching module list from {}", self.url);

        let body = self
            .http
            .get(&self.url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|source| self.error(source))?
            .text()
            .await
            .map_err(|source| self.error(source))?;

        let modules = match self.format {
            ModuleListFormat::Plain => parse_plain_list(&body),
            ModuleListFormat::Html => parse_html_table(&body),
        };

        info!("Fetched {} modules from {}", modules.len(), self.url);
        Ok(modules)
    }

    fn error(&self, source: reqwest::Error) -> MirrorError {
        MirrorError::ModuleList {
            url: self.url.clone(),
            source,
        }
    }
}

/// One identifier per line; blank lines and `#` comments are ignored
pub fn parse_plain_list(body: &str) -> Vec<String> {
    dedup(
        body.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string),
    )
}

/// First cell of every table row, tags stripped
pub fn parse_html_table(body: &str) -> Vec<String> {
    let row = Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").expect("valid row regex");
    let cell = Regex::new(r"(?is)<td[^>]*>(.*?)</td>").expect("valid cell regex");
    let tag = Regex::new(r"(?s)<[^>]+>").expect("valid tag regex");

    dedup(row.captures_iter(body).filter_map(|row_caps| {
        let row_html = row_caps.get(1)?.as_str();
        let first_cell = cell.captures(row_html)?.get(1)?.as_str();
        let text = tag.replace_all(first_cell, "");
        let text = text.trim().trim_end_matches('/');
        // Index pages may list `modules/name`; keep the last segment
        let name = text.rsplit('/').next()?.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            None
        } else {
            Some(name.to_string())
        }
    }))
}

fn dedup(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items.filter(|item| seen.insert(item.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn static_mappings() -> Vec<RepositoryMapping> {
        vec![
            RepositoryMapping::new("trytond", "trytond"),
            RepositoryMapping::new("modules/party", "party"),
        ]
    }

    #[test]
    fn test_source_url_joins_without_double_slash() {
        let mapping = RepositoryMapping::new("modules/party", "party");
        assert_eq!(
            mapping.source_url("http://hg.tryton.org/"),
            "http://hg.tryton.org/modules/party"
        );
        assert_eq!(
            mapping.source_url("http://hg.tryton.org"),
            "http://hg.tryton.org/modules/party"
        );
    }

    #[test]
    fn test_duplicate_destination_rejected() {
        let mappings = vec![
            RepositoryMapping::new("modules/party", "party"),
            RepositoryMapping::new("party", "party"),
        ];

        assert_matches!(
            Registry::new(mappings),
            Err(MirrorError::DuplicateDestination(name)) if name == "party"
        );
    }

    #[test]
    fn test_modules_are_appended_in_order() {
        let modules = vec!["account".to_string(), "sale".to_string()];
        let registry = Registry::with_modules(static_mappings(), &modules, "modules").unwrap();

        let names: Vec<_> = registry
            .iter()
            .map(|m| m.destination_name.as_str())
            .collect();
        assert_eq!(names, ["trytond", "party", "account", "sale"]);
        assert_eq!(registry.get("sale").unwrap().source_path, "modules/sale");
    }

    #[test]
    fn test_static_entries_win_over_modules() {
        let modules = vec!["party".to_string()];
        let registry = Registry::with_modules(static_mappings(), &modules, "modules/").unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("party").unwrap().source_path, "modules/party");
    }

    #[test]
    fn test_parse_plain_list() {
        let body = "# Tryton modules\naccount\n\n  sale  \naccount\nstock\n";
        assert_eq!(parse_plain_list(body), ["account", "sale", "stock"]);
    }

    #[test]
    fn test_parse_html_table() {
        let body = r#"
<table class="bigtable">
  <tr><th>Name</th><th>Description</th></tr>
  <tr class="parity0">
    <td><a href="/modules/account/">modules/account</a></td>
    <td>Tryton account module</td>
  </tr>
  <tr class="parity1"><td><a href="/modules/sale/">sale</a></td><td></td></tr>
</table>
"#;
        assert_eq!(parse_html_table(body), ["account", "sale"]);
    }

    #[tokio::test]
    async fn test_fetch_plain_module_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/modules.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("account\nsale\n"))
            .mount(&server)
            .await;

        let client = ModuleListClient::new(
            format!("{}/modules.txt", server.uri()),
            ModuleListFormat::Plain,
        );

        assert_eq!(client.fetch().await.unwrap(), ["account", "sale"]);
    }

    #[tokio::test]
    async fn test_fetch_server_error_is_network_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = ModuleListClient::new(server.uri(), ModuleListFormat::Plain);

        assert_matches!(client.fetch().await, Err(MirrorError::ModuleList { .. }));
    }

    #[tokio::test]
    async fn test_initialize_without_module_url_uses_static_list() {
        let config = Config::default();
        let registry = Registry::initialize(&config).await.unwrap();

        assert_eq!(registry.len(), 3);
        assert!(registry.get("tryton").is_some());
    }

    #[tokio::test]
    async fn test_initialize_unions_fetched_modules() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/modules"))
            .respond_with(ResponseTemplate::new(200).set_body_string("party\nstock\n"))
            .mount(&server)
            .await;

        let mut config = Config::default();
        config.modules.url = Some(format!("{}/modules", server.uri()));

        let registry = Registry::initialize(&config).await.unwrap();

        assert_eq!(registry.len(), 4);
        assert_eq!(registry.get("stock").unwrap().source_path, "modules/stock");
    }
}
