// ABOUTME: Upstream content sources that files are templated from
// ABOUTME: Defines the repository and GraphQL traits plus GitHub API and local implementations

pub mod error;
pub mod github;
pub mod local;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use error::{Result, SourceError};
pub use github::{GithubClient, GithubRepository};
pub use local::{LocalProvider, LocalRepository};

/// Repository details exposed to templates as `repo`, `source`, etc.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub name: String,
    pub full_name: String,
    pub owner: String,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl RepositoryInfo {
    /// Build minimal details from an `owner/name` style identifier
    pub fn from_full_name(full_name: &str) -> Self {
        let (owner, name) = match full_name.rsplit_once('/') {
            Some((owner, name)) => (owner.to_string(), name.to_string()),
            None => ("local".to_string(), full_name.to_string()),
        };
        Self {
            name,
            full_name: full_name.to_string(),
            owner,
            default_branch: None,
            html_url: None,
            description: None,
        }
    }
}

#[async_trait]
pub trait Repository: Send + Sync {
    fn info(&self) -> &RepositoryInfo;

    /// Fetch the text content of `path` relative to the repository root
    async fn get_contents(&self, path: &str) -> Result<String>;
}

#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Resolve a repository by its `owner/name` identifier
    async fn get_repo(&self, name: &str) -> Result<Box<dyn Repository>>;
}

/// Executes GitHub GraphQL queries, returning the `data` member of the response
#[async_trait]
pub trait GraphqlClient: Send + Sync {
    async fn graphql(&self, query: &str, variables: serde_json::Value) -> Result<serde_json::Value>;
}
