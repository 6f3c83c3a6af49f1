// ABOUTME: Error types for upstream content sources
// ABOUTME: Distinguishes unknown repositories and files from transport failures

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Repository not found: {name}")]
    RepositoryNotFound { name: String },

    #[error("File not found: {path} in {repository}")]
    FileNotFound { repository: String, path: String },

    #[error("Invalid repository name '{name}', expected 'owner/name'")]
    InvalidName { name: String },

    #[error("GitHub API request to {url} failed with status {status}")]
    Status { url: String, status: u16 },

    #[error("Invalid API URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("GraphQL query failed: {message}")]
    Graphql { message: String },

    #[error("Failed to decode {path}: {message}")]
    Decode { path: String, message: String },

    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SourceError>;
