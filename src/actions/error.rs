// ABOUTME: Error types for the standalone CI actions
// ABOUTME: Covers file access, remote fetches, external commands and content parsing failures

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ActionError {
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to access {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid JSON in {origin}: {source}")]
    JsonError {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid YAML in {origin}: {source}")]
    YamlError {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid pattern: {0}")]
    PatternError(#[from] regex::Error),

    #[error("`{command}` failed: {message}")]
    CommandError { command: String, message: String },

    #[error(transparent)]
    ReportError(#[from] crate::report::ReportError),

    #[error(transparent)]
    SourceError(#[from] crate::source::SourceError),
}

impl ActionError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| ActionError::IoError { path, source }
    }
}

pub type Result<T> = std::result::Result<T, ActionError>;
