// ABOUTME: Error types for sync configuration loading and directive parsing
// ABOUTME: Collects schema violations so they can be reported together

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Configuration file is a directory: {path}")]
    NotAFile { path: String },

    #[error("Invalid configuration:\n{}", list(.0))]
    Validation(Vec<ValidationError>),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("configuration must be a mapping of repositories to file lists, found {found}")]
    NotAMapping { found: String },

    #[error("`{name}` is not an `owner/name` repository")]
    InvalidUpstream { name: String },

    #[error("`{upstream}` must list files, found {found}")]
    NotAList { upstream: String, found: String },

    #[error("`{upstream}` file #{index}: {reason}")]
    InvalidEntry {
        upstream: String,
        index: usize,
        reason: String,
    },
}

/// A directive that passed the schema but is not actionable
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryError {
    #[error("expected `dst`")]
    MissingDestination,

    #[error("expected `src`")]
    MissingSource,
}

fn list(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

pub type Result<T> = std::result::Result<T, SyncError>;
