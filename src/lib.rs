// ABOUTME: Main library module for the actions toolkit
// ABOUTME: Exports the audited template sync, content sources, reporting and CI actions

pub mod actions;
pub mod cli;
pub mod report;
pub mod source;
pub mod sync;
pub mod template;

// Re-export commonly used types
pub use cli::{App, Args, Config};
pub use report::{CiOutputs, Transcript};
pub use source::{Repository, RepositoryInfo, SourceProvider};
pub use sync::{FileSync, SyncConfig};
pub use template::{AuditTracker, TemplateEngine};

// Error handling
pub type Result<T> = anyhow::Result<T>;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
