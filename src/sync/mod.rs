// ABOUTME: Templated file sync from upstream repositories
// ABOUTME: Exports configuration parsing and the per-file sync runner

pub mod config;
pub mod error;
pub mod runner;

pub use config::{parse_entry, FileEntry, FileSpec, SyncConfig};
pub use error::{EntryError, Result, SyncError, ValidationError};
pub use runner::{FileSync, DESTINATION_NAMES, SOURCE_NAMES};
