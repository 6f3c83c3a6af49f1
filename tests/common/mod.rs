// ABOUTME: Common utilities and helpers for integration tests
// ABOUTME: Lays out upstream repositories, stubs and output directories inside a temp dir

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::fs;

use actions_toolkit::report::Transcript;
use actions_toolkit::source::{LocalProvider, RepositoryInfo};
use actions_toolkit::sync::FileSync;
use actions_toolkit::template::{AuditTracker, MissingStubPolicy, TemplateEngine};

pub const DESTINATION: &str = "me/project";

pub struct TestEnvironment {
    pub temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let env = Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        };
        for dir in [env.upstreams_dir(), env.stubs_dir(), env.output_dir()] {
            std::fs::create_dir_all(dir).expect("Failed to create test directory");
        }
        env
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Root under which `owner/name` upstream repositories live
    pub fn upstreams_dir(&self) -> PathBuf {
        self.path().join("upstreams")
    }

    pub fn stubs_dir(&self) -> PathBuf {
        self.path().join("stubs")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.path().join("output")
    }

    pub fn config_file(&self) -> PathBuf {
        self.path().join("sync.yml")
    }

    async fn write(path: PathBuf, content: &str) -> PathBuf {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .expect("Failed to create parent directory");
        }
        fs::write(&path, content)
            .await
            .expect("Failed to write test file");
        path
    }

    pub async fn upstream_file(&self, repository: &str, path: &str, content: &str) -> PathBuf {
        Self::write(self.upstreams_dir().join(repository).join(path), content).await
    }

    pub async fn stub(&self, name: &str, content: &str) -> PathBuf {
        Self::write(self.stubs_dir().join(name), content).await
    }

    pub async fn output_file(&self, path: &str, content: &str) -> PathBuf {
        Self::write(self.output_dir().join(path), content).await
    }

    pub async fn write_config(&self, yaml: &str) -> PathBuf {
        Self::write(self.config_file(), yaml).await
    }

    pub async fn read_output(&self, path: &str) -> String {
        fs::read_to_string(self.output_dir().join(path))
            .await
            .expect("Failed to read output file")
    }

    pub fn provider(&self) -> LocalProvider {
        LocalProvider::new(self.upstreams_dir())
    }

    pub fn destination(&self) -> RepositoryInfo {
        RepositoryInfo::from_full_name(DESTINATION)
    }

    pub fn file_sync(&self) -> FileSync {
        self.file_sync_with(MissingStubPolicy::Pin)
    }

    pub fn file_sync_with(&self, policy: MissingStubPolicy) -> FileSync {
        let tracker = AuditTracker::new().with_missing_stub_policy(policy);
        let engine =
            TemplateEngine::new(self.stubs_dir(), tracker).expect("Failed to create engine");
        FileSync::new(engine, Transcript::quiet(), self.output_dir())
    }
}

/// True when one transcript line contains every part, whatever the column padding
pub fn has_line(text: &str, parts: &[&str]) -> bool {
    text.lines()
        .any(|line| parts.iter().all(|part| line.contains(part)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_environment_layout() {
        let env = TestEnvironment::new();
        assert!(env.stubs_dir().is_dir());

        let path = env.upstream_file("org/repo", "docs/a.md", "x").await;
        assert!(path.ends_with("upstreams/org/repo/docs/a.md"));
    }

    #[test]
    fn test_has_line() {
        assert!(has_line("* ✅ (used)    `a`\n* b", &["(used)", "`a`"]));
        assert!(!has_line("* ✅ (used)\n`a`", &["(used)", "`a`"]));
    }
}
