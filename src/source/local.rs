// ABOUTME: Local directory content source
// ABOUTME: Resolves upstream names as sub-directories of a root, for offline runs and tests

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use super::error::{Result, SourceError};
use super::{Repository, RepositoryInfo, SourceProvider};

pub struct LocalProvider {
    root: PathBuf,
}

impl LocalProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SourceProvider for LocalProvider {
    async fn get_repo(&self, name: &str) -> Result<Box<dyn Repository>> {
        let not_found = || SourceError::RepositoryNotFound {
            name: name.to_string(),
        };
        let relative = safe_relative(name).ok_or_else(not_found)?;
        let path = self.root.join(relative);
        if !fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false) {
            return Err(not_found());
        }
        Ok(Box::new(LocalRepository::new(name, path)))
    }
}

pub struct LocalRepository {
    root: PathBuf,
    info: RepositoryInfo,
}

impl LocalRepository {
    pub fn new(name: &str, root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            info: RepositoryInfo::from_full_name(name),
        }
    }
}

#[async_trait]
impl Repository for LocalRepository {
    fn info(&self) -> &RepositoryInfo {
        &self.info
    }

    async fn get_contents(&self, path: &str) -> Result<String> {
        let not_found = || SourceError::FileNotFound {
            repository: self.info.full_name.clone(),
            path: path.to_string(),
        };
        let relative = safe_relative(path).ok_or_else(not_found)?;

        match fs::read_to_string(self.root.join(relative)).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(not_found()),
            Err(e) => Err(SourceError::IoError(e)),
        }
    }
}

/// Only plain relative paths may be resolved below a root
fn safe_relative(path: &str) -> Option<&Path> {
    let path = Path::new(path);
    let plain = path
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
    (plain && !path.as_os_str().is_empty()).then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as std_fs;
    use tempfile::TempDir;

    fn upstream() -> TempDir {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("org").join("repo");
        std_fs::create_dir_all(repo.join("docs")).unwrap();
        std_fs::write(repo.join("a.txt"), "alpha\n").unwrap();
        std_fs::write(repo.join("docs").join("b.md"), "beta\n").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_get_repo_and_contents() {
        let dir = upstream();
        let provider = LocalProvider::new(dir.path());

        let repo = provider.get_repo("org/repo").await.unwrap();
        assert_eq!(repo.info().full_name, "org/repo");
        assert_eq!(repo.info().owner, "org");
        assert_eq!(repo.get_contents("a.txt").await.unwrap(), "alpha\n");
        assert_eq!(repo.get_contents("docs/b.md").await.unwrap(), "beta\n");
    }

    #[tokio::test]
    async fn test_unknown_repository() {
        let dir = upstream();
        let provider = LocalProvider::new(dir.path());

        assert!(matches!(
            provider.get_repo("org/other").await,
            Err(SourceError::RepositoryNotFound { .. })
        ));
        assert!(provider.get_repo("../escape").await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_and_escaping_paths() {
        let dir = upstream();
        let repo = LocalRepository::new("org/repo", dir.path().join("org").join("repo"));

        assert!(matches!(
            repo.get_contents("missing.txt").await,
            Err(SourceError::FileNotFound { .. })
        ));
        assert!(matches!(
            repo.get_contents("../repo/a.txt").await,
            Err(SourceError::FileNotFound { .. })
        ));
        assert!(repo.get_contents("/etc/passwd").await.is_err());
    }
}
