// ABOUTME: Configuration management for the actions toolkit
// ABOUTME: Loads settings from YAML files and merges GitHub Actions environment variables

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::actions::allure::{DEFAULT_ALLURE, DEFAULT_PAGES_DIR};
use crate::template::{MissingStubPolicy, OptionalVariablePolicy};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub github: GithubConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub allure: AllureConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GithubConfig {
    pub api_url: Option<String>,
    pub token: Option<String>,
    /// Repository the workflow runs in, where synced files are written
    pub repository: Option<String>,
}

/// Token file read when no token is configured
const TOKEN_FILE: &str = ".github_token";

impl GithubConfig {
    /// The configured token, falling back to `~/.github_token`
    pub fn resolve_token(&self) -> Option<String> {
        self.token.clone().or_else(|| {
            dirs::home_dir().and_then(|home| read_token_file(&home.join(TOKEN_FILE)))
        })
    }
}

fn read_token_file(path: &Path) -> Option<String> {
    let token = std::fs::read_to_string(path).ok()?;
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllureConfig {
    /// Allure executable, overridden by `ALLURE_PATH`
    #[serde(default = "default_allure_path")]
    pub path: String,
    #[serde(default = "default_pages_dir")]
    pub pages_dir: PathBuf,
}

fn default_allure_path() -> String {
    DEFAULT_ALLURE.to_string()
}

fn default_pages_dir() -> PathBuf {
    PathBuf::from(DEFAULT_PAGES_DIR)
}

impl Default for AllureConfig {
    fn default() -> Self {
        Self {
            path: default_allure_path(),
            pages_dir: default_pages_dir(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default)]
    pub missing_stubs: MissingStubPolicy,
    #[serde(default)]
    pub optional_variables: OptionalVariablePolicy,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file path or default locations
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => Some(p),
            None => Self::find_config_file(),
        };

        let mut config = match config_path {
            Some(path) if path.exists() => {
                let contents = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read settings {}", path.display()))?;
                serde_yaml::from_str(&contents)
                    .with_context(|| format!("Invalid settings in {}", path.display()))?
            }
            _ => Config::default(),
        };

        // Merge with environment variables
        config.merge_env();
        Ok(config)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let possible_paths = [
            PathBuf::from("actions-toolkit.yaml"),
            PathBuf::from("actions-toolkit.yml"),
            PathBuf::from(".actions-toolkit.yaml"),
            PathBuf::from(".actions-toolkit.yml"),
        ];

        // Check current directory
        if let Some(path) = possible_paths.into_iter().find(|path| path.exists()) {
            return Some(path);
        }

        // Check home directory
        dirs::home_dir()
            .map(|home| home.join(".actions-toolkit").join("config.yaml"))
            .filter(|path| path.exists())
    }

    /// Merge environment variables into configuration
    fn merge_env(&mut self) {
        self.merge_vars(|name| std::env::var(name).ok().filter(|value| !value.is_empty()));
    }

    fn merge_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // GitHub Actions runner
        if let Some(token) = lookup("GITHUB_TOKEN") {
            self.github.token = Some(token);
        }
        if let Some(repository) = lookup("GITHUB_REPOSITORY") {
            self.github.repository = Some(repository);
        }
        if let Some(api_url) = lookup("GITHUB_API_URL") {
            self.github.api_url = Some(api_url);
        }
        if let Some(allure) = lookup("ALLURE_PATH") {
            self.allure.path = allure;
        }

        // Logging configuration
        if let Some(level) = lookup("ACTIONS_TOOLKIT_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("ACTIONS_TOOLKIT_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.format, "pretty");
        assert!(config.github.token.is_none());
        assert_eq!(config.audit.missing_stubs, MissingStubPolicy::Pin);
        assert_eq!(config.audit.optional_variables, OptionalVariablePolicy::Warn);
        assert_eq!(config.allure.path, "allure");
        assert_eq!(config.allure.pages_dir, PathBuf::from("gh-pages"));
    }

    #[test]
    fn test_load_settings_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("actions-toolkit.yaml");
        std::fs::write(
            &path,
            r#"
logging:
  level: debug
  format: compact
github:
  api_url: https://ghe.example.com/api/v3
audit:
  missing_stubs: decrement
  optional_variables: ignore
allure:
  pages_dir: site
"#,
        )
        .unwrap();

        let config = Config::load(Some(path)).unwrap();
        assert_eq!(config.logging.format, "compact");
        assert_eq!(config.audit.missing_stubs, MissingStubPolicy::Decrement);
        assert_eq!(config.audit.optional_variables, OptionalVariablePolicy::Ignore);
        assert_eq!(config.allure.pages_dir, PathBuf::from("site"));
    }

    #[test]
    fn test_invalid_settings_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("settings.yaml");
        std::fs::write(&path, "audit:\n  missing_stubs: sometimes\n").unwrap();

        assert!(Config::load(Some(path)).is_err());
    }

    #[test]
    fn test_environment_overrides() {
        let vars = HashMap::from([
            ("GITHUB_TOKEN", "secret"),
            ("GITHUB_REPOSITORY", "conda/actions"),
            ("ACTIONS_TOOLKIT_LOG_LEVEL", "trace"),
            ("ALLURE_PATH", "/opt/allure/bin/allure"),
        ]);
        let mut config = Config::default();
        config.github.repository = Some("from/file".to_string());

        config.merge_vars(|name| vars.get(name).map(|value| value.to_string()));

        assert_eq!(config.github.token.as_deref(), Some("secret"));
        assert_eq!(config.github.repository.as_deref(), Some("conda/actions"));
        assert_eq!(config.logging.level, "trace");
        assert_eq!(config.logging.format, "pretty");
        assert!(config.github.api_url.is_none());
        assert_eq!(config.allure.path, "/opt/allure/bin/allure");
    }

    #[test]
    fn test_token_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join(TOKEN_FILE);
        assert!(read_token_file(&path).is_none());

        std::fs::write(&path, "  ghp_secret\n").unwrap();
        assert_eq!(read_token_file(&path).as_deref(), Some("ghp_secret"));

        std::fs::write(&path, "\n").unwrap();
        assert!(read_token_file(&path).is_none());

        let config = GithubConfig {
            token: Some("configured".to_string()),
            ..GithubConfig::default()
        };
        assert_eq!(config.resolve_token().as_deref(), Some("configured"));
    }
}
