// ABOUTME: Sync configuration mapping upstream repositories to file directives
// ABOUTME: Validates the YAML shape up front and normalises directives into file entries

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use serde_yaml::Value as YamlValue;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::error::{EntryError, Result, SyncError, ValidationError};

/// Upstream `owner/name` to the files copied from it, in file order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncConfig {
    pub upstreams: IndexMap<String, Vec<FileSpec>>,
}

/// One directive as written in the configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileSpec {
    /// Copy a file to the same path
    Path(String),
    Detailed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        src: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dst: Option<String>,
        #[serde(default)]
        remove: bool,
        #[serde(default, rename = "with", skip_serializing_if = "IndexMap::is_empty")]
        context: IndexMap<String, JsonValue>,
    },
}

/// A directive with its defaults applied
#[derive(Debug, Clone, PartialEq)]
pub struct FileEntry {
    pub src: Option<String>,
    pub dst: PathBuf,
    pub remove: bool,
    pub context: IndexMap<String, JsonValue>,
}

impl SyncConfig {
    /// Load a configuration file, `None` when it does not exist
    pub fn load(path: &Path) -> Result<Option<Self>> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                debug!("Loaded sync configuration from {}", path.display());
                Self::from_yaml(&content).map(Some)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(_) if path.is_dir() => Err(SyncError::NotAFile {
                path: path.display().to_string(),
            }),
            Err(e) => Err(SyncError::IoError(e)),
        }
    }

    /// Parse and validate configuration YAML
    pub fn from_yaml(content: &str) -> Result<Self> {
        let value: YamlValue = serde_yaml::from_str(content)?;
        let errors = validate(&value);
        if !errors.is_empty() {
            return Err(SyncError::Validation(errors));
        }
        Ok(serde_yaml::from_value(value)?)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<FileSpec>)> {
        self.upstreams.iter()
    }

    pub fn len(&self) -> usize {
        self.upstreams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upstreams.is_empty()
    }
}

impl FileSpec {
    pub fn parse(&self) -> std::result::Result<FileEntry, EntryError> {
        parse_entry(self)
    }
}

impl fmt::Display for FileSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileSpec::Path(path) => write!(f, "{}", path),
            detailed => match serde_json::to_string(detailed) {
                Ok(json) => write!(f, "{}", json),
                Err(_) => write!(f, "{:?}", detailed),
            },
        }
    }
}

/// Apply directive defaults: `dst` falls back to `src`, `src` is required unless removing
pub fn parse_entry(spec: &FileSpec) -> std::result::Result<FileEntry, EntryError> {
    match spec {
        FileSpec::Path(path) => Ok(FileEntry {
            src: Some(path.clone()),
            dst: PathBuf::from(path),
            remove: false,
            context: IndexMap::new(),
        }),
        FileSpec::Detailed {
            src,
            dst,
            remove,
            context,
        } => {
            let dst = dst
                .as_ref()
                .or(src.as_ref())
                .ok_or(EntryError::MissingDestination)?;
            if !remove && src.is_none() {
                return Err(EntryError::MissingSource);
            }
            Ok(FileEntry {
                src: src.clone(),
                dst: PathBuf::from(dst),
                remove: *remove,
                context: context.clone(),
            })
        }
    }
}

fn validate(value: &YamlValue) -> Vec<ValidationError> {
    let YamlValue::Mapping(mapping) = value else {
        return vec![ValidationError::NotAMapping {
            found: kind(value).to_string(),
        }];
    };

    let mut errors = Vec::new();
    for (key, files) in mapping {
        let upstream = match key {
            YamlValue::String(name) => name.clone(),
            other => serde_yaml::to_string(other)
                .map(|s| s.trim_end().to_string())
                .unwrap_or_else(|_| kind(other).to_string()),
        };
        if !key.as_str().is_some_and(is_upstream_name) {
            errors.push(ValidationError::InvalidUpstream {
                name: upstream.clone(),
            });
        }

        let YamlValue::Sequence(items) = files else {
            errors.push(ValidationError::NotAList {
                upstream,
                found: kind(files).to_string(),
            });
            continue;
        };
        for (index, item) in items.iter().enumerate() {
            if let Err(reason) = validate_entry(item) {
                errors.push(ValidationError::InvalidEntry {
                    upstream: upstream.clone(),
                    index: index + 1,
                    reason,
                });
            }
        }
    }
    errors
}

fn validate_entry(item: &YamlValue) -> std::result::Result<(), String> {
    let fields = match item {
        YamlValue::String(path) if path.is_empty() => {
            return Err("path must not be empty".to_string())
        }
        YamlValue::String(_) => return Ok(()),
        YamlValue::Mapping(fields) => fields,
        other => {
            return Err(format!(
                "expected a path or a mapping, found {}",
                kind(other)
            ))
        }
    };

    for (field, value) in fields {
        let valid = match field.as_str() {
            Some("src") | Some("dst") => value.is_string(),
            Some("remove") => value.is_bool(),
            Some("with") => match value {
                YamlValue::Mapping(context) => context.keys().all(YamlValue::is_string),
                _ => false,
            },
            _ => true,
        };
        if !valid {
            let expected = match field.as_str() {
                Some("remove") => "a boolean",
                Some("with") => "a mapping with string keys",
                _ => "a string",
            };
            return Err(format!(
                "`{}` must be {}, found {}",
                field.as_str().unwrap_or_default(),
                expected,
                kind(value)
            ));
        }
    }
    Ok(())
}

/// Repository keys need a `/` with word characters on both sides
fn is_upstream_name(name: &str) -> bool {
    let word = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_');
    name.match_indices('/')
        .any(|(i, _)| word(name[..i].chars().next_back()) && word(name[i + 1..].chars().next()))
}

fn kind(value: &YamlValue) -> &'static str {
    match value {
        YamlValue::Null => "null",
        YamlValue::Bool(_) => "a boolean",
        YamlValue::Number(_) => "a number",
        YamlValue::String(_) => "a string",
        YamlValue::Sequence(_) => "a list",
        YamlValue::Mapping(_) => "a mapping",
        YamlValue::Tagged(_) => "a tagged value",
    }
}
