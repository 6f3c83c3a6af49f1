// ABOUTME: Contributor License Agreement signatory record
// ABOUTME: Adds a contributor id and login to the sorted JSON list of signees

use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;
use tracing::info;

use super::error::{ActionError, Result};

pub type Signees = BTreeMap<String, JsonValue>;

/// Load the signees, an absent file is an empty record
pub fn load_signees(path: &Path) -> Result<Signees> {
    match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).map_err(|source| ActionError::JsonError {
            origin: path.display().to_string(),
            source,
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Signees::new()),
        Err(e) => Err(ActionError::io(path)(e)),
    }
}

/// Record `login` under `id` and write the file back sorted, with a trailing newline
pub fn add_signee(path: &Path, id: u64, login: &str) -> Result<Signees> {
    let mut signees = load_signees(path)?;
    signees.insert(id.to_string(), JsonValue::from(login));

    let mut content =
        serde_json::to_string_pretty(&signees).map_err(|source| ActionError::JsonError {
            origin: path.display().to_string(),
            source,
        })?;
    content.push('\n');
    std::fs::write(path, content).map_err(ActionError::io(path))?;

    info!("Added {} ({}) to {}", login, id, path.display());
    Ok(signees)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_add_to_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cla.json");

        add_signee(&path, 1234, "octocat").unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "{\n  \"1234\": \"octocat\"\n}\n"
        );
    }

    #[test]
    fn test_add_keeps_existing_and_sorts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cla.json");
        std::fs::write(&path, "{\"5\": \"five\", \"10\": \"ten\"}").unwrap();

        let signees = add_signee(&path, 7, "seven").unwrap();
        assert_eq!(signees.len(), 3);

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "{\n  \"10\": \"ten\",\n  \"5\": \"five\",\n  \"7\": \"seven\"\n}\n"
        );
    }

    #[test]
    fn test_existing_id_is_updated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cla.json");
        add_signee(&path, 1, "old-login").unwrap();

        let signees = add_signee(&path, 1, "new-login").unwrap();
        assert_eq!(signees["1"], "new-login");
        assert_eq!(signees.len(), 1);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cla.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            add_signee(&path, 1, "x"),
            Err(ActionError::JsonError { .. })
        ));
    }
}
