// ABOUTME: Extract the release notes of one version from a changelog
// ABOUTME: Matches the body between the version's dated header and the next release header

use regex::Regex;
use std::path::Path;
use tracing::{debug, warn};

use super::error::{ActionError, Result};

/// Body between `## <version> (YYYY-MM-DD)` and the next dated release header
pub fn extract_release_notes(changelog: &str, version: &str) -> Result<Option<String>> {
    let pattern = Regex::new(&format!(
        concat!(
            r"(?s)\n+(##\s+{}\s+\(\d{{4}}-\d{{2}}-\d{{2}}\))\n+",
            r"(.+?)",
            r"\n+(##\s+\d+\.\d+\.\d+\s+\(\d{{4}}-\d{{2}}-\d{{2}}\))\n+",
        ),
        regex::escape(version)
    ))?;
    Ok(pattern
        .captures(changelog)
        .and_then(|captures| captures.get(2))
        .map(|notes| notes.as_str().to_string()))
}

/// Write the notes for `version` to `output`, an empty file when there are none
pub fn write_release_notes(input: &Path, output: &Path, version: &str) -> Result<usize> {
    if version.is_empty() {
        return Err(ActionError::InvalidInput(
            "version must be a non-empty string".to_string(),
        ));
    }
    if !input.exists() {
        return Err(ActionError::FileNotFound {
            path: input.to_path_buf(),
        });
    }

    let changelog = std::fs::read_to_string(input).map_err(ActionError::io(input))?;
    let notes = match extract_release_notes(&changelog, version)? {
        Some(notes) => notes,
        None => {
            warn!("No release notes found for {} in {}", version, input.display());
            String::new()
        }
    };

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(ActionError::io(parent))?;
    }
    std::fs::write(output, &notes).map_err(ActionError::io(output))?;
    debug!("Wrote {} bytes of release notes to {}", notes.len(), output.display());
    Ok(notes.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const CHANGELOG: &str = "[//]: # (current developments)\n\
\n\
## 1.2.0 (2024-05-01)\n\
\n\
### Enhancements\n\
\n\
* Add a thing.\n\
\n\
### Bug fixes\n\
\n\
* Fix 1.1.0 regression.\n\
\n\
## 1.1.0 (2024-04-01)\n\
\n\
* Older notes.\n\
\n\
## 1.0.0 (2024-03-01)\n\
\n\
* First release.\n";

    #[test]
    fn test_extract_latest_version() {
        assert_eq!(
            extract_release_notes(CHANGELOG, "1.2.0").unwrap().as_deref(),
            Some("### Enhancements\n\n* Add a thing.\n\n### Bug fixes\n\n* Fix 1.1.0 regression.")
        );
        assert_eq!(
            extract_release_notes(CHANGELOG, "1.1.0").unwrap().as_deref(),
            Some("* Older notes.")
        );
    }

    #[test]
    fn test_version_is_matched_literally() {
        assert_eq!(extract_release_notes(CHANGELOG, "1.1.").unwrap(), None);
        assert_eq!(extract_release_notes(CHANGELOG, "1x2x0").unwrap(), None);
    }

    #[test]
    fn test_last_release_needs_a_following_header() {
        assert_eq!(extract_release_notes(CHANGELOG, "1.0.0").unwrap(), None);
    }

    #[test]
    fn test_write_release_notes() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("CHANGELOG.md");
        std::fs::write(&input, CHANGELOG).unwrap();

        let output = dir.path().join("nested").join("notes.md");
        assert_eq!(write_release_notes(&input, &output, "1.1.0").unwrap(), 14);
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "* Older notes.");

        let missing = dir.path().join("none.md");
        assert_eq!(write_release_notes(&input, &missing, "9.9.9").unwrap(), 0);
        assert_eq!(std::fs::read_to_string(&missing).unwrap(), "");
    }

    #[test]
    fn test_write_release_notes_errors() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("notes.md");

        assert!(matches!(
            write_release_notes(&dir.path().join("CHANGELOG.md"), &output, "1.0.0"),
            Err(ActionError::FileNotFound { .. })
        ));
        assert!(matches!(
            write_release_notes(&dir.path().join("CHANGELOG.md"), &output, ""),
            Err(ActionError::InvalidInput(_))
        ));
    }
}
