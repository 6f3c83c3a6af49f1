// ABOUTME: Read a local file or remote URL for use as a step output
// ABOUTME: Optionally re-emits JSON or YAML content as single-line JSON

use clap::ValueEnum;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;
use serde_json::Value as JsonValue;
use std::io::{self, ErrorKind, Write};
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

use super::error::{ActionError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ContentParser {
    Json,
    Yaml,
}

fn is_url(file: &str) -> bool {
    file.starts_with("http://") || file.starts_with("https://")
}

/// Fetch `file` as a URL first, falling back to the local path.
///
/// A URL answering with a non-success status falls back as well. A missing
/// local file yields `default` when one is given.
pub async fn read_file(client: &Client, file: &str, default: Option<&str>) -> Result<String> {
    if is_url(file) {
        let response = client.get(file).send().await?;
        let status = response.status();
        if status.is_success() {
            debug!("Fetched {} ({})", file, status);
            return Ok(response.text().await?);
        }
        warn!("Fetching {} returned {}, trying a local path", file, status);
    }

    match fs::read_to_string(file).await {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == ErrorKind::NotFound => match default {
            Some(default) => {
                debug!("{} not found, using the default", file);
                Ok(default.to_string())
            }
            None => Err(ActionError::FileNotFound { path: file.into() }),
        },
        Err(e) => Err(ActionError::io(Path::new(file))(e)),
    }
}

/// Single-line JSON spelled like Python's `json.dumps` defaults: `", "` and
/// `": "` separators, non-ASCII characters escaped as `\uXXXX`
struct DumpsFormatter;

impl Formatter for DumpsFormatter {
    fn begin_array_value<W: ?Sized + Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        if fragment.is_ascii() {
            return writer.write_all(fragment.as_bytes());
        }
        let mut units = [0u16; 2];
        for c in fragment.chars() {
            if c.is_ascii() {
                writer.write_all(&[c as u8])?;
            } else {
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

/// Parse `content` and dump it back as single-line JSON
pub fn parse_content(content: &str, parser: ContentParser, origin: &str) -> Result<String> {
    let value: JsonValue = match parser {
        ContentParser::Json => {
            serde_json::from_str(content).map_err(|source| ActionError::JsonError {
                origin: origin.to_string(),
                source,
            })?
        }
        ContentParser::Yaml => {
            serde_yaml::from_str(content).map_err(|source| ActionError::YamlError {
                origin: origin.to_string(),
                source,
            })?
        }
    };

    let mut buffer = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, DumpsFormatter);
    value
        .serialize(&mut serializer)
        .map_err(|source| ActionError::JsonError {
            origin: origin.to_string(),
            source,
        })?;
    // the formatter only ever writes ASCII
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
