// ABOUTME: Console transcript and GitHub Actions output publication
// ABOUTME: Records every printed line so it can be flushed to the step summary and GITHUB_OUTPUT

pub mod error;
pub mod table;

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

pub use error::{ReportError, Result};
pub use table::Table;

/// Indentation step for nested transcript lines
pub const INDENT: usize = 4;

const STEP_SUMMARY_ENV: &str = "GITHUB_STEP_SUMMARY";
const OUTPUT_ENV: &str = "GITHUB_OUTPUT";

/// Line-oriented console output that keeps a copy of everything printed.
///
/// Regular lines go to stdout and error lines to stderr, both are recorded
/// in order so the exported text matches what a reader saw in the log.
#[derive(Debug, Default)]
pub struct Transcript {
    lines: Vec<String>,
    echo: bool,
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            lines: Vec::new(),
            echo: true,
        }
    }

    /// Record without echoing to the console
    pub fn quiet() -> Self {
        Self::default()
    }

    pub fn print(&mut self, text: impl AsRef<str>) {
        self.print_indented(text, 0);
    }

    pub fn print_indented(&mut self, text: impl AsRef<str>, indent: usize) {
        for line in indent_lines(text.as_ref(), indent) {
            if self.echo {
                println!("{}", line);
            }
            self.lines.push(line);
        }
    }

    pub fn error(&mut self, text: impl AsRef<str>) {
        self.error_indented(text, 0);
    }

    pub fn error_indented(&mut self, text: impl AsRef<str>, indent: usize) {
        for line in indent_lines(text.as_ref(), indent) {
            if self.echo {
                eprintln!("{}", line);
            }
            self.lines.push(line);
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

fn indent_lines(text: &str, indent: usize) -> Vec<String> {
    let padding = " ".repeat(indent);
    if text.is_empty() {
        return vec![String::new()];
    }
    text.lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", padding, line)
            }
        })
        .collect()
}

/// Step summary body
pub fn summary_text(title: &str, text: &str) -> String {
    format!("### {}\n{}", title, text)
}

/// Collapsible `summary` output, expanded when the run had errors
pub fn output_text(title: &str, errors: bool, text: &str) -> String {
    let details = if errors { "<details open>" } else { "<details>" };
    multiline_output(
        "summary",
        &format!(
            "{}\n<summary>{}</summary>\n\n{}\n\n</details>",
            details, title, text
        ),
    )
}

/// Multi-line `name<<DELIMITER` block for the GITHUB_OUTPUT file
pub fn multiline_output(name: &str, value: &str) -> String {
    let delimiter = format!("GITHUB_OUTPUT_{}", name);
    format!("{name}<<{delimiter}\n{value}\n{delimiter}\n")
}

/// Destinations GitHub Actions reads step results from
#[derive(Debug, Clone, Default)]
pub struct CiOutputs {
    step_summary: Option<PathBuf>,
    output: Option<PathBuf>,
}

impl CiOutputs {
    pub fn new(step_summary: Option<PathBuf>, output: Option<PathBuf>) -> Self {
        Self {
            step_summary,
            output,
        }
    }

    pub fn from_env() -> Self {
        let path = |name: &str| {
            std::env::var_os(name)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        };
        Self::new(path(STEP_SUMMARY_ENV), path(OUTPUT_ENV))
    }

    pub fn has_output(&self) -> bool {
        self.output.is_some()
    }

    /// Overwrite the step summary, if one is configured
    pub fn write_summary(&self, title: &str, text: &str) -> Result<()> {
        if let Some(path) = &self.step_summary {
            fs::write(path, summary_text(title, text)).map_err(|source| {
                ReportError::WriteError {
                    path: path.clone(),
                    source,
                }
            })?;
            debug!("Step summary written to {}", path.display());
        }
        Ok(())
    }

    /// Append raw `contents` to the output file, if one is configured
    pub fn append_output(&self, contents: &str) -> Result<()> {
        if let Some(path) = &self.output {
            append(path, contents)?;
            debug!("Appended {} bytes to {}", contents.len(), path.display());
        }
        Ok(())
    }

    /// Flush a transcript to both the step summary and the `summary` output
    pub fn publish(&self, title: &str, transcript: &Transcript, errors: bool) -> Result<()> {
        let text = transcript.text();
        self.write_summary(title, &text)?;
        self.append_output(&output_text(title, errors, &text))
    }
}

fn append(path: &Path, contents: &str) -> Result<()> {
    let write_error = |source| ReportError::WriteError {
        path: path.to_path_buf(),
        source,
    };
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(write_error)?;
    file.write_all(contents.as_bytes()).map_err(write_error)
}
