// ABOUTME: Generate Allure reports from the artifacts of completed workflow runs
// ABOUTME: Drives the gh, tar and allure executables, keeping report history on the pages branch

use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::error::{ActionError, Result};
use crate::report::{Transcript, INDENT};

pub const DEFAULT_ARTIFACT_GROUP: &str = r"allure-(\d.*)";
pub const DEFAULT_ALLURE: &str = "allure";
pub const DEFAULT_PAGES_DIR: &str = "gh-pages";
pub const RESULTS_ARCHIVE: &str = "allure-results.tar.gz";
const REPORT_PREFIX: &str = "allure-report-";
const RUN_FIELDS: &str = "status,conclusion,databaseId,workflowName,headBranch";

/// One entry of `gh run ls --json`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    pub status: String,
    #[serde(default)]
    pub conclusion: String,
    pub database_id: u64,
    pub workflow_name: String,
    pub head_branch: String,
}

impl WorkflowRun {
    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }
}

impl fmt::Display for WorkflowRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} #{} on `{}` ({})",
            self.workflow_name, self.database_id, self.head_branch, self.conclusion
        )
    }
}

#[derive(Debug, Clone)]
pub struct AllureOptions {
    pub repository: String,
    /// `gh run download -p` glob, every artifact is downloaded without one
    pub artifact_pattern: Option<String>,
    /// Anchored at the start of artifact names; the first group names the report
    pub artifact_group: Regex,
    /// Where each run is downloaded into a directory named by its id
    pub work_dir: PathBuf,
    /// Checked out GitHub Pages branch the reports are generated into
    pub pages_dir: PathBuf,
    pub allure: String,
}

/// Compile an artifact group pattern so it only matches from the start of a name
pub fn artifact_group_regex(pattern: &str) -> Result<Regex> {
    Ok(Regex::new(&format!("^(?:{})", pattern))?)
}

/// Bucket artifact paths by the group their file name captures
pub fn group_artifacts(
    paths: impl IntoIterator<Item = PathBuf>,
    pattern: &Regex,
) -> BTreeMap<String, Vec<PathBuf>> {
    let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for path in paths {
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let Some(captures) = pattern.captures(name) else {
            continue;
        };
        let Some(group) = captures.get(1).or_else(|| captures.get(0)) else {
            continue;
        };
        let group = group.as_str().to_string();
        groups.entry(group).or_default().push(path);
    }
    groups
}

/// Where the report of `group` for runs of `head_branch` is published
pub fn report_output_dir(pages_dir: &Path, head_branch: &str, group: &str) -> PathBuf {
    pages_dir.join(head_branch.replace('/', "-")).join(group)
}

/// Every results archive below an artifact directory, in a stable order
pub fn results_archives(artifact_dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(artifact_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == RESULTS_ARCHIVE)
        .map(|entry| entry.into_path())
        .collect()
}

async fn run_tool(program: &str, args: &[&str], cwd: Option<&Path>) -> Result<Output> {
    let mut command = Command::new(program);
    command.args(args);
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }
    debug!("Running {} {:?}", program, args);

    command.output().await.map_err(|e| ActionError::CommandError {
        command: program.to_string(),
        message: e.to_string(),
    })
}

fn failure(program: &str, output: &Output) -> ActionError {
    ActionError::CommandError {
        command: program.to_string(),
        message: format!(
            "{}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ),
    }
}

/// Recent runs of the repository's workflows, newest first
pub async fn list_runs(repository: &str) -> Result<Vec<WorkflowRun>> {
    let output = run_tool(
        "gh",
        &["run", "-R", repository, "ls", "--json", RUN_FIELDS],
        None,
    )
    .await?;
    if !output.status.success() {
        return Err(failure("gh", &output));
    }
    serde_json::from_slice(&output.stdout).map_err(|source| ActionError::JsonError {
        origin: "gh run ls".to_string(),
        source,
    })
}

/// Download the run's artifacts into `<work_dir>/<run id>`.
///
/// An existing directory is reused without downloading again. Returns `None`
/// when the download failed, after removing the partial directory.
pub async fn download_run(
    options: &AllureOptions,
    run_id: u64,
    transcript: &mut Transcript,
) -> Result<Option<PathBuf>> {
    let run_dir = options.work_dir.join(run_id.to_string());
    match fs::create_dir(&run_dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            transcript.print_indented(
                format!("* ⏭️ Skip existing `{}`", run_dir.display()),
                INDENT,
            );
            return Ok(Some(run_dir));
        }
        Err(e) => return Err(ActionError::io(&run_dir)(e)),
    }

    let run_id = run_id.to_string();
    let mut args = vec!["run", "download"];
    if let Some(pattern) = &options.artifact_pattern {
        args.extend(["-p", pattern.as_str()]);
    }
    args.extend(["-R", options.repository.as_str(), run_id.as_str()]);

    let output = run_tool("gh", &args, Some(&run_dir)).await?;
    if output.status.success() {
        return Ok(Some(run_dir));
    }

    if let Err(e) = fs::remove_dir_all(&run_dir).await {
        warn!("Failed to clean up {}: {}", run_dir.display(), e);
    }
    transcript.error_indented(format!("* ❌ Failed to download run {}", run_id), INDENT);
    for (stream, bytes) in [("stdout", &output.stdout), ("stderr", &output.stderr)] {
        let text = String::from_utf8_lossy(bytes);
        if !text.trim().is_empty() {
            transcript.error_indented(format!("{}: {}", stream, text.trim()), INDENT * 2);
        }
    }
    Ok(None)
}

/// Unpack a results archive on top of the report directory
async fn extract_results(archive: &Path, report_dir: &Path) -> Result<()> {
    let archive = archive.display().to_string();
    let report_dir = report_dir.display().to_string();
    let output = run_tool(
        "tar",
        &["-C", &report_dir, "-xf", &archive, "--strip-components=1"],
        None,
    )
    .await?;
    if output.status.success() {
        Ok(())
    } else {
        Err(failure("tar", &output))
    }
}

async fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    let mut read_dir = fs::read_dir(dir).await.map_err(ActionError::io(dir))?;
    while let Some(entry) = read_dir.next_entry().await.map_err(ActionError::io(dir))? {
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}

/// Generate one report per artifact group of a downloaded run, returning the number of failures
pub async fn report_run(
    options: &AllureOptions,
    run: &WorkflowRun,
    transcript: &mut Transcript,
) -> Result<usize> {
    let run_dir = options.work_dir.join(run.database_id.to_string());
    let artifacts = sorted_entries(&run_dir)
        .await?
        .into_iter()
        .filter(|path| {
            let is_report = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(REPORT_PREFIX));
            !is_report
        });
    let groups = group_artifacts(artifacts, &options.artifact_group);
    if groups.is_empty() {
        transcript.print_indented("* ⚠️ No artifacts matched the artifact group", INDENT);
        return Ok(0);
    }

    let mut errors = 0;
    for (group, artifact_dirs) in &groups {
        let report_dir = run_dir.join(format!("{}{}", REPORT_PREFIX, group));
        fs::create_dir_all(&report_dir)
            .await
            .map_err(ActionError::io(&report_dir))?;

        for archive in artifact_dirs.iter().flat_map(|dir| results_archives(dir)) {
            if let Err(e) = extract_results(&archive, &report_dir).await {
                transcript.error_indented(
                    format!("* ❌ Failed to extract `{}`: {}", archive.display(), e),
                    INDENT,
                );
                errors += 1;
            }
        }

        let output_dir = report_output_dir(&options.pages_dir, &run.head_branch, group);
        if let Err(e) = fs::rename(output_dir.join("history"), report_dir.join("history")).await {
            debug!("No history carried over for {}: {}", group, e);
            transcript.print_indented(
                format!(
                    "* ⚠️ Could not move history from `{}` to `{}`",
                    output_dir.display(),
                    report_dir.display()
                ),
                INDENT,
            );
        }

        let output_arg = output_dir.display().to_string();
        let report_arg = report_dir.display().to_string();
        let output = run_tool(
            &options.allure,
            &["generate", "--clean", "--output", &output_arg, &report_arg],
            None,
        )
        .await?;
        if output.status.success() {
            transcript.print_indented(
                format!("* ✅ `{}` → `{}`", group, output_dir.display()),
                INDENT,
            );
        } else {
            transcript.error_indented(
                format!("* ❌ {}", failure(&options.allure, &output)),
                INDENT,
            );
            errors += 1;
        }
    }
    Ok(errors)
}

/// Download and report every completed run, oldest first so history accumulates
pub async fn allure_multi(options: &AllureOptions, transcript: &mut Transcript) -> Result<usize> {
    let runs = list_runs(&options.repository).await?;
    info!("Found {} run(s) in {}", runs.len(), options.repository);

    let mut errors = 0;
    for run in runs.iter().rev().filter(|run| run.is_completed()) {
        transcript.print(format!("* 📥 Download {}", run));
        if download_run(options, run.database_id, transcript).await?.is_none() {
            errors += 1;
            continue;
        }
        transcript.print(format!("* 📊 Report {}", run));
        errors += report_run(options, run, transcript).await?;
    }
    Ok(errors)
}
