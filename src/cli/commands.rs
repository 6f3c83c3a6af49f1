// ABOUTME: Command implementations for the actions toolkit CLI
// ABOUTME: Wires each subcommand to its action and publishes transcripts to GitHub Actions

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::config::Config;
use crate::actions::{self, AllureOptions, ContentParser, ProjectOwner};
use crate::report::{multiline_output, CiOutputs, Transcript};
use crate::source::{GithubClient, LocalProvider, RepositoryInfo, SourceProvider};
use crate::sync::{FileSync, SyncConfig};
use crate::template::{AuditTracker, MissingStubPolicy, OptionalVariablePolicy, TemplateEngine};

pub const TEMPLATING_TITLE: &str = "Templating Audit";
pub const DURATIONS_TITLE: &str = "Durations Audit";
pub const ALLURE_TITLE: &str = "Allure Reports";

/// Exit codes only carry eight bits
const MAX_EXIT_CODE: usize = 255;

pub struct TemplateFilesOptions {
    pub config: PathBuf,
    pub stubs: PathBuf,
    pub local: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub repository: Option<String>,
    pub missing_stubs: MissingStubPolicy,
    pub optional_variables: OptionalVariablePolicy,
}

/// Sync files from the configured upstream repositories
pub async fn template_files(options: TemplateFilesOptions, config: &Config) -> Result<i32> {
    let stubs = validate_dir(&options.stubs)?;
    let output_dir = validate_dir(&options.output_dir)?;
    let outputs = CiOutputs::from_env();
    let mut transcript = Transcript::new();

    let Some(sync_config) = SyncConfig::load(&options.config)
        .with_context(|| format!("Failed to load {}", options.config.display()))?
    else {
        transcript.print("⚠️ No configuration file found, nothing to update");
        outputs.publish(TEMPLATING_TITLE, &transcript, false)?;
        return Ok(0);
    };
    info!(
        "Syncing files from {} upstream(s) into {}",
        sync_config.len(),
        output_dir.display()
    );

    let Some(repository) = options.repository else {
        bail!("No destination repository, pass --repository or set GITHUB_REPOSITORY");
    };

    let provider: Box<dyn SourceProvider> = match &options.local {
        Some(root) => Box::new(LocalProvider::new(root)),
        None => Box::new(github_client(config)),
    };

    let tracker = AuditTracker::new().with_missing_stub_policy(options.missing_stubs);
    let engine = TemplateEngine::new(&stubs, tracker)?;
    let mut sync = FileSync::new(engine, transcript, &output_dir)
        .with_optional_variables(options.optional_variables);

    let mut errors = 0;
    let destination = match &options.local {
        Some(_) => Ok(RepositoryInfo::from_full_name(&repository)),
        None => provider
            .get_repo(&repository)
            .await
            .map(|repo| repo.info().clone()),
    };
    match destination {
        Ok(destination) => {
            errors += sync
                .iterate_config(&sync_config, provider.as_ref(), &destination)
                .await;
        }
        Err(e) => {
            sync.transcript_mut()
                .error(format!("❌ Failed to fetch `{}`: {}", repository, e));
            errors += 1;
        }
    }

    let summary = sync.stub_summary()?;
    let mut transcript = sync.into_transcript();
    transcript.print(summary.render());
    if errors > 0 {
        transcript.error(format!("Got {} error(s)", errors));
    }

    outputs.publish(TEMPLATING_TITLE, &transcript, errors > 0)?;
    Ok(exit_code(errors))
}

/// Read a file or URL into the `content` step output
pub async fn read_file(
    file: &str,
    parser: Option<ContentParser>,
    default: Option<&str>,
) -> Result<i32> {
    let client = reqwest::Client::new();
    let mut content = actions::read_file(&client, file, default).await?;
    if let Some(parser) = parser {
        content = actions::parse_content(&content, parser, file)?;
    }

    let outputs = CiOutputs::from_env();
    if outputs.has_output() {
        outputs.append_output(&multiline_output("content", &content))?;
    } else {
        println!("{}", content);
    }
    Ok(0)
}

/// Add a signee to the CLA record
pub fn check_cla(path: &Path, id: u64, login: &str) -> Result<i32> {
    let signees = actions::add_signee(path, id, login)?;
    debug!("{} now lists {} signee(s)", path.display(), signees.len());
    Ok(0)
}

/// Combine new duration artifacts with the stored averages
pub fn combine_durations(durations_dir: &Path, artifacts_dir: &Path) -> Result<i32> {
    let durations_dir = validate_dir(durations_dir)?;
    let artifacts_dir = validate_dir(artifacts_dir)?;

    let mut transcript = Transcript::new();
    actions::combine_durations(&durations_dir, &artifacts_dir, &mut transcript)?;
    CiOutputs::from_env().publish(DURATIONS_TITLE, &transcript, false)?;
    Ok(0)
}

/// Write the release notes of `version` to `output`
pub fn release_notes(input: &Path, output: &Path, version: &str) -> Result<i32> {
    let written = actions::write_release_notes(input, output, version)
        .with_context(|| format!("Failed to extract release notes from {}", input.display()))?;
    info!("Wrote {} bytes to {}", written, output.display());
    Ok(0)
}

pub struct AllureMultiOptions {
    pub repository: Option<String>,
    pub artifact_pattern: Option<String>,
    pub artifact_group: String,
    pub work_dir: PathBuf,
    pub pages_dir: PathBuf,
    pub allure: String,
}

/// Report the Allure results of every completed run of a repository
pub async fn allure_multi(options: AllureMultiOptions) -> Result<i32> {
    let Some(repository) = options.repository else {
        bail!("No repository, pass --repository or set GITHUB_REPOSITORY");
    };
    let options = AllureOptions {
        repository,
        artifact_pattern: options.artifact_pattern,
        artifact_group: actions::allure::artifact_group_regex(&options.artifact_group)?,
        work_dir: validate_dir(&options.work_dir)?,
        pages_dir: options.pages_dir,
        allure: options.allure,
    };

    let mut transcript = Transcript::new();
    let errors = actions::allure_multi(&options, &mut transcript).await?;
    if errors > 0 {
        transcript.error(format!("Got {} error(s)", errors));
    }
    CiOutputs::from_env().publish(ALLURE_TITLE, &transcript, errors > 0)?;
    Ok(exit_code(errors))
}

/// Look up an issue on a classic project and publish the `contains` output
pub async fn issue_in_project(
    owner: ProjectOwner,
    project: u64,
    issue: Option<u64>,
    config: &Config,
) -> Result<i32> {
    let client = github_client(config);
    let result = actions::issue_in_project(&client, &owner, project, issue).await?;
    publish_contains(&result.summary(project, issue), &result.to_output()?)
}

/// Look up a team member and publish the `contains` output
pub async fn user_in_team(
    org: &str,
    team: &str,
    user: Option<&str>,
    config: &Config,
) -> Result<i32> {
    let client = github_client(config);
    let result = actions::user_in_team(&client, org, team, user).await?;
    publish_contains(&result.summary(org, team, user), &result.to_output()?)
}

fn publish_contains(summary: &str, contains: &str) -> Result<i32> {
    let mut transcript = Transcript::new();
    transcript.print(summary);
    let outputs = CiOutputs::from_env();
    if outputs.has_output() {
        outputs.append_output(&multiline_output("contains", contains))?;
    } else {
        println!("{}", contains);
    }
    Ok(0)
}

fn github_client(config: &Config) -> GithubClient {
    GithubClient::new(config.github.api_url.clone(), config.github.resolve_token())
}

/// Create `dir` if needed and make sure it is a writable directory
fn validate_dir(dir: &Path) -> Result<PathBuf> {
    let invalid = |e: &dyn std::fmt::Display| {
        anyhow::anyhow!("{} is not a valid directory: {}", dir.display(), e)
    };
    std::fs::create_dir_all(dir).map_err(|e| invalid(&e))?;
    let probe = dir.join(".ignore");
    std::fs::write(&probe, "").map_err(|e| invalid(&e))?;
    std::fs::remove_file(&probe).map_err(|e| invalid(&e))?;
    Ok(dir.to_path_buf())
}

fn exit_code(errors: usize) -> i32 {
    errors.min(MAX_EXIT_CODE) as i32
}
