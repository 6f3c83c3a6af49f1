// ABOUTME: Command line argument definitions and parsing using Clap
// ABOUTME: Defines the global flags and one subcommand per CI action

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::actions::allure::DEFAULT_ARTIFACT_GROUP;
use crate::actions::ContentParser;
use crate::template::{MissingStubPolicy, OptionalVariablePolicy};

#[derive(Parser)]
#[command(name = "actions-toolkit")]
#[command(about = "GitHub Actions helpers for syncing templated files and CI bookkeeping")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Path to settings file")]
    pub settings: Option<PathBuf>,

    #[arg(long, global = true, help = "Disable colored output")]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Copy files from upstream repositories, rendering them as templates
    TemplateFiles {
        #[arg(long, help = "Path to the sync configuration (a missing file is a no-op)")]
        config: PathBuf,

        #[arg(long, help = "Directory containing the stubs templates may include")]
        stubs: PathBuf,

        #[arg(long, help = "Resolve upstream repositories as sub-directories of this path")]
        local: Option<PathBuf>,

        #[arg(long, help = "Directory files are written into", default_value = ".")]
        output_dir: PathBuf,

        #[arg(long, help = "Destination repository (defaults to GITHUB_REPOSITORY)")]
        repository: Option<String>,

        #[arg(long, value_enum, help = "How repeated failed stub lookups are counted")]
        missing_stubs: Option<MissingStubPolicy>,

        #[arg(long, value_enum, help = "Whether guarded unbound variables are warnings")]
        optional_variables: Option<OptionalVariablePolicy>,
    },

    /// Read a local file or remote URL into the `content` output
    ReadFile {
        #[arg(help = "Local path or remote URL to the file to read")]
        file: String,

        #[arg(long, value_enum, help = "Parse the content and re-emit it as JSON")]
        parser: Option<ContentParser>,

        #[arg(long, help = "Content to use when the file is not found")]
        default: Option<String>,
    },

    /// Add a contributor to the list of CLA signees
    CheckCla {
        #[arg(help = "Local path to the CLA file")]
        cla_path: PathBuf,

        #[arg(long, help = "Contributor's GitHub user id")]
        id: u64,

        #[arg(long, help = "Contributor's GitHub login")]
        login: String,
    },

    /// Combine test durations from recent runs with the stored averages
    CombineDurations {
        #[arg(long, help = "Directory holding the stored <os>.json durations")]
        durations_dir: PathBuf,

        #[arg(long, help = "Directory holding the downloaded duration artifacts")]
        artifacts_dir: PathBuf,
    },

    /// Extract the release notes of one version from a changelog
    ReleaseNotes {
        #[arg(long, help = "Changelog to read")]
        input: PathBuf,

        #[arg(long, help = "File the release notes are written to")]
        output: PathBuf,

        #[arg(long = "version", value_parser = non_empty, help = "Version to extract")]
        release: String,
    },

    /// Generate Allure reports from the artifacts of completed workflow runs
    AllureMulti {
        #[arg(long, help = "Repository whose runs are reported (defaults to GITHUB_REPOSITORY)")]
        repository: Option<String>,

        #[arg(long, help = "Glob selecting which artifacts to download")]
        artifact_pattern: Option<String>,

        #[arg(
            long,
            default_value = DEFAULT_ARTIFACT_GROUP,
            help = "Regex whose first group names the report an artifact belongs to"
        )]
        artifact_group: String,

        #[arg(long, help = "Directory runs are downloaded into", default_value = ".")]
        work_dir: PathBuf,

        #[arg(long, help = "Checked out GitHub Pages directory reports are written into")]
        pages_dir: Option<PathBuf>,

        #[arg(long, help = "Allure executable (defaults to ALLURE_PATH or `allure`)")]
        allure: Option<String>,
    },

    /// Check whether an issue is on a classic project, or list the project's issues
    IssueInProject {
        #[arg(help = "Project number (e.g. 5)")]
        project: u64,

        #[arg(help = "Issue database id to look for")]
        issue: Option<u64>,

        #[arg(short, long, help = "Organization owning the project (e.g. conda)")]
        org: Option<String>,

        #[arg(short, long, help = "User owning the project (e.g. conda-bot)")]
        user: Option<String>,

        #[arg(
            short,
            long,
            visible_alias = "repo",
            help = "Repository owning the project (e.g. conda/conda)"
        )]
        repository: Option<String>,
    },

    /// Check whether a user is a member of a team, or list the team's members
    UserInTeam {
        #[arg(help = "Organization the team belongs to (e.g. conda)")]
        org: String,

        #[arg(help = "Team slug (e.g. conda-core)")]
        team: String,

        #[arg(help = "User login to look for (e.g. conda-bot)")]
        user: Option<String>,
    },
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

fn non_empty(value: &str) -> Result<String, String> {
    if value.is_empty() {
        Err("must be a non-empty string".to_string())
    } else {
        Ok(value.to_string())
    }
}
