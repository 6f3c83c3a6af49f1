// ABOUTME: Main application orchestration for the actions toolkit CLI
// ABOUTME: Coordinates between CLI arguments, configuration, and command execution

use anyhow::Result;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use super::commands::{self, AllureMultiOptions, TemplateFilesOptions};
use crate::actions::ProjectOwner;
use super::{Args, Commands, Config};

pub struct App {
    config: Config,
}

impl App {
    /// Create a new application instance
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Initialize logging based on configuration
    pub fn init_logging(&self, verbose: bool, no_color: bool) -> Result<()> {
        let log_level = if verbose {
            "debug"
        } else {
            self.config.logging.level.as_str()
        };

        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

        // stdout carries the transcript and step outputs
        let result = match self.config.logging.format.as_str() {
            "compact" => tracing_subscriber::fmt()
                .compact()
                .with_env_filter(env_filter)
                .with_ansi(!no_color)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init(),
            _ => tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_ansi(!no_color)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init(),
        };
        result.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

        debug!("Logging initialized with level: {}", log_level);
        Ok(())
    }

    /// Run the application with parsed arguments, returning the process exit code
    pub async fn run(&mut self, args: Args) -> Result<i32> {
        self.init_logging(args.verbose, args.no_color)?;

        info!("Starting actions-toolkit v{}", env!("CARGO_PKG_VERSION"));
        debug!("Settings loaded from: {:?}", args.settings);

        match args.command {
            Commands::TemplateFiles {
                config,
                stubs,
                local,
                output_dir,
                repository,
                missing_stubs,
                optional_variables,
            } => {
                let options = TemplateFilesOptions {
                    config,
                    stubs,
                    local,
                    output_dir,
                    repository: repository.or_else(|| self.config.github.repository.clone()),
                    missing_stubs: missing_stubs.unwrap_or(self.config.audit.missing_stubs),
                    optional_variables: optional_variables
                        .unwrap_or(self.config.audit.optional_variables),
                };
                commands::template_files(options, &self.config).await
            }

            Commands::ReadFile {
                file,
                parser,
                default,
            } => commands::read_file(&file, parser, default.as_deref()).await,

            Commands::CheckCla {
                cla_path,
                id,
                login,
            } => commands::check_cla(&cla_path, id, &login),

            Commands::CombineDurations {
                durations_dir,
                artifacts_dir,
            } => commands::combine_durations(&durations_dir, &artifacts_dir),

            Commands::ReleaseNotes {
                input,
                output,
                release,
            } => commands::release_notes(&input, &output, &release),

            Commands::AllureMulti {
                repository,
                artifact_pattern,
                artifact_group,
                work_dir,
                pages_dir,
                allure,
            } => {
                let options = AllureMultiOptions {
                    repository: repository.or_else(|| self.config.github.repository.clone()),
                    artifact_pattern,
                    artifact_group,
                    work_dir,
                    pages_dir: pages_dir.unwrap_or_else(|| self.config.allure.pages_dir.clone()),
                    allure: allure.unwrap_or_else(|| self.config.allure.path.clone()),
                };
                commands::allure_multi(options).await
            }

            Commands::IssueInProject {
                project,
                issue,
                org,
                user,
                repository,
            } => {
                let owner = ProjectOwner::from_inputs(
                    org.as_deref(),
                    user.as_deref(),
                    repository.as_deref(),
                )?;
                commands::issue_in_project(owner, project, issue, &self.config).await
            }

            Commands::UserInTeam { org, team, user } => {
                commands::user_in_team(&org, &team, user.as_deref(), &self.config).await
            }
        }
    }

    /// Create application from command line arguments
    pub fn from_args(args: &Args) -> Result<Self> {
        let config = Config::load(args.settings.clone())?;
        Ok(Self::new(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_app_creation() {
        let app = App::new(Config::default());
        assert_eq!(app.config().logging.level, "warn");
    }

    #[test]
    fn test_app_from_args_with_settings_file() {
        let temp_dir = tempdir().unwrap();
        let settings = temp_dir.path().join("actions-toolkit.yaml");
        fs::write(&settings, "audit:\n  missing_stubs: decrement\n").unwrap();

        let args = Args::try_parse_from([
            "actions-toolkit".to_string(),
            "--settings".to_string(),
            settings.display().to_string(),
            "check-cla".to_string(),
            "cla.json".to_string(),
            "--id".to_string(),
            "1".to_string(),
            "--login".to_string(),
            "octocat".to_string(),
        ])
        .unwrap();

        let app = App::from_args(&args).unwrap();
        assert_eq!(
            app.config().audit.missing_stubs,
            crate::template::MissingStubPolicy::Decrement
        );
    }
}
