// ABOUTME: Per-file orchestration for syncing templated files from upstream repositories
// ABOUTME: Fetches, renders under an audit scope, writes or removes files and reports each step

use indexmap::IndexMap;
use minijinja::Value;
use serde_json::Value as JsonValue;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use super::config::{parse_entry, SyncConfig};
use crate::report::{Table, Transcript, INDENT};
use crate::source::{Repository, RepositoryInfo, SourceProvider};
use crate::template::{
    AuditKey, OptionalVariablePolicy, RenderRecord, Resolution, TemplateEngine, TemplateState,
};

/// Bindings that always refer to the repository the files are written into
pub const DESTINATION_NAMES: &[&str] = &["repo", "dst", "destination", "current"];
/// Bindings that always refer to the repository the files come from
pub const SOURCE_NAMES: &[&str] = &["src", "source"];

fn is_reserved(name: &str) -> bool {
    DESTINATION_NAMES.contains(&name) || SOURCE_NAMES.contains(&name)
}

pub struct FileSync {
    engine: TemplateEngine,
    transcript: Transcript,
    output_dir: PathBuf,
    optional_variables: OptionalVariablePolicy,
}

impl FileSync {
    pub fn new(
        engine: TemplateEngine,
        transcript: Transcript,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            engine,
            transcript,
            output_dir: output_dir.into(),
            optional_variables: OptionalVariablePolicy::default(),
        }
    }

    pub fn with_optional_variables(mut self, policy: OptionalVariablePolicy) -> Self {
        self.optional_variables = policy;
        self
    }

    pub fn engine(&self) -> &TemplateEngine {
        &self.engine
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn transcript_mut(&mut self) -> &mut Transcript {
        &mut self.transcript
    }

    pub fn into_transcript(self) -> Transcript {
        self.transcript
    }

    /// Process every upstream and directive, returning the number of errors
    pub async fn iterate_config(
        &mut self,
        config: &SyncConfig,
        provider: &dyn SourceProvider,
        destination: &RepositoryInfo,
    ) -> usize {
        let mut errors = 0;
        for (upstream_name, files) in config.iter() {
            let upstream = match provider.get_repo(upstream_name).await {
                Ok(upstream) => upstream,
                Err(e) => {
                    warn!("Skipping {}: {}", upstream_name, e);
                    self.transcript
                        .error(format!("* ❌ Failed to fetch `{}`: {}", upstream_name, e));
                    errors += 1;
                    continue;
                }
            };
            self.transcript
                .print(format!("* 🔄 Fetching files from `{}`", upstream_name));

            for spec in files {
                let entry = match parse_entry(spec) {
                    Ok(entry) => entry,
                    Err(e) => {
                        self.transcript
                            .error(format!("* ❌ Invalid file definition (`{}`), {}", spec, e));
                        errors += 1;
                        continue;
                    }
                };

                errors += match (entry.remove, entry.src.as_deref()) {
                    (true, _) => self.remove_file(&entry.dst).await,
                    (false, Some(src)) => {
                        self.template_file(
                            destination,
                            upstream_name,
                            upstream.as_ref(),
                            src,
                            &entry.dst,
                            &entry.context,
                        )
                        .await
                    }
                    (false, None) => {
                        self.transcript.error(format!(
                            "* ❌ Invalid file definition (`{}`), expected `src`",
                            spec
                        ));
                        1
                    }
                };
            }
        }
        info!("Processed {} upstream(s) with {} error(s)", config.len(), errors);
        errors
    }

    /// Delete `dst` below the output directory; a file that is already gone is fine
    pub async fn remove_file(&mut self, dst: &Path) -> usize {
        let target = self.output_dir.join(dst);
        match fs::remove_file(&target).await {
            Ok(()) => {
                debug!("Removed {}", target.display());
                self.transcript
                    .print_indented(format!("* ❎ `{}` removed", dst.display()), INDENT);
                0
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.transcript.print_indented(
                    format!("* ⚠️ `{}` already removed", dst.display()),
                    INDENT,
                );
                0
            }
            Err(e) => {
                self.transcript.error_indented(
                    format!("* ❌ Failed to remove `{}`: {}", dst.display(), e),
                    INDENT,
                );
                1
            }
        }
    }

    /// Fetch `src` from `upstream`, render it and write it to `dst`.
    ///
    /// Returns 1 when the file could not be produced or when the template
    /// referenced a variable that was neither bound nor guarded, 0 otherwise.
    pub async fn template_file(
        &mut self,
        destination: &RepositoryInfo,
        upstream_name: &str,
        upstream: &dyn Repository,
        src: &str,
        dst: &Path,
        context: &IndexMap<String, JsonValue>,
    ) -> usize {
        let content = match upstream.get_contents(src).await {
            Ok(content) => content,
            Err(e) => {
                self.transcript
                    .error_indented(format!("* ❌ Failed to fetch `{}`: {}", src, e), INDENT);
                return 1;
            }
        };

        let bindings = bindings(destination, upstream.info(), context);
        let tracker = self.engine.tracker().clone();
        let scope = tracker.audit(AuditKey::new(
            upstream_name,
            src,
            dst.display().to_string(),
        ));
        let rendered = match self.engine.render(src, &content, bindings) {
            Ok(rendered) => rendered,
            Err(e) => {
                self.transcript
                    .error_indented(format!("* ❌ Failed to template `{}`: {}", src, e), INDENT);
                return 1;
            }
        };
        let record = scope.record();
        drop(scope);

        let target = self.output_dir.join(dst);
        if let Err(e) = write_output(&target, &rendered).await {
            self.transcript.error_indented(
                format!("* ❌ Failed to write `{}`: {}", dst.display(), e),
                INDENT,
            );
            return 1;
        }
        debug!("Wrote {} ({} bytes)", target.display(), rendered.len());

        let undefined = names_with(&record, &Resolution::Undefined);
        let optional = names_with(&record, &Resolution::Optional);
        let line = format!("`{}` → `{}`", src, dst.display());
        let errors = if !undefined.is_empty() {
            self.transcript.error_indented(
                format!("* ❌ {} (undefined: {})", line, quoted(&undefined)),
                INDENT,
            );
            1
        } else if !optional.is_empty() && self.optional_variables == OptionalVariablePolicy::Warn {
            self.transcript.print_indented(
                format!("* ⚠️ {} (optional: {})", line, quoted(&optional)),
                INDENT,
            );
            0
        } else {
            self.transcript.print_indented(format!("* ✅ {}", line), INDENT);
            0
        };

        let details = details_table(&record, context);
        if !details.is_empty() {
            self.transcript.print_indented(details.render(), INDENT * 2);
        }
        errors
    }

    /// Run-wide stub usage, including stubs that no render referenced
    pub fn stub_summary(&self) -> crate::template::Result<Table> {
        let known = self.engine.list_stubs()?;
        let mut table = Table::markdown(["Stub", "State", "Count"]);
        for (stub, totals) in self.engine.tracker().aggregate(known) {
            table.add_row([
                format!("`{}`", stub),
                totals.state().to_string(),
                totals.count().to_string(),
            ]);
        }
        Ok(table)
    }
}

/// Caller context overlaid with the reserved repository bindings
fn bindings(
    destination: &RepositoryInfo,
    source: &RepositoryInfo,
    context: &IndexMap<String, JsonValue>,
) -> IndexMap<String, Value> {
    let mut bindings: IndexMap<String, Value> = context
        .iter()
        .map(|(key, value)| (key.clone(), Value::from_serialize(value)))
        .collect();
    let destination = Value::from_serialize(destination);
    let source = Value::from_serialize(source);
    for name in DESTINATION_NAMES {
        bindings.insert(name.to_string(), destination.clone());
    }
    for name in SOURCE_NAMES {
        bindings.insert(name.to_string(), source.clone());
    }
    bindings
}

async fn write_output(target: &Path, rendered: &str) -> std::io::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(target, rendered).await
}

fn names_with<'a>(record: &'a RenderRecord, wanted: &Resolution) -> Vec<&'a str> {
    record
        .variables
        .iter()
        .filter(|(name, resolution)| !is_reserved(name) && *resolution == wanted)
        .map(|(name, _)| name.as_str())
        .collect()
}

fn quoted(names: &[&str]) -> String {
    names
        .iter()
        .map(|name| format!("`{}`", name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn details_table(record: &RenderRecord, context: &IndexMap<String, JsonValue>) -> Table {
    let mut table = Table::grid();
    for (stub, count) in &record.stubs {
        table.add_row([
            "*".to_string(),
            TemplateState::from_count(*count).to_string(),
            format!("`{}`", stub),
        ]);
    }
    for (name, resolution) in &record.variables {
        if is_reserved(name) {
            continue;
        }
        let value = match resolution {
            Resolution::Bound(display) => display.as_str(),
            Resolution::Optional | Resolution::Undefined => "",
        };
        table.add_row([
            "*".to_string(),
            TemplateState::from_resolution(resolution).to_string(),
            format!("`{}={}`", name, value),
        ]);
    }
    for (name, value) in context {
        if record.variables.contains_key(name) || is_reserved(name) {
            continue;
        }
        table.add_row([
            "*".to_string(),
            TemplateState::Unused.to_string(),
            format!("`{}={}`", name, display_json(value)),
        ]);
    }
    table
}

fn display_json(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
