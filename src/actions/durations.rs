// ABOUTME: Combine per-OS test durations from new CI artifacts with the stored averages
// ABOUTME: Reports per-OS statistics with deltas and writes the updated mean durations

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::error::{ActionError, Result};
use crate::report::{Table, Transcript};

/// OS name to test name to every duration collected for it
pub type Combined = BTreeMap<String, BTreeMap<String, Vec<f64>>>;
pub type StatsMap = BTreeMap<String, DurationStats>;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DurationStats {
    pub number_of_tests: usize,
    pub total_run_time: f64,
}

impl DurationStats {
    pub fn average_run_time(&self) -> f64 {
        if self.number_of_tests == 0 {
            0.0
        } else {
            self.total_run_time / self.number_of_tests as f64
        }
    }
}

/// Read one `<os>.json` file of `{test: seconds}` and fold it into `stats`
fn read_durations(path: &Path, stats: &mut StatsMap) -> Result<(String, BTreeMap<String, f64>)> {
    let os_name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .ok_or_else(|| ActionError::InvalidInput(format!("no file name in {}", path.display())))?;
    let content = std::fs::read_to_string(path).map_err(ActionError::io(path))?;
    let data: BTreeMap<String, f64> =
        serde_json::from_str(&content).map_err(|source| ActionError::JsonError {
            origin: path.display().to_string(),
            source,
        })?;

    let os_stats = stats.entry(os_name.clone()).or_default();
    os_stats.number_of_tests += data.len();
    os_stats.total_run_time += data.values().sum::<f64>();

    Ok((os_name, data))
}

fn json_files(dir: &Path, max_depth: usize) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .max_depth(max_depth)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| ActionError::InvalidInput(e.to_string()))?;
        let is_json = entry.path().extension().is_some_and(|ext| ext == "json");
        if entry.file_type().is_file() && is_json {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Collect every `**/*.json` below the artifacts directory
pub fn aggregate_new_durations(artifacts_dir: &Path) -> Result<(Combined, StatsMap)> {
    let mut combined = Combined::new();
    let mut stats = StatsMap::new();
    for path in json_files(artifacts_dir, usize::MAX)? {
        let (os_name, data) = read_durations(&path, &mut stats)?;
        debug!("Read {} durations for {} from {}", data.len(), os_name, path.display());
        let os_combined = combined.entry(os_name).or_default();
        for (test, seconds) in data {
            os_combined.entry(test).or_default().push(seconds);
        }
    }
    Ok((combined, stats))
}

/// Fold the stored `*.json` durations into `combined`.
///
/// Stored OSes without new data are dropped (and their file deleted when
/// `unlink` is set); stored tests without new data are dropped.
pub fn aggregate_old_durations(
    durations_dir: &Path,
    combined: &mut Combined,
    unlink: bool,
    transcript: &mut Transcript,
) -> Result<StatsMap> {
    let mut stats = StatsMap::new();
    for path in json_files(durations_dir, 1)? {
        let (os_name, old_data) = read_durations(&path, &mut stats)?;

        let Some(os_combined) = combined.get_mut(&os_name) else {
            if unlink {
                transcript.print(format!(
                    "⚠️ {} not present in new durations, removing",
                    os_name
                ));
                std::fs::remove_file(&path).map_err(ActionError::io(&path))?;
            } else {
                transcript.print(format!(
                    "⚠️ {} not present in new durations, skipping",
                    os_name
                ));
            }
            continue;
        };

        for (test, seconds) in old_data {
            match os_combined.get_mut(&test) {
                Some(values) => values.push(seconds),
                None => transcript.print(format!(
                    "⚠️ {}::{} not present in new durations, removing",
                    os_name, test
                )),
            }
        }
    }
    Ok(stats)
}

fn marker(good: bool) -> &'static str {
    if good {
        "🟢"
    } else {
        "🔴"
    }
}

/// Markdown table of new statistics with their change against the stored ones
pub fn stats_table(new_stats: &StatsMap, old_stats: &StatsMap) -> Table {
    let mut table = Table::markdown([
        "OS",
        "Number of tests",
        "Total run time",
        "Average run time",
    ]);
    let os_names: BTreeSet<&String> = new_stats.keys().chain(old_stats.keys()).collect();
    for os_name in os_names {
        let new = new_stats.get(os_name).copied().unwrap_or_default();
        let old = old_stats.get(os_name).copied().unwrap_or_default();

        let count_delta = new.number_of_tests as i64 - old.number_of_tests as i64;
        let total_delta = new.total_run_time - old.total_run_time;
        let average_delta = new.average_run_time() - old.average_run_time();

        table.add_row([
            os_name.clone(),
            format!(
                "{} ({:+}) {}",
                new.number_of_tests,
                count_delta,
                marker(count_delta >= 0)
            ),
            format!(
                "{:.2} ({:+.2}) {}",
                new.total_run_time,
                total_delta,
                marker(total_delta < 0.0)
            ),
            format!(
                "{:.2} ({:+.2}) {}",
                new.average_run_time(),
                average_delta,
                marker(average_delta < 0.0)
            ),
        ]);
    }
    table
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Write `<os>.json` with the mean of every test's collected durations
pub fn write_averages(durations_dir: &Path, combined: &Combined) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for (os_name, tests) in combined {
        let averages: BTreeMap<&String, f64> = tests
            .iter()
            .map(|(test, values)| (test, mean(values)))
            .collect();

        let mut buffer = Vec::new();
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        averages
            .serialize(&mut serializer)
            .map_err(|source| ActionError::JsonError {
                origin: os_name.clone(),
                source,
            })?;
        buffer.push(b'\n');

        let path = durations_dir.join(format!("{}.json", os_name));
        std::fs::write(&path, buffer).map_err(ActionError::io(&path))?;
        written.push(path);
    }
    Ok(written)
}

/// Run the whole combination, printing the statistics table to `transcript`
pub fn combine_durations(
    durations_dir: &Path,
    artifacts_dir: &Path,
    transcript: &mut Transcript,
) -> Result<Vec<PathBuf>> {
    let (mut combined, new_stats) = aggregate_new_durations(artifacts_dir)?;
    let old_stats = aggregate_old_durations(durations_dir, &mut combined, true, transcript)?;

    transcript.print(stats_table(&new_stats, &old_stats).render());

    let written = write_averages(durations_dir, &combined)?;
    info!("Updated {} duration file(s)", written.len());
    Ok(written)
}
