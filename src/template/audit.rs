// ABOUTME: Render audit tracking for stubs and context variables
// ABOUTME: Records per-render usage behind a scoped current key and aggregates it per run

use clap::ValueEnum;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::state::TemplateState;

/// Identifies one render: upstream source, source path, destination path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AuditKey {
    pub upstream: String,
    pub src: String,
    pub dst: String,
}

impl AuditKey {
    pub fn new(
        upstream: impl Into<String>,
        src: impl Into<String>,
        dst: impl Into<String>,
    ) -> Self {
        Self {
            upstream: upstream.into(),
            src: src.into(),
            dst: dst.into(),
        }
    }
}

impl fmt::Display for AuditKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} → {}", self.upstream, self.src, self.dst)
    }
}

/// Outcome of looking up a context variable during a render
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Found in the bindings, carries the rendered value
    Bound(String),
    /// Not bound, but the template guarded the reference itself
    Optional,
    /// Not bound and referenced without a guard
    Undefined,
}

/// Stub name to signed usage count, negative means the lookup failed
pub type StubUsage = IndexMap<String, i64>;

pub type VariableUsage = IndexMap<String, Resolution>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderRecord {
    pub stubs: StubUsage,
    pub variables: VariableUsage,
}

impl RenderRecord {
    pub fn is_empty(&self) -> bool {
        self.stubs.is_empty() && self.variables.is_empty()
    }
}

/// How repeated failed lookups of the same stub are counted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MissingStubPolicy {
    /// A missing stub is recorded as -1 no matter how often it is looked up
    #[default]
    Pin,
    /// Every failed lookup decrements the count further
    Decrement,
}

/// Whether guarded-but-unbound variables surface as warnings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OptionalVariablePolicy {
    #[default]
    Warn,
    Ignore,
}

/// Run-wide totals for one stub
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StubTotals {
    pub found: u64,
    pub missing: u64,
}

impl StubTotals {
    pub fn state(&self) -> TemplateState {
        if self.found > 0 {
            TemplateState::Used
        } else if self.missing > 0 {
            TemplateState::Missing
        } else {
            TemplateState::Unused
        }
    }

    pub fn count(&self) -> u64 {
        if self.found > 0 {
            self.found
        } else {
            self.missing
        }
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    current: Option<AuditKey>,
    records: IndexMap<AuditKey, RenderRecord>,
    // set while a `default` filter or `defined` test resolves its operand
    guarded: bool,
}

/// Shared audit state for all renders of one run.
///
/// Cloning yields another handle to the same state; the engine hooks hold
/// one clone and the orchestration loop holds another. Only one render is
/// ever in flight, the lock exists because the engine requires `Send + Sync`
/// callbacks.
#[derive(Debug, Clone, Default)]
pub struct AuditTracker {
    state: Arc<Mutex<TrackerState>>,
    missing_stubs: MissingStubPolicy,
}

impl AuditTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_missing_stub_policy(mut self, policy: MissingStubPolicy) -> Self {
        self.missing_stubs = policy;
        self
    }

    /// Make `key` the current render until the returned scope is dropped
    pub fn audit(&self, key: AuditKey) -> AuditScope<'_> {
        let mut state = self.state.lock();
        if let Some(previous) = &state.current {
            debug!("Audit scope {} replaced by {}", previous, key);
        }
        state.records.entry(key.clone()).or_default();
        state.current = Some(key.clone());
        state.guarded = false;
        AuditScope { tracker: self, key }
    }

    pub fn current(&self) -> Option<AuditKey> {
        self.state.lock().current.clone()
    }

    /// Fragment lookup hook, a no-op outside of an audit scope
    pub fn record_stub(&self, name: &str, found: bool) {
        let mut guard = self.state.lock();
        let TrackerState {
            current, records, ..
        } = &mut *guard;
        let Some(record) = current.as_ref().and_then(|key| records.get_mut(key)) else {
            return;
        };

        let count = record.stubs.entry(name.to_string()).or_insert(0);
        if found {
            // a stub already recorded missing stays missing for this render
            if *count >= 0 {
                *count += 1;
            }
        } else {
            *count = match self.missing_stubs {
                MissingStubPolicy::Pin => -1,
                MissingStubPolicy::Decrement => (*count).min(0) - 1,
            };
        }
    }

    /// Variable resolution hook, `value` is `None` when the name is unbound
    pub fn record_variable(&self, name: &str, value: Option<String>) {
        let mut guard = self.state.lock();
        let TrackerState {
            current,
            records,
            guarded,
        } = &mut *guard;
        let Some(record) = current.as_ref().and_then(|key| records.get_mut(key)) else {
            return;
        };

        let resolution = match value {
            Some(display) => Resolution::Bound(display),
            None if *guarded => {
                // an unguarded reference anywhere in the render keeps it undefined
                record
                    .variables
                    .entry(name.to_string())
                    .or_insert(Resolution::Optional);
                return;
            }
            None => Resolution::Undefined,
        };
        record.variables.insert(name.to_string(), resolution);
    }

    /// Run `lookup` with every unbound name it resolves recorded as optional
    pub fn guarded<T>(&self, lookup: impl FnOnce() -> T) -> T {
        self.state.lock().guarded = true;
        let result = lookup();
        self.state.lock().guarded = false;
        result
    }

    pub fn record(&self, key: &AuditKey) -> Option<RenderRecord> {
        self.state.lock().records.get(key).cloned()
    }

    pub fn records(&self) -> IndexMap<AuditKey, RenderRecord> {
        self.state.lock().records.clone()
    }

    /// Merge every render's stub usage, seeding with the known stubs so
    /// never-referenced ones show up as unused
    pub fn aggregate<I, S>(&self, known_stubs: I) -> IndexMap<String, StubTotals>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut totals: IndexMap<String, StubTotals> = known_stubs
            .into_iter()
            .map(|name| (name.into(), StubTotals::default()))
            .collect();

        let state = self.state.lock();
        for record in state.records.values() {
            for (stub, count) in &record.stubs {
                let entry = totals.entry(stub.clone()).or_default();
                if *count > 0 {
                    entry.found += count.unsigned_abs();
                } else if *count < 0 {
                    entry.missing += count.unsigned_abs();
                }
            }
        }
        totals
    }
}

/// Guard for the current render; dropping it clears the current key
pub struct AuditScope<'a> {
    tracker: &'a AuditTracker,
    key: AuditKey,
}

impl AuditScope<'_> {
    pub fn key(&self) -> &AuditKey {
        &self.key
    }

    /// Snapshot of what this render has recorded so far
    pub fn record(&self) -> RenderRecord {
        self.tracker.record(&self.key).unwrap_or_default()
    }
}

impl Drop for AuditScope<'_> {
    fn drop(&mut self) {
        let mut state = self.tracker.state.lock();
        state.current = None;
        state.guarded = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> AuditKey {
        AuditKey::new("org/upstream", "src.txt", "dst.txt")
    }

    #[test]
    fn test_scope_sets_and_clears_current() {
        let tracker = AuditTracker::new();
        assert!(tracker.current().is_none());

        {
            let scope = tracker.audit(key());
            assert_eq!(tracker.current(), Some(key()));
            assert!(scope.record().is_empty());
        }

        assert!(tracker.current().is_none());
    }

    #[test]
    fn test_scope_cleared_when_render_fails() {
        let tracker = AuditTracker::new();

        let render = || -> Result<(), String> {
            let _scope = tracker.audit(key());
            tracker.record_stub("header", true);
            Err("render exploded".to_string())
        };

        assert!(render().is_err());
        assert!(tracker.current().is_none());
        assert_eq!(tracker.record(&key()).unwrap().stubs["header"], 1);
    }

    #[test]
    fn test_scope_cleared_on_panic() {
        let tracker = AuditTracker::new();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _scope = tracker.audit(key());
            panic!("render panicked");
        }));

        assert!(result.is_err());
        assert!(tracker.current().is_none());
    }

    #[test]
    fn test_tracking_outside_scope_is_noop() {
        let tracker = AuditTracker::new();

        tracker.record_stub("header", true);
        tracker.record_stub("missing", false);
        tracker.record_variable("name", Some("value".to_string()));
        tracker.record_variable("unbound", None);
        tracker.guarded(|| tracker.record_variable("guarded", None));

        assert!(tracker.records().is_empty());

        // a closed scope keeps its record but no longer receives lookups
        drop(tracker.audit(key()));
        tracker.record_stub("header", true);
        assert!(tracker.record(&key()).unwrap().is_empty());
    }

    #[test]
    fn test_stub_counts() {
        let tracker = AuditTracker::new();
        let scope = tracker.audit(key());

        for _ in 0..5 {
            tracker.record_stub("stub", true);
        }
        for _ in 0..3 {
            tracker.record_stub("missing", false);
        }

        let record = scope.record();
        assert_eq!(record.stubs["stub"], 5);
        assert_eq!(record.stubs["missing"], -1);
    }

    #[test]
    fn test_stub_decrement_policy() {
        let tracker = AuditTracker::new().with_missing_stub_policy(MissingStubPolicy::Decrement);
        let scope = tracker.audit(key());

        for _ in 0..3 {
            tracker.record_stub("missing", false);
        }

        assert_eq!(scope.record().stubs["missing"], -3);
    }

    #[test]
    fn test_missing_stub_never_flips_back() {
        let tracker = AuditTracker::new();
        let scope = tracker.audit(key());

        tracker.record_stub("flaky", true);
        tracker.record_stub("flaky", false);
        tracker.record_stub("flaky", true);

        assert_eq!(scope.record().stubs["flaky"], -1);
    }

    #[test]
    fn test_variable_resolutions() {
        let tracker = AuditTracker::new();
        let scope = tracker.audit(key());

        tracker.record_variable("bound", Some("value".to_string()));
        tracker.record_variable("hard", None);
        tracker.guarded(|| tracker.record_variable("soft", None));
        tracker.record_variable("after", None);

        let record = scope.record();
        assert_eq!(
            record.variables["bound"],
            Resolution::Bound("value".to_string())
        );
        assert_eq!(record.variables["hard"], Resolution::Undefined);
        assert_eq!(record.variables["soft"], Resolution::Optional);
        // the guard only covers lookups made inside it
        assert_eq!(record.variables["after"], Resolution::Undefined);
    }

    #[test]
    fn test_hard_reference_outranks_guarded_one() {
        let tracker = AuditTracker::new();
        let scope = tracker.audit(key());

        tracker.record_variable("first", None);
        tracker.guarded(|| tracker.record_variable("first", None));
        tracker.guarded(|| tracker.record_variable("second", None));
        tracker.record_variable("second", None);

        let record = scope.record();
        assert_eq!(record.variables["first"], Resolution::Undefined);
        assert_eq!(record.variables["second"], Resolution::Undefined);
    }

    #[test]
    fn test_guarded_bound_lookup_is_bound() {
        let tracker = AuditTracker::new();
        let scope = tracker.audit(key());

        let value = tracker.guarded(|| {
            tracker.record_variable("name", Some("1".to_string()));
            42
        });

        assert_eq!(value, 42);
        assert_eq!(
            scope.record().variables["name"],
            Resolution::Bound("1".to_string())
        );
    }

    #[test]
    fn test_aggregate_states() {
        let tracker = AuditTracker::new();

        {
            let _scope = tracker.audit(AuditKey::new("org/a", "one", "one"));
            tracker.record_stub("used", true);
            tracker.record_stub("sometimes", false);
            tracker.record_stub("missing", false);
        }
        {
            let _scope = tracker.audit(AuditKey::new("org/a", "two", "two"));
            tracker.record_stub("used", true);
            tracker.record_stub("sometimes", true);
            tracker.record_stub("missing", false);
        }

        let totals = tracker.aggregate(["idle", "used"]);

        assert_eq!(totals["idle"].state(), TemplateState::Unused);
        assert_eq!(totals["used"].state(), TemplateState::Used);
        assert_eq!(totals["used"].count(), 2);
        assert_eq!(totals["sometimes"].state(), TemplateState::Used);
        assert_eq!(totals["missing"].state(), TemplateState::Missing);
        assert_eq!(totals["missing"].count(), 2);

        // known stubs come first in the order given
        let names: Vec<_> = totals.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["idle", "used", "sometimes", "missing"]);
    }
}
