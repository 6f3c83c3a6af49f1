// ABOUTME: Main template engine implementation using MiniJinja
// ABOUTME: Wires the stub loader, root context and guarded lookups through the audit tracker hooks

use indexmap::IndexMap;
use minijinja::machinery::{tokenize, Span, Token, WhitespaceConfig};
use minijinja::syntax::SyntaxConfig;
use minijinja::value::{Enumerator, Object, Value};
use minijinja::{path_loader, Environment, Error, ErrorKind, State, UndefinedBehavior};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;

use super::audit::AuditTracker;
use super::error::{Result, TemplateError};

// `{{ }}` belongs to GitHub Actions and MermaidJS, `{ }` and `%( )s` to Python
pub const BLOCK_DELIMITERS: (&str, &str) = ("[%", "%]");
pub const VARIABLE_DELIMITERS: (&str, &str) = ("[[", "]]");
pub const COMMENT_DELIMITERS: (&str, &str) = ("[#", "#]");

/// Global that resolves a name on behalf of a `default` filter or `defined` test
pub const GUARD_FUNCTION: &str = "__guarded";

// engine globals resolve after the root context and are not user variables
const ENGINE_GLOBALS: &[&str] = &["range", "dict", "debug", "namespace", GUARD_FUNCTION];

const GUARD_FILTERS: &[&str] = &["default", "d"];
const GUARD_TESTS: &[&str] = &["defined", "undefined"];
const LITERALS: &[&str] = &["true", "false", "none", "True", "False", "None"];

pub struct TemplateEngine {
    env: Environment<'static>,
    syntax: SyntaxConfig,
    stubs_dir: PathBuf,
    tracker: AuditTracker,
}

impl TemplateEngine {
    /// Create an engine loading stubs from `stubs_dir` and reporting to `tracker`
    pub fn new(stubs_dir: impl Into<PathBuf>, tracker: AuditTracker) -> Result<Self> {
        let stubs_dir = stubs_dir.into();
        let mut env = Environment::new();

        let syntax = SyntaxConfig::builder()
            .block_delimiters(BLOCK_DELIMITERS.0, BLOCK_DELIMITERS.1)
            .variable_delimiters(VARIABLE_DELIMITERS.0, VARIABLE_DELIMITERS.1)
            .comment_delimiters(COMMENT_DELIMITERS.0, COMMENT_DELIMITERS.1)
            .build()
            .map_err(|e| TemplateError::SyntaxError(e.to_string()))?;
        env.set_syntax(syntax.clone());
        env.set_keep_trailing_newline(true);
        env.set_undefined_behavior(UndefinedBehavior::Lenient);

        let loader = path_loader(stubs_dir.clone());
        let hook = tracker.clone();
        let stub_syntax = syntax.clone();
        env.set_loader(move |name: &str| {
            let loaded = loader(name);
            hook.record_stub(name, matches!(loaded, Ok(Some(_))));
            loaded.map(|source| source.map(|source| guard_references(&source, &stub_syntax)))
        });

        env.add_global(
            GUARD_FUNCTION,
            Value::from_object(GuardedLookup {
                tracker: tracker.clone(),
            }),
        );

        Ok(Self {
            env,
            syntax,
            stubs_dir,
            tracker,
        })
    }

    pub fn stubs_dir(&self) -> &Path {
        &self.stubs_dir
    }

    pub fn tracker(&self) -> &AuditTracker {
        &self.tracker
    }

    /// Render `source` with `bindings` as the root context.
    ///
    /// Loaded stubs are dropped first so every render observes the stubs it
    /// includes. Name lookups are reported to the tracker of the currently
    /// open audit scope, if any.
    pub fn render(
        &mut self,
        name: &str,
        source: &str,
        bindings: IndexMap<String, Value>,
    ) -> Result<String> {
        self.env.clear_templates();

        let source = guard_references(source, &self.syntax);
        let context = Value::from_object(AuditContext {
            bindings,
            tracker: self.tracker.clone(),
        });
        let rendered = self.env.render_named_str(name, &source, context)?;

        debug!("Rendered {} ({} bytes)", name, rendered.len());
        Ok(rendered)
    }

    /// Enumerate the stubs available to templates, relative to the stubs directory
    pub fn list_stubs(&self) -> Result<Vec<String>> {
        let mut stubs = Vec::new();
        for entry in WalkDir::new(&self.stubs_dir).follow_links(true) {
            let entry = entry.map_err(|e| TemplateError::StubDirectory(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.stubs_dir)
                .map_err(|e| TemplateError::StubDirectory(e.to_string()))?;
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            stubs.push(name);
        }
        stubs.sort();
        Ok(stubs)
    }
}

/// Root render context that reports every top-level name lookup
#[derive(Debug)]
struct AuditContext {
    bindings: IndexMap<String, Value>,
    tracker: AuditTracker,
}

impl Object for AuditContext {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let name = key.as_str()?;
        match self.bindings.get(name) {
            Some(value) => {
                self.tracker.record_variable(name, Some(value.to_string()));
                Some(value.clone())
            }
            None => {
                if !ENGINE_GLOBALS.contains(&name) {
                    self.tracker.record_variable(name, None);
                }
                None
            }
        }
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Values(
            self.bindings
                .keys()
                .map(|key| Value::from(key.as_str()))
                .collect(),
        )
    }
}

/// `__guarded('name')`: the value of `name`, with a root lookup reported as guarded
#[derive(Debug)]
struct GuardedLookup {
    tracker: AuditTracker,
}

impl Object for GuardedLookup {
    fn call(
        self: &Arc<Self>,
        state: &State<'_, '_>,
        args: &[Value],
    ) -> std::result::Result<Value, Error> {
        let name = args.first().and_then(Value::as_str).ok_or_else(|| {
            Error::new(ErrorKind::MissingArgument, "expected the guarded variable name")
        })?;
        Ok(self
            .tracker
            .guarded(|| state.lookup(name))
            .unwrap_or(Value::UNDEFINED))
    }
}

/// Route bare names observed by a guard through [`GUARD_FUNCTION`].
///
/// Rewrites `name | default(..)`, `name | d`, `name is [not] defined` and
/// `name is [not] undefined`, plus a bare name given as the fallback of
/// `default`. Attribute chains, literals and everything outside of tags are
/// left alone. Source that fails to tokenize is returned unchanged so the
/// render reports the syntax error.
pub fn guard_references(source: &str, syntax: &SyntaxConfig) -> String {
    let whitespace = WhitespaceConfig {
        keep_trailing_newline: true,
        ..Default::default()
    };
    let tokens = match tokenize(source, false, syntax.clone(), whitespace)
        .collect::<std::result::Result<Vec<_>, _>>()
    {
        Ok(tokens) => tokens,
        Err(_) => return source.to_string(),
    };

    let mut targets: Vec<usize> = Vec::new();
    for index in 0..tokens.len() {
        if is_guard_operand(&tokens, index) {
            targets.push(index);
        }
        if is_guard_fallback(&tokens, index) {
            targets.push(index);
        }
    }
    targets.dedup();

    let mut rewritten = String::with_capacity(source.len());
    let mut cursor = 0;
    for index in targets {
        let (Token::Ident(name), span) = &tokens[index] else {
            continue;
        };
        let (start, end) = (span.start_offset as usize, span.end_offset as usize);
        rewritten.push_str(&source[cursor..start]);
        rewritten.push_str(&format!("{}('{}')", GUARD_FUNCTION, name));
        cursor = end;
    }
    rewritten.push_str(&source[cursor..]);
    rewritten
}

type Tokens<'a> = [(Token<'a>, Span)];

fn ident<'a>(tokens: &Tokens<'a>, index: usize) -> Option<&'a str> {
    match tokens.get(index) {
        Some((Token::Ident(name), _)) => Some(*name),
        _ => None,
    }
}

/// A plain variable name: not a literal, an attribute, a filter or a test
fn is_variable(tokens: &Tokens<'_>, index: usize) -> bool {
    let Some(name) = ident(tokens, index) else {
        return false;
    };
    if LITERALS.contains(&name) {
        return false;
    }
    let Some(previous) = index.checked_sub(1) else {
        return true;
    };
    match &tokens[previous].0 {
        Token::Dot | Token::Pipe => false,
        Token::Ident("is") => false,
        Token::Ident("not") => {
            previous
                .checked_sub(1)
                .and_then(|before| ident(tokens, before))
                != Some("is")
        }
        _ => true,
    }
}

/// `name | default`, `name | d` or `name is [not] (un)defined`
fn is_guard_operand(tokens: &Tokens<'_>, index: usize) -> bool {
    if !is_variable(tokens, index) {
        return false;
    }
    if matches!(tokens.get(index + 1), Some((Token::Pipe, _))) {
        return ident(tokens, index + 2).is_some_and(|filter| GUARD_FILTERS.contains(&filter));
    }
    if ident(tokens, index + 1) != Some("is") {
        return false;
    }
    let test = match ident(tokens, index + 2) {
        Some("not") => ident(tokens, index + 3),
        other => other,
    };
    test.is_some_and(|test| GUARD_TESTS.contains(&test))
}

/// `| default(name)` or `| default(name, ..)`
fn is_guard_fallback(tokens: &Tokens<'_>, index: usize) -> bool {
    let named = ident(tokens, index).is_some_and(|name| !LITERALS.contains(&name));
    if index < 3 || !named {
        return false;
    }
    matches!(tokens[index - 3].0, Token::Pipe)
        && ident(tokens, index - 2).is_some_and(|filter| GUARD_FILTERS.contains(&filter))
        && matches!(tokens[index - 1].0, Token::ParenOpen)
        && matches!(
            tokens.get(index + 1),
            Some((Token::Comma | Token::ParenClose, _))
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::audit::{AuditKey, RenderRecord, Resolution};
    use std::fs;
    use tempfile::TempDir;

    fn engine_with_stubs(stubs: &[(&str, &str)]) -> (TempDir, TemplateEngine) {
        let dir = TempDir::new().unwrap();
        for (name, content) in stubs {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        let engine = TemplateEngine::new(dir.path(), AuditTracker::new()).unwrap();
        (dir, engine)
    }

    fn bindings(pairs: &[(&str, &str)]) -> IndexMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::from(*v)))
            .collect()
    }

    fn audited_render(
        engine: &mut TemplateEngine,
        source: &str,
        pairs: &[(&str, &str)],
    ) -> (String, RenderRecord) {
        let tracker = engine.tracker().clone();
        let key = AuditKey::new("org/repo", "file", "file");
        let rendered = {
            let _scope = tracker.audit(key.clone());
            engine.render("file", source, bindings(pairs)).unwrap()
        };
        (rendered, tracker.record(&key).unwrap())
    }

    fn rewrite(source: &str) -> String {
        let (_dir, engine) = engine_with_stubs(&[]);
        guard_references(source, &engine.syntax)
    }

    #[test]
    fn test_custom_delimiters() {
        let (_dir, mut engine) = engine_with_stubs(&[]);

        let result = engine
            .render(
                "inline",
                "[# note #]Hello [[ name ]]![% if name %] ${{ github.sha }}[% endif %]\n",
                bindings(&[("name", "World")]),
            )
            .unwrap();

        assert_eq!(result, "Hello World! ${{ github.sha }}\n");
    }

    #[test]
    fn test_render_without_scope_tracks_nothing() {
        let (_dir, mut engine) = engine_with_stubs(&[("header", "HEADER")]);

        let result = engine
            .render("inline", "[% include 'header' %] [[ unbound ]]", bindings(&[]))
            .unwrap();

        assert_eq!(result, "HEADER ");
        assert!(engine.tracker().records().is_empty());
    }

    #[test]
    fn test_stub_lookups_are_recorded() {
        let (_dir, mut engine) =
            engine_with_stubs(&[("header", "HEADER"), ("nested/footer", "FOOTER")]);

        let (result, record) = audited_render(
            &mut engine,
            "[% include 'header' %]-[% include 'nested/footer' %]",
            &[],
        );

        assert_eq!(result, "HEADER-FOOTER");
        assert_eq!(record.stubs["header"], 1);
        assert_eq!(record.stubs["nested/footer"], 1);
    }

    #[test]
    fn test_missing_stub_fails_render_and_is_recorded() {
        let (_dir, mut engine) = engine_with_stubs(&[]);
        let tracker = engine.tracker().clone();
        let key = AuditKey::new("org/repo", "file", "file");

        let result = {
            let _scope = tracker.audit(key.clone());
            engine.render("file", "[% include 'absent' %]", bindings(&[]))
        };

        assert!(result.is_err());
        assert!(tracker.current().is_none());
        assert_eq!(tracker.record(&key).unwrap().stubs["absent"], -1);
    }

    #[test]
    fn test_ignore_missing_include_still_records_missing() {
        let (_dir, mut engine) = engine_with_stubs(&[]);

        let (result, record) =
            audited_render(&mut engine, "a[% include 'absent' ignore missing %]b", &[]);

        assert_eq!(result, "ab");
        assert_eq!(record.stubs["absent"], -1);
    }

    #[test]
    fn test_variable_lookups_are_recorded() {
        let (_dir, mut engine) = engine_with_stubs(&[]);

        let (result, record) = audited_render(
            &mut engine,
            concat!(
                "[[ bound ]]|[[ hard ]]|[[ soft | default('x') ]]|",
                "[% if guarded is defined %]y[% endif %]|",
                "[% for i in range(2) %][[ i ]][% endfor %]",
            ),
            &[("bound", "value")],
        );

        assert_eq!(result, "value||x||01");
        assert_eq!(
            record.variables["bound"],
            Resolution::Bound("value".to_string())
        );
        assert_eq!(record.variables["hard"], Resolution::Undefined);
        assert_eq!(record.variables["soft"], Resolution::Optional);
        assert_eq!(record.variables["guarded"], Resolution::Optional);
        assert!(!record.variables.contains_key("range"));
        assert!(!record.variables.contains_key("i"));
        assert!(!record.variables.contains_key(GUARD_FUNCTION));
    }

    #[test]
    fn test_guard_on_local_value_keeps_hard_reference() {
        let (_dir, mut engine) = engine_with_stubs(&[]);

        let (result, record) = audited_render(
            &mut engine,
            "[% set obj = {} %]hello [[ who ]] [[ obj.nick | default('anon') ]]",
            &[],
        );

        assert_eq!(result, "hello  anon");
        assert_eq!(record.variables["who"], Resolution::Undefined);
        assert!(!record.variables.contains_key("obj"));
    }

    #[test]
    fn test_guard_applies_to_its_own_operand() {
        let (_dir, mut engine) = engine_with_stubs(&[]);
        let (result, record) = audited_render(&mut engine, "[[ x | default(y) ]]", &[]);
        assert_eq!(result, "");
        assert_eq!(record.variables["x"], Resolution::Optional);
        assert_eq!(record.variables["y"], Resolution::Optional);

        let (_dir, mut engine) = engine_with_stubs(&[]);
        let (result, record) =
            audited_render(&mut engine, "[[ x | default(y) ]]", &[("y", "fallback")]);
        assert_eq!(result, "fallback");
        assert_eq!(record.variables["x"], Resolution::Optional);
        assert_eq!(
            record.variables["y"],
            Resolution::Bound("fallback".to_string())
        );
    }

    #[test]
    fn test_hard_reference_wins_over_guard() {
        for source in ["[[ x ]][[ x | d ]]", "[[ x | d ]][[ x ]]"] {
            let (_dir, mut engine) = engine_with_stubs(&[]);
            let (_, record) = audited_render(&mut engine, source, &[]);
            assert_eq!(record.variables["x"], Resolution::Undefined, "{}", source);
        }
    }

    #[test]
    fn test_guard_on_loop_variable_records_nothing() {
        let (_dir, mut engine) = engine_with_stubs(&[]);

        let (result, record) = audited_render(
            &mut engine,
            "[% for item in ['a', 'b'] %][[ item | d('-') ]][% endfor %]",
            &[],
        );

        assert_eq!(result, "ab");
        assert!(record.variables.is_empty());
    }

    #[test]
    fn test_guards_in_stubs_are_rewritten() {
        let (_dir, mut engine) = engine_with_stubs(&[("greeting", "Hi [[ who | d('all') ]]")]);

        let (result, record) = audited_render(&mut engine, "[% include 'greeting' %]", &[]);

        assert_eq!(result, "Hi all");
        assert_eq!(record.variables["who"], Resolution::Optional);
    }

    #[test]
    fn test_guard_references_rewrites_only_guarded_names() {
        assert_eq!(
            rewrite("[[ x | default(y, true) ]] [[ obj.nick | d ]] [[ v | upper ]]"),
            concat!(
                "[[ __guarded('x') | default(__guarded('y'), true) ]] ",
                "[[ obj.nick | d ]] [[ v | upper ]]",
            )
        );
        assert_eq!(
            rewrite("[% if a is not defined and not b is undefined %][% endif %]"),
            "[% if __guarded('a') is not defined and not __guarded('b') is undefined %][% endif %]"
        );
        assert_eq!(
            rewrite("x | default [[ 'y | d' ~ none | d ]][# z | d #]"),
            "x | default [[ 'y | d' ~ none | d ]][# z | d #]"
        );
        assert_eq!(rewrite("[[ broken "), "[[ broken ");
    }

    #[test]
    fn test_stub_variables_are_attributed_to_current_render() {
        let (_dir, mut engine) = engine_with_stubs(&[("greeting", "Hi [[ who ]]")]);

        let (result, record) =
            audited_render(&mut engine, "[% include 'greeting' %]", &[("who", "there")]);

        assert_eq!(result, "Hi there");
        assert_eq!(record.stubs["greeting"], 1);
        assert_eq!(
            record.variables["who"],
            Resolution::Bound("there".to_string())
        );
    }

    #[test]
    fn test_default_filter_keeps_jinja_semantics() {
        let (_dir, mut engine) = engine_with_stubs(&[]);

        let result = engine
            .render(
                "inline",
                "[[ empty | default('fallback', true) ]]/[[ empty | d('kept') ]]/[[ missing | d ]]",
                bindings(&[("empty", "")]),
            )
            .unwrap();

        assert_eq!(result, "fallback//");
    }

    #[test]
    fn test_list_stubs() {
        let (_dir, engine) = engine_with_stubs(&[("b", "B"), ("a", "A"), ("dir/c", "C")]);

        assert_eq!(engine.list_stubs().unwrap(), vec!["a", "b", "dir/c"]);
    }
}
