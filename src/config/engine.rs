//! The parse engine: ordered option evaluation, dispatch and composition.
//!
//! [`ParseEngine::parse_section`] walks a section's options in file order.
//! Each option is split into operation and parameter; resolved operations
//! run their [`Handler`], everything else is assigned as a generic key. The
//! single rule "apply in file order, last write per key wins" explains
//! overrides, `use` composition and repeated `use` statements alike.
use indexmap::IndexMap;
use std::path::Path;
use std::sync::Arc;

use super::guard::ActiveSectionStack;
use super::ini::{RawConfig, split_suffix};
use super::key::{self, ParsedKey};
use super::registry::{Handler, HandlerRegistry};
use super::state::{Action, ParseState};
use super::view::ConfigurationView;
use crate::error::ConfigError;
use crate::exception_control::{ExceptionControl, Severity};
use crate::logging::{ParseTrace, TraceKind, event_level};
use crate::settings::Settings;

/// Trace name used for options dispatched to a custom generic handler.
const GENERIC_OPERATION: &str = "<generic>";

const NO_METADATA: [(&str, String); 0] = [];

const ENGINE_TARGET: &str = "configparser_enhanced::engine";

/// Per-call state of one top-level parse: the cycle guard and the trace.
#[derive(Debug, Default)]
pub(crate) struct Session {
    active: ActiveSectionStack,
    trace: ParseTrace,
    /// Message of the last fault raised through exception control, so a
    /// fault coming back out of a handler can be told apart from one the
    /// handler built itself.
    raised: Option<String>,
}

impl Session {
    fn mark_raised(&mut self, fault: ConfigError) -> ConfigError {
        self.raised = Some(fault.to_string());
        fault
    }

    fn was_raised(&self, fault: &ConfigError) -> bool {
        self.raised
            .as_deref()
            .is_some_and(|raised| raised == fault.to_string())
    }
}

/// The option currently being dispatched.
#[derive(Debug, Clone, Copy)]
struct OptionRef<'a> {
    section: &'a str,
    raw_key: &'a str,
    value: &'a str,
    key: &'a ParsedKey,
}

/// Hierarchical INI parse engine.
///
/// # Examples
///
/// ```
/// use configparser_enhanced::config::engine::ParseEngine;
/// use configparser_enhanced::config::registry::HandlerRegistry;
/// use configparser_enhanced::settings::Settings;
///
/// let ini = "[A]\nkey1: value1\nuse B:\nkey1: value3\n[B]\nkey1: value2\nkey2: value2b\n";
/// let mut engine =
///     ParseEngine::from_ini_str(ini, HandlerRegistry::builder().build(), Settings::default())
///         .unwrap();
/// let state = engine.parse_section("A").unwrap();
/// assert_eq!(state.get("key1"), Some("value3"));
/// assert_eq!(state.get("key2"), Some("value2b"));
/// ```
#[derive(Debug)]
pub struct ParseEngine {
    raw: RawConfig,
    registry: HandlerRegistry,
    settings: Settings,
    control: ExceptionControl,
    cache: IndexMap<String, ParseState>,
    last_trace: ParseTrace,
}

impl ParseEngine {
    /// Create an engine over an already loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidExceptionControlLevel`] if the settings
    /// carry an out-of-range level.
    pub fn new(
        raw: RawConfig,
        registry: HandlerRegistry,
        settings: Settings,
    ) -> Result<Self, ConfigError> {
        let control = settings.exception_control()?;
        Ok(Self {
            raw,
            registry,
            settings,
            control,
            cache: IndexMap::new(),
            last_trace: ParseTrace::new(),
        })
    }

    /// Create an engine from INI text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text cannot be loaded or the settings are
    /// invalid.
    pub fn from_ini_str(
        content: &str,
        registry: HandlerRegistry,
        settings: Settings,
    ) -> Result<Self, ConfigError> {
        Self::new(RawConfig::parse_str(content, "<string>")?, registry, settings)
    }

    /// Create an engine from one or more INI files, merged in order.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read or parsed or the settings
    /// are invalid.
    pub fn from_paths<P: AsRef<Path>>(
        paths: &[P],
        registry: HandlerRegistry,
        settings: Settings,
    ) -> Result<Self, ConfigError> {
        Self::new(RawConfig::from_paths(paths)?, registry, settings)
    }

    /// The loaded configuration, before any operation is applied.
    #[must_use]
    pub const fn raw(&self) -> &RawConfig {
        &self.raw
    }

    /// Replace the configuration source and drop every cached result.
    pub fn set_raw(&mut self, raw: RawConfig) {
        self.raw = raw;
        self.invalidate();
    }

    /// Replace the configuration source with the given files.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read or parsed; the previous
    /// source and cache are kept in that case.
    pub fn load_paths<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<(), ConfigError> {
        let raw = RawConfig::from_paths(paths)?;
        self.set_raw(raw);
        Ok(())
    }

    /// Registered handlers.
    #[must_use]
    pub const fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Current settings.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Replace the settings and drop every cached result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidExceptionControlLevel`] if the level is
    /// out of range; the previous settings are kept in that case.
    pub fn set_settings(&mut self, settings: Settings) -> Result<(), ConfigError> {
        self.control = settings.exception_control()?;
        self.settings = settings;
        self.invalidate();
        Ok(())
    }

    /// Drop every cached section result.
    pub fn invalidate(&mut self) {
        self.cache.clear();
    }

    /// Whether the result of a section is cached.
    #[must_use]
    pub fn is_cached(&self, name: &str) -> bool {
        self.cache.contains_key(name)
    }

    /// Trace of the most recent top-level parse that was not served from
    /// cache, including one that failed.
    ///
    /// A [`parse_section`](Self::parse_section) call answered from the cache
    /// leaves this trace untouched, so it keeps describing the earlier parse
    /// that did the work. Call [`invalidate`](Self::invalidate) first to
    /// trace a section again.
    #[must_use]
    pub const fn trace(&self) -> &ParseTrace {
        &self.last_trace
    }

    /// Parse a section (and every section it uses), caching the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::CircularReference`] on a `use` cycle, and any
    /// other fault the exception control policy decides to raise.
    pub fn parse_section(&mut self, name: &str) -> Result<ParseState, ConfigError> {
        if let Some(state) = self.cache.get(name) {
            return Ok(state.clone());
        }
        let mut session = Session::default();
        let result = self.parse_inner(name, &mut session);
        self.last_trace = session.trace;
        result
    }

    /// Parse every section in file order.
    ///
    /// The trace of the whole run is kept as [`trace`](Self::trace).
    ///
    /// # Errors
    ///
    /// Returns the first fault the exception control policy raises.
    pub fn parse_configuration(&mut self) -> Result<(), ConfigError> {
        let names: Vec<String> = self.raw.section_names().map(str::to_string).collect();
        let mut session = Session::default();
        let result = names
            .iter()
            .try_for_each(|name| self.parse_inner(name, &mut session).map(|_| ()));
        self.last_trace = session.trace;
        result
    }

    /// Dict-like read view over the parsed sections.
    pub const fn data(&mut self) -> ConfigurationView<'_> {
        ConfigurationView::new(self)
    }

    /// Write the collapsed configuration (every section fully resolved) as
    /// INI text.
    ///
    /// # Errors
    ///
    /// Returns an error if a section fails to parse or the stream fails.
    pub fn write<W: std::io::Write>(&mut self, out: &mut W) -> Result<(), ConfigError> {
        self.data().write(out)
    }

    /// Emit a message if `level` is within the configured debug level.
    ///
    /// Level 1 messages are emitted at INFO, level 2 at DEBUG and deeper
    /// levels at TRACE, matching the filter `init_subscriber` installs.
    pub(crate) fn debug(&self, level: u8, msg: &str) {
        if self.settings.debug_level < level {
            return;
        }
        match event_level(level) {
            tracing::Level::INFO => tracing::info!(target: ENGINE_TARGET, "{msg}"),
            tracing::Level::DEBUG => tracing::debug!(target: ENGINE_TARGET, "{msg}"),
            _ => tracing::trace!(target: ENGINE_TARGET, "{msg}"),
        }
    }

    fn parse_inner(&mut self, name: &str, session: &mut Session) -> Result<ParseState, ConfigError> {
        if let Some(state) = self.cache.get(name) {
            self.debug(3, &format!("[{name}] served from cache"));
            return Ok(state.clone());
        }

        if let Err(fault) = session.active.push(name) {
            return Err(self.raise(session, Severity::Critical, fault));
        }
        let depth = session.active.depth();
        session
            .trace
            .record(TraceKind::SectionEntry, name, depth, NO_METADATA);
        self.debug(1, &format!("[{name}] parsing (depth {depth})"));

        // Pop on every path so a handler that recovers from a nested error
        // does not leave a stale active entry behind.
        let result = self.parse_options(name, session);
        session.active.pop(name);
        let parsed = result?;

        let keys = parsed.as_ref().map_or(0, ParseState::len);
        session.trace.record(
            TraceKind::SectionExit,
            name,
            depth,
            [("keys", keys.to_string())],
        );

        Ok(match parsed {
            Some(state) => {
                self.cache.insert(name.to_string(), state.clone());
                state
            }
            None => ParseState::new(),
        })
    }

    /// Evaluate the options of `name`. Returns `None` if the section does not
    /// exist and the fault was not raised.
    fn parse_options(
        &mut self,
        name: &str,
        session: &mut Session,
    ) -> Result<Option<ParseState>, ConfigError> {
        let Some(options) = self.raw.section(name).cloned() else {
            let fault = ConfigError::SectionNotFound {
                section: name.to_string(),
            };
            self.report(session, Severity::Serious, fault)?;
            return Ok(None);
        };

        let mut state = ParseState::new();
        for (stored_key, value) in &options {
            let split = match key::split_key(name, stored_key, &self.registry) {
                Ok(split) => split,
                Err(fault @ ConfigError::AmbiguousHandler { .. }) => {
                    return Err(self.raise(session, Severity::Critical, fault));
                }
                Err(fault) => {
                    self.report(session, Severity::Minor, fault)?;
                    continue;
                }
            };

            let option = OptionRef {
                section: name,
                raw_key: split_suffix(stored_key).0,
                value,
                key: &split.parsed,
            };
            match split.handler.clone().or_else(|| self.registry.generic()) {
                Some(handler) => self.dispatch(session, &mut state, &handler, option)?,
                None => {
                    session.trace.record(
                        TraceKind::KeyMatch,
                        &split.parsed.parameter,
                        session.active.depth(),
                        [("value", value.as_str())],
                    );
                    state.set(split.parsed.parameter.clone(), value.clone());
                }
            }
        }
        Ok(Some(state))
    }

    fn dispatch(
        &mut self,
        session: &mut Session,
        state: &mut ParseState,
        handler: &Arc<dyn Handler>,
        option: OptionRef<'_>,
    ) -> Result<(), ConfigError> {
        let operation = option.key.operation.as_deref().unwrap_or(GENERIC_OPERATION);
        let depth = session.active.depth();
        session.trace.record(
            TraceKind::HandlerEntry,
            operation,
            depth,
            [("section", option.section), ("key", option.raw_key)],
        );

        let outcome = handler.handle(&mut HandlerContext {
            engine: &mut *self,
            session: &mut *session,
            state: &mut *state,
            option,
        });

        let status = if outcome.is_ok() { "ok" } else { "error" };
        session
            .trace
            .record(TraceKind::HandlerExit, operation, depth, [("status", status)]);

        let Err(err) = outcome else {
            return Ok(());
        };
        match err.downcast::<ConfigError>() {
            // Already routed through exception control where it was raised.
            Ok(fault) if session.was_raised(&fault) => Err(fault),
            Ok(fault) => self.report(session, Severity::of_fault(&fault), fault),
            Err(err) => {
                let fault = ConfigError::HandlerExecution {
                    section: option.section.to_string(),
                    key: option.raw_key.to_string(),
                    value: option.value.to_string(),
                    source: err.into(),
                };
                self.report(session, Severity::Serious, fault)
            }
        }
    }

    fn report(
        &self,
        session: &mut Session,
        severity: Severity,
        fault: ConfigError,
    ) -> Result<(), ConfigError> {
        let depth = session.active.depth();
        self.control
            .handle(severity, fault, &mut session.trace, depth)
            .map_err(|fault| session.mark_raised(fault))
    }

    fn raise(&self, session: &mut Session, severity: Severity, fault: ConfigError) -> ConfigError {
        let depth = session.active.depth();
        let fault = self
            .control
            .raise(severity, fault, &mut session.trace, depth);
        session.mark_raised(fault)
    }
}

/// Everything a handler sees while processing one option.
///
/// Gives access to the option, the in-progress state of the section being
/// parsed, the parse trace, recursive parsing of other sections, and the
/// exception control policy. Only valid for the duration of one handler call.
pub struct HandlerContext<'a> {
    engine: &'a mut ParseEngine,
    session: &'a mut Session,
    state: &'a mut ParseState,
    option: OptionRef<'a>,
}

impl std::fmt::Debug for HandlerContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerContext")
            .field("section", &self.option.section)
            .field("key", &self.option.key)
            .field("value", &self.option.value)
            .finish_non_exhaustive()
    }
}

impl HandlerContext<'_> {
    /// Section being parsed.
    #[must_use]
    pub const fn section(&self) -> &str {
        self.option.section
    }

    /// The split option key.
    #[must_use]
    pub const fn key(&self) -> &ParsedKey {
        self.option.key
    }

    /// Normalized operation name (empty for a custom generic handler).
    #[must_use]
    pub fn operation(&self) -> &str {
        self.option.key.operation.as_deref().unwrap_or_default()
    }

    /// Operation parameter.
    #[must_use]
    pub fn parameter(&self) -> &str {
        &self.option.key.parameter
    }

    /// Option key as written in the file.
    #[must_use]
    pub const fn raw_key(&self) -> &str {
        self.option.raw_key
    }

    /// Raw option value.
    #[must_use]
    pub const fn value(&self) -> &str {
        self.option.value
    }

    /// State of the section being parsed.
    #[must_use]
    pub const fn state(&self) -> &ParseState {
        self.state
    }

    /// Mutable state of the section being parsed.
    pub const fn state_mut(&mut self) -> &mut ParseState {
        self.state
    }

    /// Append an [`Action`] for the current option to the section state.
    pub fn push_action(&mut self) {
        let action = Action {
            operation: self.operation().to_string(),
            parameter: self.parameter().to_string(),
            value: self.value().to_string(),
            section: self.section().to_string(),
        };
        self.state.push_action(action);
    }

    /// Parse (or fetch from cache) another section within the same
    /// top-level parse, so cycles are detected.
    ///
    /// # Errors
    ///
    /// Returns any fault raised while parsing the section. Such faults have
    /// already been routed through exception control; return them unchanged.
    pub fn parse_section(&mut self, name: &str) -> Result<ParseState, ConfigError> {
        self.engine.parse_inner(name, self.session)
    }

    /// Route a fault through exception control.
    ///
    /// # Errors
    ///
    /// Returns the fault if the policy raises it; the handler should then
    /// return it unchanged.
    pub fn report(&mut self, severity: Severity, fault: ConfigError) -> Result<(), ConfigError> {
        self.engine.report(self.session, severity, fault)
    }

    /// Append a custom entry to the parse trace at the current depth.
    pub fn record<I, K, V>(&mut self, kind: TraceKind, name: &str, metadata: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let depth = self.session.active.depth();
        self.session.trace.record(kind, name, depth, metadata);
    }

    /// Number of sections currently being expanded.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.session.active.depth()
    }

    /// Engine settings.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.engine.settings
    }

    /// Emit a debug message if `level` is within the configured debug level.
    pub fn debug(&self, level: u8, msg: &str) {
        self.engine.debug(level, msg);
    }
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::significant_drop_tightening
)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn engine(ini: &str) -> ParseEngine {
        engine_with(ini, HandlerRegistry::builder().build(), Settings::default())
    }

    fn engine_with(ini: &str, registry: HandlerRegistry, settings: Settings) -> ParseEngine {
        ParseEngine::from_ini_str(ini, registry, settings).expect("engine should build")
    }

    fn pairs(state: &ParseState) -> Vec<(String, String)> {
        state
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn generic_keys_last_write_wins() {
        let mut engine = engine("[A]\nkey1: a\nkey2: x\nkey1: b\n");
        let state = engine.parse_section("A").unwrap();
        assert_eq!(state.get("key1"), Some("b"));
        assert_eq!(state.get("key2"), Some("x"));
    }

    #[test]
    fn use_composition_follows_file_order() {
        let mut engine = engine(
            "[A]\nkey1: value1\nuse B:\nkey1: value3\n[B]\nkey1: value2\nkey2: value2b\n",
        );
        let state = engine.parse_section("A").unwrap();
        assert_eq!(
            pairs(&state),
            vec![
                ("key1".to_string(), "value3".to_string()),
                ("key2".to_string(), "value2b".to_string()),
            ]
        );
    }

    #[test]
    fn import_overrides_earlier_keys() {
        let mut engine = engine("[A]\nkey1: mine\nuse B\n[B]\nkey1: theirs\n");
        assert_eq!(
            engine.parse_section("A").unwrap().get("key1"),
            Some("theirs")
        );
    }

    #[test]
    fn multiple_use_statements_apply_in_order() {
        let mut engine = engine("[A]\nuse B\nuse C\n[B]\nk: b\nonly_b: 1\n[C]\nk: c\n");
        let state = engine.parse_section("A").unwrap();
        assert_eq!(state.get("k"), Some("c"));
        assert_eq!(state.get("only_b"), Some("1"));
    }

    #[test]
    fn nested_use_is_transitive() {
        let mut engine = engine("[A]\nuse B\n[B]\nuse C\nb: 1\n[C]\nc: 1\n");
        let state = engine.parse_section("A").unwrap();
        assert_eq!(state.get("b"), Some("1"));
        assert_eq!(state.get("c"), Some("1"));
        assert!(engine.is_cached("B"));
        assert!(engine.is_cached("C"));
    }

    #[test]
    fn repeated_use_of_same_section_is_not_a_cycle() {
        let mut engine = engine("[A]\nuse B\nk: a\nuse B\n[B]\nk: b\n");
        assert_eq!(engine.parse_section("A").unwrap().get("k"), Some("b"));
    }

    #[test]
    fn self_use_is_circular() {
        let mut engine = engine("[A]\nuse A\n");
        let err = engine.parse_section("A").unwrap_err();
        assert!(matches!(err, ConfigError::CircularReference { .. }));
    }

    #[test]
    fn cycle_is_fatal_even_at_level_zero() {
        let mut engine = engine_with(
            "[A]\nuse B\n[B]\nuse A\n",
            HandlerRegistry::builder().build(),
            Settings::default().with_exception_control_level(0),
        );
        let err = engine.parse_section("A").unwrap_err();
        match err {
            ConfigError::CircularReference { section, chain } => {
                assert_eq!(section, "A");
                assert_eq!(chain, "A -> B -> A");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!engine.is_cached("A"));
        assert!(!engine.is_cached("B"));
    }

    #[test]
    fn completed_nested_sections_stay_cached_after_fatal_fault() {
        let mut engine = engine("[A]\nuse C\nuse B\n[B]\nuse A\n[C]\nc: 1\n");
        assert!(engine.parse_section("A").is_err());
        assert!(engine.is_cached("C"));
        assert!(!engine.is_cached("A"));
    }

    #[test]
    fn missing_section_raises_at_default_level() {
        let mut engine = engine("[A]\nk: v\n");
        let err = engine.parse_section("Z").unwrap_err();
        assert_eq!(err.kind(), "section-not-found");
    }

    #[test]
    fn missing_section_is_empty_at_permissive_level() {
        let mut engine = engine_with(
            "[A]\nk: v\nuse Z\n",
            HandlerRegistry::builder().build(),
            Settings::default().with_exception_control_level(0),
        );
        let state = engine.parse_section("A").unwrap();
        assert_eq!(state.get("k"), Some("v"));
        assert_eq!(engine.trace().warnings().count(), 1);
        assert!(!engine.is_cached("Z"));
    }

    #[test]
    fn results_are_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let registry = HandlerRegistry::builder()
            .register_fn("count", move |_ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .build();
        let mut engine = engine_with("[A]\ncount me\n", registry, Settings::default());
        let first = engine.parse_section("A").unwrap();
        let second = engine.parse_section("A").unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn set_raw_invalidates_cache() {
        let mut engine = engine("[A]\nk: 1\n");
        engine.parse_section("A").unwrap();
        engine.set_raw(RawConfig::parse_str("[A]\nk: 2\n", "test").unwrap());
        assert!(!engine.is_cached("A"));
        assert_eq!(engine.parse_section("A").unwrap().get("k"), Some("2"));
    }

    #[test]
    fn handler_receives_context() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let registry = HandlerRegistry::builder()
            .register_fn("envvar-set", move |ctx| {
                sink.lock().unwrap().push(format!(
                    "{}|{}|{}|{}|{}",
                    ctx.section(),
                    ctx.operation(),
                    ctx.parameter(),
                    ctx.raw_key(),
                    ctx.value()
                ));
                ctx.push_action();
                Ok(())
            })
            .build();
        let mut engine = engine_with(
            "[A]\nEnvVar-Set FOO: bar\n",
            registry,
            Settings::default(),
        );
        let state = engine.parse_section("A").unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["A|envvar_set|FOO|EnvVar-Set FOO|bar".to_string()]
        );
        assert_eq!(state.actions().len(), 1);
        assert_eq!(state.actions()[0].parameter, "FOO");
        assert!(state.get("EnvVar-Set FOO").is_none());
    }

    #[test]
    fn actions_are_imported_by_use() {
        let registry = HandlerRegistry::builder()
            .register_fn("envvar-set", |ctx| {
                ctx.push_action();
                Ok(())
            })
            .build();
        let mut engine = engine_with(
            "[A]\nenvvar-set A: 1\nuse B\nenvvar-set C: 3\n[B]\nenvvar-set B: 2\n",
            registry,
            Settings::default(),
        );
        let state = engine.parse_section("A").unwrap();
        let params: Vec<&str> = state
            .actions()
            .iter()
            .map(|a| a.parameter.as_str())
            .collect();
        assert_eq!(params, ["A", "B", "C"]);
    }

    #[test]
    fn handler_error_is_wrapped() {
        let registry = HandlerRegistry::builder()
            .register_fn("fail", |_ctx| anyhow::bail!("boom"))
            .build();
        let mut engine = engine_with("[A]\nfail now: x\n", registry, Settings::default());
        let err = engine.parse_section("A").unwrap_err();
        match err {
            ConfigError::HandlerExecution {
                section, key, value, ..
            } => {
                assert_eq!(section, "A");
                assert_eq!(key, "fail now");
                assert_eq!(value, "x");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn handler_error_skipped_when_lenient() {
        let registry = HandlerRegistry::builder()
            .register_fn("fail", |_ctx| anyhow::bail!("boom"))
            .build();
        let mut engine = engine_with(
            "[A]\nfail now: x\nk: v\n",
            registry,
            Settings::default().with_exception_control_level(2),
        );
        let state = engine.parse_section("A").unwrap();
        assert_eq!(state.get("k"), Some("v"));
        let warning = engine.trace().warnings().next().unwrap();
        assert_eq!(warning.name, "handler-execution");
    }

    #[test]
    fn ambiguous_handler_is_fatal() {
        let registry = HandlerRegistry::builder()
            .register_fn("use", |_ctx| Ok(()))
            .build();
        let mut engine = engine_with(
            "[A]\nuse B\n[B]\n",
            registry,
            Settings::default().with_exception_control_level(0),
        );
        let err = engine.parse_section("A").unwrap_err();
        assert!(matches!(err, ConfigError::AmbiguousHandler { count: 2, .. }));
    }

    #[test]
    fn handler_built_critical_fault_is_traced() {
        let registry = HandlerRegistry::builder()
            .register_fn("loop", |ctx| {
                Err(ConfigError::CircularReference {
                    section: ctx.section().to_string(),
                    chain: "A -> A".to_string(),
                }
                .into())
            })
            .build();
        let mut engine = engine_with(
            "[A]\nloop now\n",
            registry,
            Settings::default().with_exception_control_level(0),
        );
        let err = engine.parse_section("A").unwrap_err();
        assert_eq!(err.kind(), "circular-reference");
        let warning = engine.trace().warnings().next().unwrap();
        assert_eq!(warning.metadata["decision"], "raise");
    }

    #[test]
    fn routed_nested_fault_is_traced_once() {
        let mut engine = engine("[A]\nuse B\n[B]\nuse C\n[C]\nuse B\n");
        assert!(engine.parse_section("A").is_err());
        assert_eq!(engine.trace().warnings().count(), 1);
    }

    #[test]
    fn ambiguity_only_matters_when_used() {
        let registry = HandlerRegistry::builder()
            .register_fn("dup", |_ctx| Ok(()))
            .register_fn("dup", |_ctx| Ok(()))
            .build();
        let mut engine = engine_with("[A]\nk: v\n", registry, Settings::default());
        assert!(engine.parse_section("A").is_ok());
    }

    #[test]
    fn custom_generic_handler_replaces_assignment() {
        let registry = HandlerRegistry::builder()
            .generic_fn(|ctx| {
                let key = ctx.parameter().to_uppercase();
                let value = ctx.value().to_string();
                ctx.state_mut().set(key, value);
                Ok(())
            })
            .build();
        let mut engine = engine_with("[A]\nkey: v\n", registry, Settings::default());
        let state = engine.parse_section("A").unwrap();
        assert_eq!(state.get("KEY"), Some("v"));
        assert!(engine
            .trace()
            .of_kind(TraceKind::HandlerEntry)
            .any(|e| e.name == GENERIC_OPERATION));
    }

    #[test]
    fn handler_can_recover_from_nested_error() {
        let registry = HandlerRegistry::builder()
            .register_fn("try-use", |ctx| {
                let target = ctx.parameter().to_string();
                if let Ok(imported) = ctx.parse_section(&target) {
                    ctx.state_mut().merge(&imported);
                }
                Ok(())
            })
            .build();
        let mut engine = engine_with(
            "[A]\ntry-use Missing\nuse B\n[B]\nk: v\n",
            registry,
            Settings::default(),
        );
        let state = engine.parse_section("A").unwrap();
        assert_eq!(state.get("k"), Some("v"));
    }

    #[test]
    fn empty_use_parameter_is_skipped_with_warning() {
        let mut engine = engine_with(
            "[A]\nuse:\nk: v\n",
            HandlerRegistry::builder().build(),
            Settings::default().with_exception_control_level(3),
        );
        let state = engine.parse_section("A").unwrap();
        assert_eq!(state.get("k"), Some("v"));
        assert_eq!(
            engine.trace().warnings().next().unwrap().name,
            "option-format"
        );
    }

    #[test]
    fn trace_records_entries_in_order() {
        let mut engine = engine("[A]\nk: v\nuse B\n[B]\nb: 1\n");
        engine.parse_section("A").unwrap();
        let kinds: Vec<(TraceKind, &str, usize)> = engine
            .trace()
            .entries()
            .iter()
            .map(|e| (e.kind, e.name.as_str(), e.depth))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (TraceKind::SectionEntry, "A", 1),
                (TraceKind::KeyMatch, "k", 1),
                (TraceKind::HandlerEntry, "use", 1),
                (TraceKind::SectionEntry, "B", 2),
                (TraceKind::KeyMatch, "b", 2),
                (TraceKind::SectionExit, "B", 2),
                (TraceKind::HandlerExit, "use", 1),
                (TraceKind::SectionExit, "A", 1),
            ]
        );
    }

    #[test]
    fn cache_hit_keeps_previous_trace() {
        let mut engine = engine("[A]\nk: v\n[B]\nb: 1\n");
        engine.parse_section("A").unwrap();
        engine.parse_section("B").unwrap();
        let traced_b = engine.trace().clone();

        engine.parse_section("A").unwrap();
        assert_eq!(engine.trace(), &traced_b);
        assert_eq!(engine.trace().entries()[0].name, "B");

        engine.invalidate();
        engine.parse_section("A").unwrap();
        assert_eq!(engine.trace().entries()[0].name, "A");
    }

    #[test]
    fn trace_is_kept_after_fatal_fault() {
        let mut engine = engine("[A]\nuse B\n[B]\nuse A\n");
        assert!(engine.parse_section("A").is_err());
        let warning = engine.trace().warnings().next().unwrap();
        assert_eq!(warning.name, "circular-reference");
        assert_eq!(warning.metadata["severity"], "critical");
    }

    /// Records the level of every engine message.
    #[derive(Clone, Default)]
    struct LevelCapture(Arc<Mutex<Vec<tracing::Level>>>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for LevelCapture {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            if event.metadata().target() == ENGINE_TARGET {
                self.0.lock().unwrap().push(*event.metadata().level());
            }
        }
    }

    fn engine_message_levels(debug_level: u8) -> Vec<tracing::Level> {
        use tracing_subscriber::layer::SubscriberExt as _;

        let capture = LevelCapture::default();
        let subscriber = tracing_subscriber::registry().with(capture.clone());
        let mut engine = engine_with(
            "[A]\nuse B\nuse B\n[B]\nk: v\n",
            HandlerRegistry::builder().build(),
            Settings::default().with_debug_level(debug_level),
        );
        tracing::subscriber::with_default(subscriber, || {
            engine.parse_section("A").unwrap();
        });
        capture.0.lock().unwrap().clone()
    }

    #[test]
    fn debug_messages_are_emitted_at_matching_levels() {
        use tracing::Level;

        assert!(engine_message_levels(0).is_empty());
        assert_eq!(engine_message_levels(1), [Level::INFO, Level::INFO]);
        assert_eq!(
            engine_message_levels(3),
            [
                Level::INFO,
                Level::DEBUG,
                Level::INFO,
                Level::DEBUG,
                Level::TRACE
            ]
        );
    }

    #[test]
    fn parse_configuration_parses_every_section() {
        let mut engine = engine("[A]\nuse B\n[B]\nb: 1\n[C]\nc: 1\n");
        engine.parse_configuration().unwrap();
        assert!(engine.is_cached("A"));
        assert!(engine.is_cached("B"));
        assert!(engine.is_cached("C"));
    }

    #[test]
    fn invalid_level_is_rejected_at_construction() {
        let err = ParseEngine::from_ini_str(
            "[A]\n",
            HandlerRegistry::builder().build(),
            Settings::default().with_exception_control_level(9),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "invalid-exception-control-level");
    }

    #[test]
    fn set_settings_rejects_invalid_level() {
        let mut engine = engine("[A]\n");
        assert!(engine
            .set_settings(Settings::default().with_exception_control_level(6))
            .is_err());
        assert_eq!(engine.settings().exception_control_level, 4);
    }
}
