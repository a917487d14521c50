//! Ordered diagnostic trace of a single top-level parse.
//!
//! Unlike the `tracing` output (which is filtered by verbosity), the parse
//! trace records **every** section entry/exit, handler call, generic key
//! assignment and fault, so the full sequence can be reconstructed after the
//! fact regardless of the configured warning flags.
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt::Write as _;

/// Event kinds for the parse trace.
///
/// Each variant maps to a short uppercase tag in the rendered output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TraceKind {
    /// Parsing of a section started.
    SectionEntry,
    /// Parsing of a section finished.
    SectionExit,
    /// An operation handler is about to run.
    HandlerEntry,
    /// An operation handler returned.
    HandlerExit,
    /// An option was assigned as a generic key.
    KeyMatch,
    /// A fault was reported (raised, warned or silenced).
    Warning,
}

impl TraceKind {
    /// Short tag for the rendered trace line.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::SectionEntry => "SECTION_ENTER",
            Self::SectionExit => "SECTION_EXIT",
            Self::HandlerEntry => "HANDLER_ENTER",
            Self::HandlerExit => "HANDLER_EXIT",
            Self::KeyMatch => "KEY_MATCH",
            Self::Warning => "WARNING",
        }
    }
}

/// One chronological trace record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEntry {
    /// What happened.
    pub kind: TraceKind,
    /// Section, operation, or key name the event refers to.
    pub name: String,
    /// Number of active sections when the event was recorded.
    pub depth: usize,
    /// Free-form details (section, key, fault kind, decision, ...).
    pub metadata: IndexMap<String, String>,
}

/// Ordered diagnostic log for one top-level parse call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ParseTrace {
    entries: Vec<TraceEntry>,
}

impl ParseTrace {
    /// Create an empty trace.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append an entry and mirror it to `tracing` at `TRACE` level.
    pub fn record<I, K, V>(&mut self, kind: TraceKind, name: &str, depth: usize, metadata: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let metadata: IndexMap<String, String> = metadata
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        tracing::trace!(
            target: "configparser_enhanced::trace",
            "{} {name} depth={depth} {metadata:?}",
            kind.tag()
        );
        self.entries.push(TraceEntry {
            kind,
            name: name.to_string(),
            depth,
            metadata,
        });
    }

    /// All entries in chronological order.
    #[must_use]
    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    /// Number of recorded entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries of one kind.
    pub fn of_kind(&self, kind: TraceKind) -> impl Iterator<Item = &TraceEntry> {
        self.entries.iter().filter(move |e| e.kind == kind)
    }

    /// Iterate over the recorded faults.
    pub fn warnings(&self) -> impl Iterator<Item = &TraceEntry> {
        self.of_kind(TraceKind::Warning)
    }

    /// Render the trace as aligned text, one event per line, indented by depth.
    ///
    /// # Examples
    ///
    /// ```
    /// use configparser_enhanced::logging::{ParseTrace, TraceKind};
    ///
    /// let mut trace = ParseTrace::new();
    /// trace.record(TraceKind::SectionEntry, "A", 1, [("source", "site.ini")]);
    /// assert_eq!(trace.render(), "SECTION_ENTER   A source=site.ini\n");
    /// ```
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            let indent = "  ".repeat(entry.depth.saturating_sub(1));
            let _ = write!(out, "{:<15} {indent}{}", entry.kind.tag(), entry.name);
            for (k, v) in &entry.metadata {
                let _ = write!(out, " {k}={v}");
            }
            out.push('\n');
        }
        out
    }

    /// Serialize the trace as JSON lines, one object per entry.
    ///
    /// # Errors
    ///
    /// Returns an error if an entry cannot be serialized.
    pub fn to_json_lines(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&serde_json::to_string(entry)?);
            out.push('\n');
        }
        Ok(out)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn none() -> [(&'static str, String); 0] {
        []
    }

    #[test]
    fn records_in_order() {
        let mut trace = ParseTrace::new();
        trace.record(TraceKind::SectionEntry, "A", 1, none());
        trace.record(TraceKind::KeyMatch, "key1", 1, none());
        trace.record(TraceKind::SectionExit, "A", 1, none());

        let kinds: Vec<TraceKind> = trace.entries().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TraceKind::SectionEntry,
                TraceKind::KeyMatch,
                TraceKind::SectionExit
            ]
        );
        assert_eq!(trace.len(), 3);
    }

    #[test]
    fn warnings_filters_by_kind() {
        let mut trace = ParseTrace::new();
        trace.record(TraceKind::KeyMatch, "key1", 1, none());
        trace.record(TraceKind::Warning, "option-format", 1, [("decision", "warn")]);

        let warnings: Vec<&TraceEntry> = trace.warnings().collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].metadata["decision"], "warn");
    }

    #[test]
    fn render_indents_nested_entries() {
        let mut trace = ParseTrace::new();
        trace.record(TraceKind::SectionEntry, "A", 1, none());
        trace.record(TraceKind::SectionEntry, "B", 2, none());
        let rendered = trace.render();
        assert_eq!(rendered, "SECTION_ENTER   A\nSECTION_ENTER     B\n");
    }

    #[test]
    fn json_lines_use_kebab_case_kinds() {
        let mut trace = ParseTrace::new();
        trace.record(TraceKind::HandlerEntry, "use", 1, [("key", "use B")]);
        let json = trace.to_json_lines().unwrap();
        assert_eq!(
            json,
            "{\"kind\":\"handler-entry\",\"name\":\"use\",\"depth\":1,\"metadata\":{\"key\":\"use B\"}}\n"
        );
    }

    #[test]
    fn new_trace_is_empty() {
        assert!(ParseTrace::new().is_empty());
        assert_eq!(ParseTrace::default(), ParseTrace::new());
    }
}
