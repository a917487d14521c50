#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::wildcard_imports,
    clippy::indexing_slicing
)]
//! Integration tests for `ConfigurationView` and collapsed output.
//!
//! These tests verify that:
//! - lookups return fully resolved values
//! - collapsed output contains no operations and re-reads to the same data
//! - the parse trace renders in a stable format

mod common;

use configparser_enhanced::config::{HandlerRegistry, ParseEngine};
use configparser_enhanced::settings::Settings;

const SITE: &str = "\
[A]
key1: value1
use B:
key1: value3

[B]
key1: value2
key2: value2b
paths:
    /opt/one
    /opt/two
";

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

#[test]
fn view_lookups_resolve_imports() {
    let mut engine = common::engine(SITE);
    let mut view = engine.data();
    assert_eq!(view.sections(), ["A", "B"]);
    assert_eq!(view.len(), 2);
    assert!(!view.is_empty());
    assert!(view.has_section("B"));
    assert!(!view.has_section("C"));
    assert_eq!(view.get("A", "key1").unwrap().as_deref(), Some("value3"));
    assert_eq!(
        view.get("A", "paths").unwrap().as_deref(),
        Some("/opt/one\n/opt/two")
    );
    assert_eq!(view.get("A", "use B").unwrap(), None);
    assert_eq!(view.options("A").unwrap(), ["key1", "key2", "paths"]);
    assert_eq!(
        view.items("B").unwrap()[0],
        ("key1".to_string(), "value2".to_string())
    );
}

#[test]
fn view_lookup_of_missing_section_follows_policy() {
    let mut strict = common::engine("[A]\n");
    assert!(strict.data().get("Z", "k").is_err());

    let mut lenient = common::engine_at_level("[A]\n", 0);
    assert_eq!(lenient.data().get("Z", "k").unwrap(), None);
    assert_eq!(lenient.data().get_or("Z", "k", "fallback").unwrap(), "fallback");
}

// ---------------------------------------------------------------------------
// Collapsed output
// ---------------------------------------------------------------------------

#[test]
fn collapsed_output() {
    let mut engine = common::engine(SITE);
    let text = engine.data().to_ini_string().unwrap();
    insta::assert_snapshot!(text, @r"
    [A]
    key1: value3
    key2: value2b
    paths: /opt/one
        /opt/two

    [B]
    key1: value2
    key2: value2b
    paths: /opt/one
        /opt/two
    ");
}

#[test]
fn collapsed_output_rereads_without_handlers() {
    let mut engine = common::engine(SITE);
    let mut buf = Vec::new();
    engine.write(&mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();

    let mut reread = ParseEngine::from_ini_str(
        &text,
        HandlerRegistry::bare().build(),
        Settings::default(),
    )
    .unwrap();
    for section in ["A", "B"] {
        assert_eq!(
            reread.parse_section(section).unwrap().options(),
            engine.parse_section(section).unwrap().options(),
            "section {section}"
        );
    }
}

#[test]
fn collapsed_output_keeps_blank_lines_in_lists() {
    let mut engine = common::engine("[A]\nmodules:\n    gcc\n\n    openmpi\n");
    let text = engine.data().to_ini_string().unwrap();
    assert_eq!(text, "[A]\nmodules: gcc\n\n    openmpi\n");

    let mut reread = common::engine(&text);
    assert_eq!(
        reread.data().get("A", "modules").unwrap().as_deref(),
        Some("gcc\n\nopenmpi")
    );
}

#[test]
fn collapsed_output_stops_at_first_raised_fault() {
    let mut engine = common::engine("[A]\nk: v\n[B]\nuse B\n");
    let err = engine.data().to_ini_string().unwrap_err();
    assert_eq!(err.kind(), "circular-reference");
}

// ---------------------------------------------------------------------------
// Trace rendering
// ---------------------------------------------------------------------------

#[test]
fn rendered_trace() {
    let mut engine = common::engine("[A]\nk: v\nuse B\n[B]\nb: 1\n");
    engine.parse_section("A").unwrap();
    insta::assert_snapshot!(engine.trace().render(), @r"
    SECTION_ENTER   A
    KEY_MATCH       k value=v
    HANDLER_ENTER   use section=A key=use B
    SECTION_ENTER     B
    KEY_MATCH         b value=1
    SECTION_EXIT      B keys=1
    HANDLER_EXIT    use status=ok
    SECTION_EXIT    A keys=2
    ");
}

#[test]
fn trace_json_lines_are_parseable() {
    let mut engine = common::engine_at_level("[A]\nuse MISSING\n", 0);
    engine.parse_section("A").unwrap();
    let lines = engine.trace().to_json_lines().unwrap();
    let values: Vec<serde_json::Value> = lines
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let warning = values
        .iter()
        .find(|v| v["kind"] == "warning")
        .expect("warning entry");
    assert_eq!(warning["name"], "section-not-found");
    assert_eq!(warning["metadata"]["decision"], "silent");
}
