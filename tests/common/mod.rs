// Shared helpers for integration tests.
//
// Provides a temporary-directory-backed set of INI sources and a fluent
// builder so each integration test can set up an isolated engine without
// repeating filesystem boilerplate.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use configparser_enhanced::config::{HandlerRegistry, ParseEngine};
use configparser_enhanced::settings::Settings;

/// Path to a file under `tests/fixtures/`.
pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Build an engine from INI text with the default handlers and the given
/// exception control level.
pub fn engine_at_level(ini: &str, level: u8) -> ParseEngine {
    ParseEngine::from_ini_str(
        ini,
        HandlerRegistry::builder().build(),
        Settings::default()
            .with_exception_control_level(level)
            .with_silent_warnings(true),
    )
    .expect("build engine")
}

/// Build an engine from INI text with the default handlers and settings.
pub fn engine(ini: &str) -> ParseEngine {
    engine_at_level(ini, 4)
}

/// An isolated set of INI files backed by a [`tempfile::TempDir`].
///
/// The directory is automatically deleted when dropped.
pub struct IntegrationTestContext {
    /// Temporary directory holding the INI sources.
    pub root: tempfile::TempDir,
    /// Sources written so far, in load order.
    pub sources: Vec<PathBuf>,
    /// Settings the engine will be built with.
    pub settings: Settings,
    /// Handlers the engine will be built with.
    pub registry: HandlerRegistry,
}

impl IntegrationTestContext {
    /// Create an empty context with default settings and handlers.
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().expect("create temp dir"),
            sources: Vec::new(),
            settings: Settings::default().with_silent_warnings(true),
            registry: HandlerRegistry::builder().build(),
        }
    }

    /// Path to the context root.
    pub fn root_path(&self) -> &Path {
        self.root.path()
    }

    /// Build an engine over every source, merged in order.
    pub fn engine(&self) -> ParseEngine {
        ParseEngine::from_paths(self.sources.as_slice(), self.registry.clone(), self.settings)
            .expect("build engine")
    }
}

/// Fluent builder for [`IntegrationTestContext`].
pub struct TestContextBuilder {
    ctx: IntegrationTestContext,
}

impl TestContextBuilder {
    /// Begin building a new, empty context.
    pub fn new() -> Self {
        Self {
            ctx: IntegrationTestContext::new(),
        }
    }

    /// Write `content` to `<root>/<filename>` and append it to the sources.
    pub fn with_source(mut self, filename: &str, content: &str) -> Self {
        let path = self.ctx.root.path().join(filename);
        std::fs::write(&path, content).expect("write INI source");
        self.ctx.sources.push(path);
        self
    }

    /// Use the given exception control level.
    pub fn with_level(mut self, level: u8) -> Self {
        self.ctx.settings = self.ctx.settings.with_exception_control_level(level);
        self
    }

    /// Use the given handler registry.
    pub fn with_registry(mut self, registry: HandlerRegistry) -> Self {
        self.ctx.registry = registry;
        self
    }

    /// Finish building and return the configured context.
    pub fn build(self) -> IntegrationTestContext {
        self.ctx
    }
}
