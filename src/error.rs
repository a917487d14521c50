//! Fault taxonomy for the configuration engine.
//!
//! Every fault the engine can report is a [`ConfigError`] variant. Whether a
//! fault is raised, warned about, or silently skipped is not decided here but
//! by [`ExceptionControl`](crate::exception_control::ExceptionControl), based
//! on the severity each fault site declares.
//!
//! # Error hierarchy
//!
//! ```text
//! ConfigError
//! ├── CircularReference            `use` cycle (always fatal)
//! ├── SectionNotFound              requested section is absent
//! ├── OptionFormat                 malformed / unsplittable option key
//! ├── AmbiguousHandler             operation matches several handlers
//! ├── HandlerExecution             fault raised inside a handler body
//! ├── InvalidExceptionControlLevel severity policy misconfigured
//! ├── InvalidSyntax                INI text cannot be loaded
//! ├── Io / Settings / Write        file and stream failures
//! ```

use thiserror::Error;

/// Errors raised while loading, parsing, or serializing a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A section was requested while it is already being expanded.
    #[error("Circular reference detected while parsing [{section}]: {chain}")]
    CircularReference {
        /// Section that was requested a second time.
        section: String,
        /// Active sections, outermost first, ending with `section`.
        chain: String,
    },

    /// The requested section does not exist in the raw configuration.
    #[error("Section [{section}] not found")]
    SectionNotFound {
        /// Name of the missing section.
        section: String,
    },

    /// An option key could not be split into operation and parameter.
    #[error("Malformed option '{key}' in section [{section}]: {message}")]
    OptionFormat {
        /// Section containing the option.
        section: String,
        /// Raw option key as written in the file.
        key: String,
        /// Human-readable description of the problem.
        message: String,
    },

    /// The operation token resolves to more than one registered handler.
    #[error(
        "Operation '{operation}' of option '{key}' in section [{section}] matches {count} registered handlers"
    )]
    AmbiguousHandler {
        /// Section containing the option.
        section: String,
        /// Raw option key as written in the file.
        key: String,
        /// Normalized operation name.
        operation: String,
        /// Number of handlers registered under that name.
        count: usize,
    },

    /// A handler failed while processing an option.
    #[error("Handler for option '{key}' in section [{section}] failed (value: '{value}'): {source}")]
    HandlerExecution {
        /// Section containing the option.
        section: String,
        /// Raw option key as written in the file.
        key: String,
        /// Raw option value.
        value: String,
        /// Underlying handler error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The exception control level is outside the supported range.
    #[error("Invalid exception control level {level}: must be between 0 and {max}")]
    InvalidExceptionControlLevel {
        /// Level that was requested.
        level: u8,
        /// Highest supported level.
        max: u8,
    },

    /// The INI text contains a syntax error that prevents loading.
    #[error("Invalid INI syntax in {origin} at line {line}: {message}")]
    InvalidSyntax {
        /// File path or other label of the source text.
        origin: String,
        /// One-based line number.
        line: usize,
        /// Human-readable description of the problem.
        message: String,
    },

    /// An I/O error occurred while reading a source file.
    #[error("IO error reading {path}: {source}")]
    Io {
        /// Path to the file that could not be read.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The engine settings file could not be parsed.
    #[error("Invalid settings in {path}: {source}")]
    Settings {
        /// Path to the settings file.
        path: String,
        /// Underlying TOML error.
        source: toml::de::Error,
    },

    /// Writing the collapsed configuration to a stream failed.
    #[error("IO error writing configuration: {0}")]
    Write(#[source] std::io::Error),
}

impl ConfigError {
    /// Stable short tag identifying the fault class, used in parse traces.
    ///
    /// # Examples
    ///
    /// ```
    /// use configparser_enhanced::error::ConfigError;
    ///
    /// let e = ConfigError::SectionNotFound { section: "A".to_string() };
    /// assert_eq!(e.kind(), "section-not-found");
    /// ```
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::CircularReference { .. } => "circular-reference",
            Self::SectionNotFound { .. } => "section-not-found",
            Self::OptionFormat { .. } => "option-format",
            Self::AmbiguousHandler { .. } => "ambiguous-handler",
            Self::HandlerExecution { .. } => "handler-execution",
            Self::InvalidExceptionControlLevel { .. } => "invalid-exception-control-level",
            Self::InvalidSyntax { .. } => "invalid-syntax",
            Self::Io { .. } => "io",
            Self::Settings { .. } => "settings",
            Self::Write(_) => "write",
        }
    }
}
