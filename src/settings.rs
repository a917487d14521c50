//! Engine settings: verbosity and exception control knobs.
//!
//! Settings can be built in code or loaded from a TOML file:
//!
//! ```toml
//! debug_level = 1
//! exception_control_level = 5
//! exception_control_compact_warnings = false
//! exception_control_silent_warnings = false
//! ```
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::exception_control::{DEFAULT_EXCEPTION_CONTROL_LEVEL, ExceptionControl};

/// Configuration knobs of a [`ParseEngine`](crate::config::engine::ParseEngine).
///
/// The engine takes a copy at construction; changing settings goes through
/// [`ParseEngine::set_settings`](crate::config::engine::ParseEngine::set_settings),
/// never while a parse is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Verbosity of engine debug messages (0 = none).
    pub debug_level: u8,
    /// Strictness of the fault policy (0..=5).
    pub exception_control_level: u8,
    /// One-line warning messages instead of multi-line blocks.
    pub exception_control_compact_warnings: bool,
    /// Suppress warning console output (traces still record faults).
    pub exception_control_silent_warnings: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug_level: 0,
            exception_control_level: DEFAULT_EXCEPTION_CONTROL_LEVEL,
            exception_control_compact_warnings: true,
            exception_control_silent_warnings: false,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file; a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// exception control level is out of range.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Parse settings from TOML text.
    ///
    /// # Examples
    ///
    /// ```
    /// use configparser_enhanced::settings::Settings;
    ///
    /// let settings = Settings::from_toml_str("exception_control_level = 2", "inline").unwrap();
    /// assert_eq!(settings.exception_control_level, 2);
    /// assert_eq!(settings.debug_level, 0);
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for this structure or
    /// if the exception control level is out of range.
    pub fn from_toml_str(content: &str, origin: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(content).map_err(|source| ConfigError::Settings {
            path: origin.to_string(),
            source,
        })?;
        settings.exception_control()?;
        Ok(settings)
    }

    /// Set the debug level.
    #[must_use]
    pub const fn with_debug_level(mut self, level: u8) -> Self {
        self.debug_level = level;
        self
    }

    /// Set the exception control level (validated when the engine is built).
    #[must_use]
    pub const fn with_exception_control_level(mut self, level: u8) -> Self {
        self.exception_control_level = level;
        self
    }

    /// Set the compact-warnings flag.
    #[must_use]
    pub const fn with_compact_warnings(mut self, compact: bool) -> Self {
        self.exception_control_compact_warnings = compact;
        self
    }

    /// Set the silent-warnings flag.
    #[must_use]
    pub const fn with_silent_warnings(mut self, silent: bool) -> Self {
        self.exception_control_silent_warnings = silent;
        self
    }

    /// Build the fault policy described by these settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidExceptionControlLevel`] if the level is
    /// out of range.
    pub fn exception_control(&self) -> Result<ExceptionControl, ConfigError> {
        Ok(ExceptionControl::new(self.exception_control_level)?
            .with_compact_warnings(self.exception_control_compact_warnings)
            .with_silent_warnings(self.exception_control_silent_warnings))
    }
}
