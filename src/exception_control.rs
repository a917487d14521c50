//! Severity policy deciding whether a fault raises, warns, or is skipped.
//!
//! Each fault site declares a [`Severity`]; the configured level turns that
//! into a [`Decision`]. Raising the level only ever makes the policy stricter:
//!
//! ```text
//! level | Warning  Minor   Serious  Critical
//! ------+-------------------------------------
//!   0   | silent   silent  silent   raise
//!   1   | silent   silent  warn     raise
//!   2   | warn     warn    warn     raise
//!   3   | warn     warn    raise    raise
//!   4   | warn     raise   raise    raise    (default)
//!   5   | raise    raise   raise    raise
//! ```
use serde::Serialize;

use crate::error::ConfigError;
use crate::logging::{ParseTrace, TraceKind};

/// Highest supported exception control level.
pub const MAX_EXCEPTION_CONTROL_LEVEL: u8 = 5;

/// Level used when none is configured.
pub const DEFAULT_EXCEPTION_CONTROL_LEVEL: u8 = 4;

/// Severity class declared by a fault site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    /// Informational anomaly; raises only at the strictest level.
    Warning,
    /// Recoverable, low impact (e.g. a malformed option that can be skipped).
    Minor,
    /// Recoverable, high impact (e.g. a missing section).
    Serious,
    /// Fatal; always raises regardless of level.
    Critical,
}

impl Severity {
    /// Lowercase label used in messages and traces.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Minor => "minor",
            Self::Serious => "serious",
            Self::Critical => "critical",
        }
    }

    /// Severity the engine assigns to a fault kind at its own fault sites.
    ///
    /// Used for faults a handler builds and returns itself.
    #[must_use]
    pub const fn of_fault(fault: &ConfigError) -> Self {
        match fault {
            ConfigError::CircularReference { .. } | ConfigError::AmbiguousHandler { .. } => {
                Self::Critical
            }
            ConfigError::OptionFormat { .. } => Self::Minor,
            _ => Self::Serious,
        }
    }
}

/// Outcome of consulting the policy for one fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Propagate the fault to the caller.
    Raise,
    /// Log a warning and continue with the site's fallback.
    Warn,
    /// Continue with the site's fallback without console output.
    Silent,
}

impl Decision {
    /// Lowercase label used in traces.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Raise => "raise",
            Self::Warn => "warn",
            Self::Silent => "silent",
        }
    }
}

/// Immutable severity policy held by the engine for the duration of a parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionControl {
    level: u8,
    compact_warnings: bool,
    silent_warnings: bool,
}

impl Default for ExceptionControl {
    fn default() -> Self {
        Self {
            level: DEFAULT_EXCEPTION_CONTROL_LEVEL,
            compact_warnings: true,
            silent_warnings: false,
        }
    }
}

impl ExceptionControl {
    /// Create a policy with the given level and default warning flags.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidExceptionControlLevel`] if `level` is
    /// above [`MAX_EXCEPTION_CONTROL_LEVEL`].
    pub fn new(level: u8) -> Result<Self, ConfigError> {
        if level > MAX_EXCEPTION_CONTROL_LEVEL {
            return Err(ConfigError::InvalidExceptionControlLevel {
                level,
                max: MAX_EXCEPTION_CONTROL_LEVEL,
            });
        }
        Ok(Self {
            level,
            compact_warnings: true,
            silent_warnings: false,
        })
    }

    /// Use one-line (`true`) or multi-line (`false`) warning messages.
    #[must_use]
    pub const fn with_compact_warnings(mut self, compact: bool) -> Self {
        self.compact_warnings = compact;
        self
    }

    /// Suppress console output of warnings; traces still record them.
    #[must_use]
    pub const fn with_silent_warnings(mut self, silent: bool) -> Self {
        self.silent_warnings = silent;
        self
    }

    /// Configured level.
    #[must_use]
    pub const fn level(&self) -> u8 {
        self.level
    }

    /// Whether warning messages are compact.
    #[must_use]
    pub const fn compact_warnings(&self) -> bool {
        self.compact_warnings
    }

    /// Whether warning console output is suppressed.
    #[must_use]
    pub const fn silent_warnings(&self) -> bool {
        self.silent_warnings
    }

    /// Decide how a fault of the given severity is handled.
    ///
    /// # Examples
    ///
    /// ```
    /// use configparser_enhanced::exception_control::{Decision, ExceptionControl, Severity};
    ///
    /// let strict = ExceptionControl::new(5).unwrap();
    /// let lax = ExceptionControl::new(0).unwrap();
    /// assert_eq!(strict.decide(Severity::Minor), Decision::Raise);
    /// assert_eq!(lax.decide(Severity::Minor), Decision::Silent);
    /// assert_eq!(lax.decide(Severity::Critical), Decision::Raise);
    /// ```
    #[must_use]
    pub const fn decide(&self, severity: Severity) -> Decision {
        match severity {
            Severity::Critical => Decision::Raise,
            Severity::Serious => match self.level {
                0 => Decision::Silent,
                1 | 2 => Decision::Warn,
                _ => Decision::Raise,
            },
            Severity::Minor => match self.level {
                0 | 1 => Decision::Silent,
                2 | 3 => Decision::Warn,
                _ => Decision::Raise,
            },
            Severity::Warning => match self.level {
                0 | 1 => Decision::Silent,
                2..=4 => Decision::Warn,
                _ => Decision::Raise,
            },
        }
    }

    /// Route a fault through the policy.
    ///
    /// The fault is always recorded in `trace`. Returns `Err(fault)` when the
    /// policy raises, `Ok(())` when the caller should continue with its
    /// fallback.
    ///
    /// # Errors
    ///
    /// Returns the fault itself when the decision is [`Decision::Raise`].
    pub fn handle(
        &self,
        severity: Severity,
        fault: ConfigError,
        trace: &mut ParseTrace,
        depth: usize,
    ) -> Result<(), ConfigError> {
        match self.decide(severity) {
            Decision::Raise => Err(self.raise(severity, fault, trace, depth)),
            decision => {
                record_fault(trace, &fault, severity, decision, depth);
                if decision == Decision::Warn && !self.silent_warnings {
                    tracing::warn!("{}", self.format_warning(severity, &fault));
                }
                Ok(())
            }
        }
    }

    /// Record a fault that is raised unconditionally and hand it back.
    pub fn raise(
        &self,
        severity: Severity,
        fault: ConfigError,
        trace: &mut ParseTrace,
        depth: usize,
    ) -> ConfigError {
        record_fault(trace, &fault, severity, Decision::Raise, depth);
        tracing::debug!(
            "raising {} fault ({}): {fault}",
            fault.kind(),
            severity.label()
        );
        fault
    }

    /// Format the console message for a warned fault.
    #[must_use]
    pub fn format_warning(&self, severity: Severity, fault: &ConfigError) -> String {
        if self.compact_warnings {
            return format!("EXCEPTION SKIPPED: [{}] {fault}", severity.label());
        }
        format!(
            "EXCEPTION SKIPPED\n\
             \x20 severity : {}\n\
             \x20 fault    : {}\n\
             \x20 message  : {fault}\n\
             \x20 level    : {} (raise this level to turn the fault into an error)",
            severity.label(),
            fault.kind(),
            self.level,
        )
    }
}

fn record_fault(
    trace: &mut ParseTrace,
    fault: &ConfigError,
    severity: Severity,
    decision: Decision,
    depth: usize,
) {
    trace.record(
        TraceKind::Warning,
        fault.kind(),
        depth,
        [
            ("severity", severity.label().to_string()),
            ("decision", decision.label().to_string()),
            ("message", fault.to_string()),
        ],
    );
}
