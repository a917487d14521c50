//! Hierarchical INI configuration engine.
//!
//! Option keys may begin with an operation name (`use B`, `envvar-set PATH`)
//! that is dispatched to a registered handler; everything else is a plain
//! key. The built-in `use` operation imports the resolved contents of another
//! section at that point of the file, so sections compose with ordinary
//! last-write-wins semantics. Faults are routed through a graded exception
//! control policy that decides, per severity, whether to raise, warn, or stay
//! silent.
//!
//! The public API is organised into a few layers:
//!
//! - **[`config`]**: load INI text, split keys, dispatch handlers, compose sections
//! - **[`exception_control`]**: severity classes and the fault policy
//! - **[`logging`]**: console subscriber and the per-parse trace
//! - **[`settings`]**: engine knobs, optionally loaded from TOML
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod config;
pub mod error;
pub mod exception_control;
pub mod logging;
pub mod settings;

pub use config::{HandlerContext, HandlerRegistry, ParseEngine, ParseState};
pub use error::ConfigError;
pub use settings::Settings;
