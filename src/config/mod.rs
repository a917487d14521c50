//! INI loading, key splitting, handler dispatch and section composition.
//!
//! The pipeline is layered the same way it runs:
//!
//! - **[`ini`]**: raw sections and options, duplicates kept with suffixes
//! - **[`key`]**: split option keys into operation and parameter
//! - **[`registry`]**: map operation names to [`Handler`]s
//! - **[`engine`]**: evaluate options in order, dispatch, compose via `use`
//! - **[`view`]**: dict-like access and collapsed output

pub mod engine;
pub mod guard;
pub mod handlers;
pub mod ini;
pub mod key;
pub mod registry;
pub mod state;
pub mod view;

pub use engine::{HandlerContext, ParseEngine};
pub use ini::RawConfig;
pub use registry::{Handler, HandlerRegistry, HandlerRegistryBuilder};
pub use state::{Action, ParseState};
pub use view::ConfigurationView;
