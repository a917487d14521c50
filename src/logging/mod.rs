//! Console logging and the per-parse diagnostic trace.

mod subscriber;
pub mod trace;

pub(crate) use subscriber::event_level;
pub use subscriber::init_subscriber;
pub use trace::{ParseTrace, TraceEntry, TraceKind};
