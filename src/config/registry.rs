//! Operation handler registration and dispatch.
//!
//! Handlers are registered explicitly, once, through [`HandlerRegistryBuilder`]
//! before the engine is constructed. Names are normalized with
//! [`normalize_operation`], so `envvar-set`, `EnvVar_Set` and `envvar_set`
//! all denote the same operation; registering a name twice makes that
//! operation ambiguous.
use indexmap::IndexMap;
use std::sync::Arc;

use super::engine::HandlerContext;
use super::handlers::UseHandler;
use super::key::normalize_operation;

/// An operation handler.
///
/// A handler receives the context of one option and mutates the in-progress
/// [`ParseState`](super::state::ParseState). Faults a handler wants to report
/// without aborting go through [`HandlerContext::report`]; any other error it
/// returns is wrapped in
/// [`ConfigError::HandlerExecution`](crate::error::ConfigError::HandlerExecution)
/// by the engine. A [`ConfigError`](crate::error::ConfigError) returned as-is
/// (for example from a nested [`HandlerContext::parse_section`]) has already
/// been routed and is propagated unchanged.
pub trait Handler: Send + Sync {
    /// Process one option.
    ///
    /// # Errors
    ///
    /// Returns an error if the option cannot be applied.
    fn handle(&self, ctx: &mut HandlerContext<'_>) -> anyhow::Result<()>;
}

/// Adapter turning a closure into a [`Handler`].
struct FnHandler<F>(F);

impl<F> Handler for FnHandler<F>
where
    F: Fn(&mut HandlerContext<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&self, ctx: &mut HandlerContext<'_>) -> anyhow::Result<()> {
        (self.0)(ctx)
    }
}

/// Result of resolving an operation token.
#[derive(Clone)]
pub enum Resolution {
    /// No handler matches; the option is a generic key.
    Generic,
    /// Exactly one handler matches.
    Handler(Arc<dyn Handler>),
    /// More than one handler matches.
    Ambiguous(usize),
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generic => f.write_str("Generic"),
            Self::Handler(_) => f.write_str("Handler(..)"),
            Self::Ambiguous(count) => f.debug_tuple("Ambiguous").field(count).finish(),
        }
    }
}

/// Table of operation handlers keyed by normalized name.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: IndexMap<String, Vec<Arc<dyn Handler>>>,
    generic: Option<Arc<dyn Handler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: IndexMap<&str, usize> = self
            .handlers
            .iter()
            .map(|(name, list)| (name.as_str(), list.len()))
            .collect();
        f.debug_struct("HandlerRegistry")
            .field("handlers", &counts)
            .field("generic", &self.generic.is_some())
            .finish()
    }
}

impl HandlerRegistry {
    /// Start a registry that already contains the built-in `use` operation.
    #[must_use]
    pub fn builder() -> HandlerRegistryBuilder {
        Self::bare().register("use", UseHandler)
    }

    /// Start a registry without any built-in operation.
    #[must_use]
    pub fn bare() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder {
            registry: Self::default(),
        }
    }

    /// Resolve an operation token.
    ///
    /// # Examples
    ///
    /// ```
    /// use configparser_enhanced::config::registry::{HandlerRegistry, Resolution};
    ///
    /// let registry = HandlerRegistry::builder().build();
    /// assert!(matches!(registry.resolve("USE"), Resolution::Handler(_)));
    /// assert!(matches!(registry.resolve("key1"), Resolution::Generic));
    /// ```
    #[must_use]
    pub fn resolve(&self, token: &str) -> Resolution {
        match self.handlers.get(&normalize_operation(token)).map(Vec::as_slice) {
            None | Some([]) => Resolution::Generic,
            Some([handler]) => Resolution::Handler(Arc::clone(handler)),
            Some(list) => Resolution::Ambiguous(list.len()),
        }
    }

    /// Whether an operation name is registered (at least once).
    #[must_use]
    pub fn contains(&self, operation: &str) -> bool {
        self.handlers.contains_key(&normalize_operation(operation))
    }

    /// Registered operation names in registration order.
    pub fn operations(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Handler replacing the default generic key assignment, if any.
    #[must_use]
    pub fn generic(&self) -> Option<Arc<dyn Handler>> {
        self.generic.clone()
    }
}

/// Builder collecting handler registrations.
#[must_use]
pub struct HandlerRegistryBuilder {
    registry: HandlerRegistry,
}

impl std::fmt::Debug for HandlerRegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistryBuilder")
            .field("registry", &self.registry)
            .finish()
    }
}

impl HandlerRegistryBuilder {
    /// Register a handler under an operation name.
    pub fn register(mut self, operation: &str, handler: impl Handler + 'static) -> Self {
        self.registry
            .handlers
            .entry(normalize_operation(operation))
            .or_default()
            .push(Arc::new(handler));
        self
    }

    /// Register a closure under an operation name.
    pub fn register_fn<F>(self, operation: &str, handler: F) -> Self
    where
        F: Fn(&mut HandlerContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(operation, FnHandler(handler))
    }

    /// Replace the default generic key assignment with a custom handler.
    pub fn generic(mut self, handler: impl Handler + 'static) -> Self {
        self.registry.generic = Some(Arc::new(handler));
        self
    }

    /// Replace the default generic key assignment with a closure.
    pub fn generic_fn<F>(self, handler: F) -> Self
    where
        F: Fn(&mut HandlerContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.generic(FnHandler(handler))
    }

    /// Finish registration.
    #[must_use]
    pub fn build(self) -> HandlerRegistry {
        self.registry
    }
}
