//! Accumulated per-section parse results.
use indexmap::IndexMap;
use serde::Serialize;

/// An ordered action appended by a handler, for collaborators that replay
/// operations (environment changes, module loads, ...) in file order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    /// Normalized operation name.
    pub operation: String,
    /// Operation parameter.
    pub parameter: String,
    /// Raw option value.
    pub value: String,
    /// Section the option was written in.
    pub section: String,
}

/// Accumulated result of parsing one section.
///
/// Keys are assigned in file order with last-write-wins semantics; a key that
/// is overwritten keeps its original position.
///
/// # Examples
///
/// ```
/// use configparser_enhanced::config::state::ParseState;
///
/// let mut state = ParseState::new();
/// state.set("key1", "a");
/// state.set("key1", "b");
/// assert_eq!(state.get("key1"), Some("b"));
/// assert_eq!(state.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseState {
    options: IndexMap<String, String>,
    actions: Vec<Action>,
}

impl ParseState {
    /// Create an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a key, overwriting any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.options.insert(key.into(), value.into());
    }

    /// Value of a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Whether a key is set.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.options.contains_key(key)
    }

    /// Remove a key, preserving the order of the remaining ones.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.options.shift_remove(key)
    }

    /// Key/value pairs in order.
    #[must_use]
    pub const fn options(&self) -> &IndexMap<String, String> {
        &self.options
    }

    /// Iterate over key/value pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.options.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.options.len()
    }

    /// Whether no key and no action is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.options.is_empty() && self.actions.is_empty()
    }

    /// Ordered actions appended by handlers.
    #[must_use]
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Append an action.
    pub fn push_action(&mut self, action: Action) {
        self.actions.push(action);
    }

    /// Apply another state on top of this one: every key is assigned in the
    /// other state's order (last write wins) and its actions are appended.
    pub fn merge(&mut self, other: &Self) {
        for (key, value) in &other.options {
            self.options.insert(key.clone(), value.clone());
        }
        self.actions.extend(other.actions.iter().cloned());
    }
}
