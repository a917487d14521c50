//! Active-section tracking for cycle detection during `use` composition.

use crate::error::ConfigError;

/// Ordered set of sections currently being expanded by one top-level parse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveSectionStack {
    stack: Vec<String>,
}

impl ActiveSectionStack {
    /// Create an empty stack.
    #[must_use]
    pub const fn new() -> Self {
        Self { stack: Vec::new() }
    }

    /// Whether `name` is currently being expanded.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.stack.iter().any(|s| s == name)
    }

    /// Mark `name` as active.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::CircularReference`] if `name` is already
    /// active; the stack is left unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// use configparser_enhanced::config::guard::ActiveSectionStack;
    ///
    /// let mut active = ActiveSectionStack::new();
    /// active.push("A").unwrap();
    /// active.push("B").unwrap();
    /// let err = active.push("A").unwrap_err();
    /// assert!(err.to_string().contains("A -> B -> A"));
    /// ```
    pub fn push(&mut self, name: &str) -> Result<(), ConfigError> {
        if self.contains(name) {
            return Err(ConfigError::CircularReference {
                section: name.to_string(),
                chain: self.chain_to(name),
            });
        }
        self.stack.push(name.to_string());
        Ok(())
    }

    /// Remove `name` from the top of the stack.
    ///
    /// Returns `false` (and leaves the stack untouched) if `name` is not the
    /// innermost active section.
    pub fn pop(&mut self, name: &str) -> bool {
        if self.stack.last().is_some_and(|top| top == name) {
            self.stack.pop();
            true
        } else {
            false
        }
    }

    /// Number of active sections.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Whether no section is active.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Active sections, outermost first.
    #[must_use]
    pub fn sections(&self) -> &[String] {
        &self.stack
    }

    fn chain_to(&self, name: &str) -> String {
        let mut chain: Vec<&str> = self.stack.iter().map(String::as_str).collect();
        chain.push(name);
        chain.join(" -> ")
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn push_and_pop() {
        let mut active = ActiveSectionStack::new();
        active.push("A").unwrap();
        active.push("B").unwrap();
        assert_eq!(active.depth(), 2);
        assert!(active.contains("A"));
        assert!(active.pop("B"));
        assert!(active.pop("A"));
        assert!(active.is_empty());
    }

    #[test]
    fn self_reference_is_circular() {
        let mut active = ActiveSectionStack::new();
        active.push("A").unwrap();
        let err = active.push("A").unwrap_err();
        assert!(matches!(err, ConfigError::CircularReference { .. }));
        assert_eq!(active.depth(), 1, "failed push must not modify the stack");
    }

    #[test]
    fn chain_lists_path() {
        let mut active = ActiveSectionStack::new();
        active.push("A").unwrap();
        active.push("B").unwrap();
        active.push("C").unwrap();
        let err = active.push("B").unwrap_err();
        match err {
            ConfigError::CircularReference { section, chain } => {
                assert_eq!(section, "B");
                assert_eq!(chain, "A -> B -> C -> B");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn pop_of_non_top_is_rejected() {
        let mut active = ActiveSectionStack::new();
        active.push("A").unwrap();
        active.push("B").unwrap();
        assert!(!active.pop("A"));
        assert_eq!(active.sections(), ["A", "B"]);
    }

    #[test]
    fn section_can_be_reentered_after_pop() {
        let mut active = ActiveSectionStack::new();
        active.push("A").unwrap();
        active.pop("A");
        assert!(active.push("A").is_ok());
    }
}
