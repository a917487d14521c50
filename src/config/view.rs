//! Dict-like read access over parsed sections, and collapsed INI output.
use std::io::Write;

use super::engine::ParseEngine;
use super::state::ParseState;
use crate::error::ConfigError;

/// Indentation of continuation lines in written values.
const CONTINUATION_INDENT: &str = "    ";

/// Read view over a [`ParseEngine`].
///
/// Lookups parse sections on demand (through the engine cache) and return
/// fully resolved values, so `use` imports and overrides are already applied.
#[derive(Debug)]
pub struct ConfigurationView<'a> {
    engine: &'a mut ParseEngine,
}

impl<'a> ConfigurationView<'a> {
    pub(crate) const fn new(engine: &'a mut ParseEngine) -> Self {
        Self { engine }
    }

    /// Section names in file order.
    #[must_use]
    pub fn sections(&self) -> Vec<String> {
        self.engine
            .raw()
            .section_names()
            .map(str::to_string)
            .collect()
    }

    /// Whether a section exists in the loaded configuration.
    #[must_use]
    pub fn has_section(&self, name: &str) -> bool {
        self.engine.raw().has_section(name)
    }

    /// Number of sections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.engine.raw().len()
    }

    /// Whether no section is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.engine.raw().is_empty()
    }

    /// Fully resolved state of a section.
    ///
    /// # Errors
    ///
    /// Returns any fault raised while parsing the section.
    pub fn section(&mut self, name: &str) -> Result<ParseState, ConfigError> {
        self.engine.parse_section(name)
    }

    /// Whether a resolved section has `key`. A missing section has no keys.
    ///
    /// # Errors
    ///
    /// Returns any fault raised while parsing the section.
    pub fn has_option(&mut self, section: &str, key: &str) -> Result<bool, ConfigError> {
        if !self.has_section(section) {
            return Ok(false);
        }
        Ok(self.section(section)?.contains(key))
    }

    /// Resolved value of `key` in `section`.
    ///
    /// # Errors
    ///
    /// Returns any fault raised while parsing the section.
    pub fn get(&mut self, section: &str, key: &str) -> Result<Option<String>, ConfigError> {
        Ok(self.section(section)?.get(key).map(str::to_string))
    }

    /// Resolved value of `key` in `section`, or `default` when unset.
    ///
    /// # Errors
    ///
    /// Returns any fault raised while parsing the section.
    pub fn get_or(
        &mut self,
        section: &str,
        key: &str,
        default: &str,
    ) -> Result<String, ConfigError> {
        Ok(self
            .get(section, key)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// Resolved keys of a section in order.
    ///
    /// # Errors
    ///
    /// Returns any fault raised while parsing the section.
    pub fn options(&mut self, section: &str) -> Result<Vec<String>, ConfigError> {
        Ok(self.section(section)?.options().keys().cloned().collect())
    }

    /// Resolved key/value pairs of a section in order.
    ///
    /// # Errors
    ///
    /// Returns any fault raised while parsing the section.
    pub fn items(&mut self, section: &str) -> Result<Vec<(String, String)>, ConfigError> {
        Ok(self
            .section(section)?
            .options()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    /// Write every section, fully resolved, as INI text.
    ///
    /// Operations are gone from the output: it contains only the keys and
    /// values they produced, so re-reading it needs no handlers.
    ///
    /// # Errors
    ///
    /// Returns the first fault raised while parsing a section, or
    /// [`ConfigError::Write`] if the stream fails.
    pub fn write<W: Write>(&mut self, out: &mut W) -> Result<(), ConfigError> {
        for (index, name) in self.sections().iter().enumerate() {
            let state = self.section(name)?;
            if index > 0 {
                writeln!(out).map_err(ConfigError::Write)?;
            }
            write_section(out, name, &state).map_err(ConfigError::Write)?;
        }
        out.flush().map_err(ConfigError::Write)
    }

    /// Collapsed configuration as a string.
    ///
    /// # Errors
    ///
    /// Returns the first fault raised while parsing a section.
    pub fn to_ini_string(&mut self) -> Result<String, ConfigError> {
        let mut buf = Vec::new();
        self.write(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

fn write_section<W: Write>(out: &mut W, name: &str, state: &ParseState) -> std::io::Result<()> {
    writeln!(out, "[{name}]")?;
    for (key, value) in state.iter() {
        let mut lines = value.split('\n');
        match lines.next() {
            Some(first) if !first.is_empty() => writeln!(out, "{key}: {first}")?,
            _ => writeln!(out, "{key}:")?,
        }
        for line in lines {
            if line.is_empty() {
                writeln!(out)?;
            } else {
                writeln!(out, "{CONTINUATION_INDENT}{line}")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::config::registry::HandlerRegistry;
    use crate::settings::Settings;

    fn engine(ini: &str) -> ParseEngine {
        ParseEngine::from_ini_str(ini, HandlerRegistry::builder().build(), Settings::default())
            .unwrap()
    }

    #[test]
    fn has_option_on_missing_section_is_false() {
        let mut engine = engine("[A]\nk: v\n");
        let mut view = engine.data();
        assert!(!view.has_option("Z", "k").unwrap());
        assert!(view.has_option("A", "k").unwrap());
    }

    #[test]
    fn get_or_falls_back() {
        let mut engine = engine("[A]\nk: v\n");
        let mut view = engine.data();
        assert_eq!(view.get_or("A", "k", "d").unwrap(), "v");
        assert_eq!(view.get_or("A", "x", "d").unwrap(), "d");
    }

    #[test]
    fn multi_line_values_are_indented() {
        let mut state = ParseState::new();
        state.set("list", "a\n\nb");
        state.set("empty", "");
        state.set("one", "x");
        let mut buf = Vec::new();
        write_section(&mut buf, "S", &state).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "[S]\nlist: a\n\n    b\nempty:\none: x\n"
        );
    }
}
