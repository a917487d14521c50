//! Loading INI text into ordered sections of raw options.
use indexmap::IndexMap;
use std::path::Path;

use crate::error::ConfigError;

/// Separator between an option key and the occurrence number appended to
/// repeated keys. Option keys are split at the first `:` or `=`, so a parsed
/// key can never contain it.
pub const DUPLICATE_SUFFIX_SEPARATOR: char = ':';

/// Ordered options of a single section: stored key → raw value.
pub type RawSection = IndexMap<String, String>;

/// INI text loaded into ordered sections, before any operation is applied.
///
/// # Examples
///
/// ```
/// use configparser_enhanced::config::ini::RawConfig;
///
/// let raw = RawConfig::parse_str("[A]\nkey1: a\nkey1: b\n", "inline").unwrap();
/// let keys: Vec<&String> = raw.section("A").unwrap().keys().collect();
/// assert_eq!(keys, ["key1", "key1:2"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawConfig {
    sections: IndexMap<String, RawSection>,
}

impl RawConfig {
    /// Create an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse INI content from a string.
    ///
    /// Format:
    /// ```ini
    /// [section]
    /// # comment
    /// key: value
    /// other = value
    /// list:
    ///     first
    ///     second
    /// use base
    /// ```
    ///
    /// `origin` labels the text in error messages (usually the file path).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSyntax`] if an option appears outside a
    /// section or a section header is empty.
    pub fn parse_str(content: &str, origin: &str) -> Result<Self, ConfigError> {
        let mut config = Self::new();
        let mut current: Option<String> = None;
        let mut last_key: Option<String> = None;
        // Blank lines seen since the last value line; kept only if the value
        // continues after them.
        let mut pending_blanks = 0usize;

        for (line_num, line) in content.lines().enumerate() {
            let trimmed = line.trim();

            if trimmed.is_empty() {
                pending_blanks += 1;
                continue;
            }
            if trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            // Indented lines continue the previous value
            if line.starts_with(char::is_whitespace)
                && let (Some(section), Some(key)) = (&current, &last_key)
                && let Some(value) = config
                    .sections
                    .get_mut(section)
                    .and_then(|options| options.get_mut(key))
            {
                if !value.is_empty() {
                    value.push('\n');
                    value.extend(std::iter::repeat_n('\n', pending_blanks));
                }
                value.push_str(trimmed);
                pending_blanks = 0;
                continue;
            }
            pending_blanks = 0;

            if let Some(header) = parse_section_header(trimmed) {
                if header.is_empty() {
                    return Err(syntax_error(origin, line_num, "empty section header"));
                }
                config.sections.entry(header.to_string()).or_default();
                current = Some(header.to_string());
                last_key = None;
            } else if let Some(section) = &current {
                let (key, value) = parse_option_line(trimmed);
                last_key = Some(config.insert_option(section, key, value));
            } else {
                return Err(syntax_error(
                    origin,
                    line_num,
                    &format!("option outside of section: {trimmed}"),
                ));
            }
        }

        Ok(config)
    }

    /// Parse an INI file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse_str(&content, &path.display().to_string())
    }

    /// Parse several INI files in order and merge them.
    ///
    /// Later files append to sections of earlier ones, so their options win
    /// under last-write-wins evaluation.
    ///
    /// # Errors
    ///
    /// Returns an error if any file cannot be read or parsed.
    pub fn from_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Self, ConfigError> {
        let mut config = Self::new();
        for path in paths {
            config.merge(Self::from_path(path.as_ref())?);
            tracing::debug!("loaded {}", path.as_ref().display());
        }
        Ok(config)
    }

    /// Append every section and option of `other` after the existing ones.
    pub fn merge(&mut self, other: Self) {
        for (section, options) in other.sections {
            self.sections.entry(section.clone()).or_default();
            for (stored_key, value) in options {
                let (key, _) = split_suffix(&stored_key);
                self.insert_option(&section, key, value);
            }
        }
    }

    /// Insert an option, appending an occurrence suffix if `key` is already
    /// present in the section. Returns the key under which it was stored.
    pub fn insert_option(&mut self, section: &str, key: &str, value: String) -> String {
        let options = self.sections.entry(section.to_string()).or_default();
        let mut stored = key.to_string();
        let mut occurrence = 1usize;
        while options.contains_key(&stored) {
            occurrence += 1;
            stored = format!("{key}{DUPLICATE_SUFFIX_SEPARATOR}{occurrence}");
        }
        options.insert(stored.clone(), value);
        stored
    }

    /// Options of a section, in file order.
    #[must_use]
    pub fn section(&self, name: &str) -> Option<&RawSection> {
        self.sections.get(name)
    }

    /// Whether the section exists.
    #[must_use]
    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    /// Section names in file order.
    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// Number of sections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// Whether no section was loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// Split a stored key into the key as written and its occurrence suffix.
///
/// # Examples
///
/// ```
/// use configparser_enhanced::config::ini::split_suffix;
///
/// assert_eq!(split_suffix("key1:2"), ("key1", Some("2")));
/// assert_eq!(split_suffix("key1"), ("key1", None));
/// ```
#[must_use]
pub fn split_suffix(stored_key: &str) -> (&str, Option<&str>) {
    match stored_key.rsplit_once(DUPLICATE_SUFFIX_SEPARATOR) {
        Some((key, suffix)) => (key, Some(suffix)),
        None => (stored_key, None),
    }
}

/// Split a list-shaped value into entries.
///
/// Each line is one entry; text after `#` is a comment and blank entries are
/// dropped. The engine itself treats values as opaque; this is the helper
/// handlers use when they need list semantics.
///
/// # Examples
///
/// ```
/// use configparser_enhanced::config::ini::list_values;
///
/// let value = "gcc/10.1.0   # compiler\n\n# disabled\nopenmpi/4.0";
/// assert_eq!(list_values(value), ["gcc/10.1.0", "openmpi/4.0"]);
/// ```
#[must_use]
pub fn list_values(value: &str) -> Vec<&str> {
    value
        .lines()
        .map(|line| strip_comment(line).trim())
        .filter(|entry| !entry.is_empty())
        .collect()
}

/// Drop everything from the first `#` on.
fn strip_comment(line: &str) -> &str {
    line.find('#').map_or(line, |idx| &line[..idx])
}

/// Parse a `[name]` line into the trimmed section name.
fn parse_section_header(line: &str) -> Option<&str> {
    Some(line.strip_prefix('[')?.strip_suffix(']')?.trim())
}

/// Split an option line at the first `:` or `=`; a line without delimiter is
/// a key with an empty value.
fn parse_option_line(line: &str) -> (&str, String) {
    line.find([':', '=']).map_or((line, String::new()), |idx| {
        (line[..idx].trim(), line[idx + 1..].trim().to_string())
    })
}

fn syntax_error(origin: &str, line_num: usize, message: &str) -> ConfigError {
    ConfigError::InvalidSyntax {
        origin: origin.to_string(),
        line: line_num + 1,
        message: message.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn parse(content: &str) -> RawConfig {
        RawConfig::parse_str(content, "test").expect("test data should parse")
    }

    fn entries(raw: &RawConfig, section: &str) -> Vec<(String, String)> {
        raw.section(section)
            .expect("section should exist")
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    #[test]
    fn parse_simple_section() {
        let raw = parse("[A]\nkey1: value1\nkey2 = value2\n");
        assert_eq!(
            entries(&raw, "A"),
            vec![
                ("key1".to_string(), "value1".to_string()),
                ("key2".to_string(), "value2".to_string()),
            ]
        );
    }

    #[test]
    fn sections_keep_file_order() {
        let raw = parse("[zeta]\na: 1\n[alpha]\nb: 2\n[mid]\n");
        let names: Vec<&str> = raw.section_names().collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
        assert_eq!(raw.len(), 3);
    }

    #[test]
    fn key_without_delimiter_has_empty_value() {
        let raw = parse("[A]\nuse B\n");
        assert_eq!(entries(&raw, "A"), vec![("use B".to_string(), String::new())]);
    }

    #[test]
    fn trailing_colon_key_has_empty_value() {
        let raw = parse("[A]\nuse B:\n");
        assert_eq!(entries(&raw, "A"), vec![("use B".to_string(), String::new())]);
    }

    #[test]
    fn splits_at_first_delimiter() {
        let raw = parse("[A]\nurl = http://example.com:8080\n");
        assert_eq!(
            raw.section("A").unwrap()["url"],
            "http://example.com:8080"
        );
    }

    #[test]
    fn duplicate_keys_get_suffix() {
        let raw = parse("[A]\nkey1: a\nkey1: b\nkey1: c\n");
        let keys: Vec<&String> = raw.section("A").unwrap().keys().collect();
        assert_eq!(keys, ["key1", "key1:2", "key1:3"]);
    }

    #[test]
    fn continuation_lines_join_with_newline() {
        let raw = parse("[A]\nmodules:\n    gcc\n    openmpi\nnext: x\n");
        assert_eq!(raw.section("A").unwrap()["modules"], "gcc\nopenmpi");
        assert_eq!(raw.section("A").unwrap()["next"], "x");
    }

    #[test]
    fn continuation_after_inline_value() {
        let raw = parse("[A]\nmodules: gcc\n  openmpi\n");
        assert_eq!(raw.section("A").unwrap()["modules"], "gcc\nopenmpi");
    }

    #[test]
    fn blank_lines_inside_continuation_are_kept() {
        let raw = parse("[A]\nmodules:\n    gcc\n\n    openmpi\n\n\nnext: x\n");
        assert_eq!(
            entries(&raw, "A"),
            vec![
                ("modules".to_string(), "gcc\n\nopenmpi".to_string()),
                ("next".to_string(), "x".to_string()),
            ]
        );
        assert_eq!(
            list_values(&raw.section("A").unwrap()["modules"]),
            ["gcc", "openmpi"]
        );
    }

    #[test]
    fn trailing_blank_lines_end_the_value() {
        let raw = parse("[A]\nmodules: gcc\n\n\n[B]\n");
        assert_eq!(raw.section("A").unwrap()["modules"], "gcc");
    }

    #[test]
    fn comments_and_blank_lines_ignored() {
        let raw = parse("# top\n[A]\n; note\n\nkey: v\n");
        assert_eq!(entries(&raw, "A"), vec![("key".to_string(), "v".to_string())]);
    }

    #[test]
    fn empty_key_is_kept_for_the_splitter() {
        let raw = parse("[A]\n: orphan\n");
        assert_eq!(
            entries(&raw, "A"),
            vec![(String::new(), "orphan".to_string())]
        );
    }

    #[test]
    fn repeated_section_header_appends() {
        let raw = parse("[A]\nkey: 1\n[B]\n[A]\nkey: 2\n");
        let keys: Vec<&String> = raw.section("A").unwrap().keys().collect();
        assert_eq!(keys, ["key", "key:2"]);
    }

    #[test]
    fn option_outside_section_fails() {
        let err = RawConfig::parse_str("orphan: 1\n", "site.ini").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidSyntax { line: 1, .. }
        ));
        assert!(err.to_string().contains("site.ini"));
    }

    #[test]
    fn empty_header_fails() {
        assert!(RawConfig::parse_str("[ ]\n", "test").is_err());
    }

    #[test]
    fn merge_appends_later_options() {
        let mut first = parse("[A]\nkey: 1\n");
        first.merge(parse("[A]\nkey: 2\n[B]\nx: y\n"));
        assert_eq!(
            entries(&first, "A"),
            vec![
                ("key".to_string(), "1".to_string()),
                ("key:2".to_string(), "2".to_string()),
            ]
        );
        assert!(first.has_section("B"));
    }

    #[test]
    fn from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.ini");
        std::fs::write(&path, "[A]\nkey: v\n").unwrap();
        let raw = RawConfig::from_path(&path).unwrap();
        assert!(raw.has_section("A"));
    }

    #[test]
    fn from_path_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = RawConfig::from_path(&dir.path().join("nope.ini")).unwrap_err();
        assert_eq!(err.kind(), "io");
    }

    #[test]
    fn split_suffix_without_suffix() {
        assert_eq!(split_suffix("use B"), ("use B", None));
    }

    #[test]
    fn list_values_strips_comments() {
        assert_eq!(list_values("a # one\n  b\n#c\n\n"), ["a", "b"]);
        assert!(list_values("").is_empty());
    }
}
