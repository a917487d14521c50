//! Splitting option keys into operation, parameter and suffix.
use std::sync::Arc;

use super::ini::split_suffix;
use super::registry::{Handler, HandlerRegistry, Resolution};
use crate::error::ConfigError;

/// An option key after splitting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedKey {
    /// Normalized operation name; set only when exactly one handler matched.
    pub operation: Option<String>,
    /// The rest of the key (the whole key for generic options).
    pub parameter: String,
    /// Occurrence suffix of a repeated key, if any.
    pub suffix: Option<String>,
}

/// A split key together with the handler it dispatches to.
#[derive(Clone)]
pub struct SplitKey {
    /// The split key.
    pub parsed: ParsedKey,
    /// Handler to invoke; `None` for generic keys.
    pub handler: Option<Arc<dyn Handler>>,
}

impl std::fmt::Debug for SplitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SplitKey")
            .field("parsed", &self.parsed)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

/// Normalize an operation token: lower-case ASCII, with every character that
/// is not alphanumeric or `_` folded to `_`.
///
/// # Examples
///
/// ```
/// use configparser_enhanced::config::key::normalize_operation;
///
/// assert_eq!(normalize_operation("EnvVar-Set"), "envvar_set");
/// assert_eq!(normalize_operation("use"), "use");
/// ```
#[must_use]
pub fn normalize_operation(token: &str) -> String {
    token
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Split a stored option key of `section` and resolve its operation.
///
/// The first whitespace-delimited token is the candidate operation. When it
/// resolves to exactly one handler the remainder (with one level of matching
/// quotes removed) is the parameter; otherwise the whole key is a generic
/// parameter.
///
/// # Errors
///
/// Returns [`ConfigError::OptionFormat`] for an empty key or an operation
/// parameter with an unbalanced quote, and [`ConfigError::AmbiguousHandler`]
/// when the token matches several handlers.
pub fn split_key(
    section: &str,
    stored_key: &str,
    registry: &HandlerRegistry,
) -> Result<SplitKey, ConfigError> {
    let (key, suffix) = split_suffix(stored_key);
    let key = key.trim();
    let suffix = suffix.map(str::to_string);

    let format_error = |message: &str| ConfigError::OptionFormat {
        section: section.to_string(),
        key: key.to_string(),
        message: message.to_string(),
    };

    let Some(token) = key.split_whitespace().next() else {
        return Err(format_error("option key is empty"));
    };

    match registry.resolve(token) {
        Resolution::Generic => Ok(SplitKey {
            parsed: ParsedKey {
                operation: None,
                parameter: key.to_string(),
                suffix,
            },
            handler: None,
        }),
        Resolution::Ambiguous(count) => Err(ConfigError::AmbiguousHandler {
            section: section.to_string(),
            key: key.to_string(),
            operation: normalize_operation(token),
            count,
        }),
        Resolution::Handler(handler) => {
            let rest = key[token.len()..].trim();
            let parameter = unquote(rest).ok_or_else(|| format_error("unbalanced quote"))?;
            Ok(SplitKey {
                parsed: ParsedKey {
                    operation: Some(normalize_operation(token)),
                    parameter: parameter.to_string(),
                    suffix,
                },
                handler: Some(handler),
            })
        }
    }
}

/// Strip one level of matching `'` or `"` quotes. Returns `None` when a
/// quote is opened or closed without its partner.
fn unquote(text: &str) -> Option<&str> {
    for quote in ['"', '\''] {
        let opens = text.starts_with(quote);
        let closes = text.len() > 1 && text.ends_with(quote);
        match (opens, closes) {
            (true, true) => return Some(text[1..text.len() - 1].trim()),
            (true, false) | (false, true) => return None,
            (false, false) => {}
        }
    }
    Some(text)
}
