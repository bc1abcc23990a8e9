//! `setting(path)` and `setting(path = 'literal')`

use toml::Value;

use super::{Candidate, MatchContext, MatchQuery, PointcutFilter};
use crate::config::Settings;
use crate::error::{AopError, AopResult};

/// Matches depending on a configuration value
///
/// The setting is resolved once, when the filter is built, so malformed
/// conditions and missing paths fail before any matching starts.
///
/// - `setting(acme.audit)`: the value must be a boolean; matches when true
/// - `setting(acme.mode = 'strict')`: matches when the value is the string
///   `strict`; any other value, including non-strings, does not match
#[derive(Debug, Clone)]
pub struct SettingFilter {
    path: String,
    literal: Option<String>,
    matched: bool,
}

impl SettingFilter {
    /// Parse a setting condition and resolve it against `settings`
    pub fn new(condition: &str, settings: &Settings) -> AopResult<Self> {
        let (path, literal) = match condition.split_once('=') {
            Some((path, rest)) => {
                let rest = rest.strip_prefix('=').unwrap_or(rest);
                (path.trim(), Some(parse_literal(condition, rest.trim())?))
            }
            None => (condition.trim(), None),
        };
        if path.is_empty() {
            return Err(AopError::invalid_expression(condition, "missing setting path"));
        }

        let value = settings.get(path).ok_or_else(|| {
            AopError::invalid_expression(condition, format!("setting '{}' does not exist", path))
        })?;

        let matched = match (&literal, value) {
            (Some(expected), Value::String(actual)) => expected == actual,
            (Some(_), _) => false,
            (None, Value::Boolean(flag)) => *flag,
            (None, other) => {
                return Err(AopError::invalid_expression(
                    condition,
                    format!(
                        "setting '{}' is a {}, expected a boolean or a comparison",
                        path,
                        other.type_str()
                    ),
                ))
            }
        };

        Ok(Self {
            path: path.to_string(),
            literal,
            matched,
        })
    }

    /// Dotted setting path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Expected string value, if the condition compares
    pub fn literal(&self) -> Option<&str> {
        self.literal.as_deref()
    }
}

fn parse_literal(condition: &str, raw: &str) -> AopResult<String> {
    let mut chars = raw.chars();
    let quote = match chars.next() {
        Some(q @ ('\'' | '"')) => q,
        Some(_) => {
            return Err(AopError::invalid_expression(
                condition,
                "setting value must be quoted",
            ))
        }
        None => return Err(AopError::invalid_expression(condition, "missing setting value")),
    };

    let body = &raw[quote.len_utf8()..];
    match body.find(quote) {
        Some(end) if end + quote.len_utf8() == body.len() => Ok(body[..end].to_string()),
        Some(_) => Err(AopError::invalid_expression(
            condition,
            "unexpected text after quoted setting value",
        )),
        None => Err(AopError::invalid_expression(
            condition,
            format!("unterminated {} quote", quote),
        )),
    }
}

impl PointcutFilter for SettingFilter {
    fn matches(&self, _: &MatchContext<'_>, _: &Candidate<'_>, _: &mut MatchQuery) -> AopResult<bool> {
        Ok(self.matched)
    }
}
