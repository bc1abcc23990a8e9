//! `class(pattern)`

use regex::Regex;

use super::{Candidate, MatchContext, MatchQuery, PointcutFilter};
use crate::error::{AopError, AopResult};

const REGEX_METACHARACTERS: &[char] = &['.', '*', '+', '?', '(', ')', '[', ']', '{', '}', '|', '^', '$'];

/// A name pattern: exact text, or an anchored regex when metacharacters are present
///
/// A backslash is a namespace separator (`Acme\Billing\Invoice`), never a
/// regex escape.
#[derive(Debug, Clone)]
pub enum NamePattern {
    /// Matches exactly this name
    Exact(String),
    /// Matches names the whole of which match the regex
    Regex {
        /// Anchored, compiled form
        regex: Regex,
        /// Pattern as written
        source: String,
    },
}

impl NamePattern {
    /// Compile a pattern
    pub fn new(pattern: &str) -> AopResult<Self> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(AopError::invalid_expression(pattern, "empty name pattern"));
        }
        if !pattern.contains(REGEX_METACHARACTERS) {
            return Ok(NamePattern::Exact(pattern.to_string()));
        }
        let escaped = pattern.replace('\\', "\\\\");
        Regex::new(&format!("^(?:{})$", escaped))
            .map(|regex| NamePattern::Regex {
                regex,
                source: pattern.to_string(),
            })
            .map_err(|e| AopError::invalid_expression(pattern, format!("invalid regex: {}", e)))
    }

    /// Check a name against the pattern
    pub fn is_match(&self, name: &str) -> bool {
        match self {
            NamePattern::Exact(exact) => exact == name,
            NamePattern::Regex { regex, .. } => regex.is_match(name),
        }
    }

    /// Source form of the pattern
    pub fn as_str(&self) -> &str {
        match self {
            NamePattern::Exact(exact) => exact,
            NamePattern::Regex { source, .. } => source,
        }
    }
}

/// Matches join points by the qualified name of their class
///
/// Final classes never match, and neither do final methods.
#[derive(Debug, Clone)]
pub struct ClassNameFilter {
    pattern: NamePattern,
}

impl ClassNameFilter {
    /// Create a filter from a class name or regex
    pub fn new(pattern: &str) -> AopResult<Self> {
        Ok(Self {
            pattern: NamePattern::new(pattern)?,
        })
    }

    /// The pattern
    pub fn pattern(&self) -> &NamePattern {
        &self.pattern
    }
}

impl PointcutFilter for ClassNameFilter {
    fn matches(
        &self,
        ctx: &MatchContext<'_>,
        candidate: &Candidate<'_>,
        _query: &mut MatchQuery,
    ) -> AopResult<bool> {
        if !self.pattern.is_match(candidate.class_name) {
            return Ok(false);
        }
        if ctx.reflection.is_class_final(candidate.class_name) {
            return Ok(false);
        }
        if let Some(method) = candidate.method_name {
            if ctx.reflection.is_method_final(candidate.class_name, method) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
