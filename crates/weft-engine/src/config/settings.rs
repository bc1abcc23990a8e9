//! Configuration tree with dotted-path lookup
//!
//! Settings are loaded from TOML. A path such as `acme.billing.audit` walks
//! nested tables; the setting filter and the policy source read through
//! [`Settings::get`].

use std::fs;
use std::path::Path;

use thiserror::Error;
use toml::{Table, Value};

use super::weaving::WeavingConfig;

/// Errors that can occur while loading settings
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Failed to read the settings file
    #[error("Failed to read settings file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse settings: {0}")]
    ParseError(#[from] toml::de::Error),

    /// A section has the wrong shape
    #[error("Invalid settings section [{section}]: {message}")]
    InvalidSection { section: String, message: String },

    /// A required path could not be resolved
    #[error("Missing setting: {0}")]
    MissingPath(String),
}

/// The active configuration tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    root: Table,
}

impl Settings {
    /// Create an empty configuration tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse settings from a TOML string
    pub fn from_toml_str(source: &str) -> Result<Self, SettingsError> {
        let root: Table = source.parse()?;
        Ok(Self { root })
    }

    /// Load settings from a TOML file
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let source = fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Look up a dotted path, e.g. `acme.billing.audit`
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.root.get(segments.next()?)?;
        for segment in segments {
            current = current.as_table()?.get(segment)?;
        }
        Some(current)
    }

    /// Check if a dotted path resolves
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Set a value at a dotted path, creating intermediate tables
    ///
    /// A non-table value sitting on the way is replaced by a table.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) {
        let segments: Vec<&str> = path.split('.').collect();
        let Some((last, parents)) = segments.split_last() else {
            return;
        };

        let mut table = &mut self.root;
        for segment in parents {
            let entry = table
                .entry(segment.to_string())
                .or_insert_with(|| Value::Table(Table::new()));
            if !entry.is_table() {
                *entry = Value::Table(Table::new());
            }
            table = match entry {
                Value::Table(t) => t,
                _ => return,
            };
        }
        table.insert(last.to_string(), value.into());
    }

    /// Deserialize the `[weaving]` section, falling back to defaults when absent
    pub fn weaving(&self) -> Result<WeavingConfig, SettingsError> {
        match self.get("weaving") {
            Some(value) => value.clone().try_into().map_err(|e: toml::de::Error| {
                SettingsError::InvalidSection {
                    section: "weaving".to_string(),
                    message: e.to_string(),
                }
            }),
            None => Ok(WeavingConfig::default()),
        }
    }
}
