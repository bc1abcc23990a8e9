//! Weaving configuration (`[weaving]` in `weft.toml`)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::settings::SettingsError;

/// Options that steer the proxy compiler
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct WeavingConfig {
    /// Suffix appended to the name of the renamed original (default: "_Original")
    pub original_suffix: String,

    /// Regex patterns of classes eligible for weaving (default: everything)
    pub include_classes: Vec<String>,

    /// Base classes of the test harness; their descendants are never woven
    pub test_base_classes: Vec<String>,

    /// Class annotation that opts a class out of weaving (default: "NoProxy")
    pub no_proxy_annotation: String,

    /// Directory of the file-backed artifact cache (default: ~/.weft/cache/proxies)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

impl Default for WeavingConfig {
    fn default() -> Self {
        Self {
            original_suffix: "_Original".to_string(),
            include_classes: vec![".*".to_string()],
            test_base_classes: vec!["weft::testing::TestCase".to_string()],
            no_proxy_annotation: "NoProxy".to_string(),
            cache_dir: None,
        }
    }
}

impl WeavingConfig {
    /// Resolve the artifact cache directory
    pub fn cache_dir(&self) -> Result<PathBuf, SettingsError> {
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }
        let home = dirs::home_dir()
            .ok_or_else(|| SettingsError::MissingPath("home directory".to_string()))?;
        Ok(home.join(".weft").join("cache").join("proxies"))
    }
}
