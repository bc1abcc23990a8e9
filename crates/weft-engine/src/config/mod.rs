//! Configuration
//!
//! - [`Settings`]: the TOML configuration tree with dotted-path lookup
//! - [`WeavingConfig`]: compiler options from the `[weaving]` section

mod settings;
mod weaving;

pub use settings::{Settings, SettingsError};
pub use weaving::WeavingConfig;
