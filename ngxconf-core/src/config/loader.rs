//! Settings loader

use crate::config::Settings;
use crate::error::{Error, Result};
use std::path::Path;

/// Loads [`Settings`] from TOML or JSON
pub struct SettingsLoader;

impl SettingsLoader {
    /// Load settings from a file, picking the format by extension
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Settings> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::file(format!("failed to read settings file: {}", e)).with_file(path)
        })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        tracing::debug!("Loading settings from {} ({})", path.display(), ext);

        let settings = match ext {
            "json" => Self::from_json(&content),
            "toml" | "" => Self::from_toml(&content),
            _ => Err(Error::validation(format!("unknown settings format: {}", ext))),
        };
        settings.map_err(|e| e.with_file(path))
    }

    /// Parse JSON settings
    pub fn from_json(content: &str) -> Result<Settings> {
        serde_json::from_str(content)
            .map_err(|e| Error::validation(format!("invalid JSON settings: {}", e)))
    }

    /// Parse TOML settings
    pub fn from_toml(content: &str) -> Result<Settings> {
        toml::from_str(content)
            .map_err(|e| Error::validation(format!("invalid TOML settings: {}", e)))
    }
}
