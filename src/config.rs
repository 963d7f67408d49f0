//! Application settings loaded from `appsettings.json`.
//!
//! The file is optional. A missing or unreadable file, or one that is not
//! valid JSON, yields the defaults; a `quickLinks` value that is not a list
//! yields no quick links.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Name of the settings file looked up next to the executable.
pub const SETTINGS_FILE: &str = "appsettings.json";

/// Host used when a connect request names none.
pub const DEFAULT_HOST: &str = "127.0.0.1:2181";

/// Connect timeout used when none (or zero) is configured.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// A named shortcut to a service host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickLink {
    /// Label shown to the operator.
    pub name: String,
    /// `host:port` to connect to.
    pub host: String,
}

/// Browser settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Saved hosts offered for one-step connects.
    #[serde(deserialize_with = "quick_links_or_empty")]
    pub quick_links: Vec<QuickLink>,
    /// Host used when a connect names none.
    pub default_host: String,
    /// Upper bound on one connect attempt; zero means the default.
    pub connect_timeout_ms: u64,
    /// Capacity of the tree update channel.
    pub update_buffer_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            quick_links: Vec::new(),
            default_host: DEFAULT_HOST.to_string(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            update_buffer_size: 256,
        }
    }
}

fn quick_links_or_empty<'de, D>(deserializer: D) -> Result<Vec<QuickLink>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if !value.is_array() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_value(value).unwrap_or_else(|e| {
        tracing::warn!("Ignoring malformed quickLinks: {}", e);
        Vec::new()
    }))
}

impl Settings {
    /// Parse settings from JSON text, falling back to defaults.
    pub fn from_json(text: &str) -> Self {
        match serde_json::from_str(text) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Ignoring unparseable settings: {}", e);
                Self::default()
            }
        }
    }

    /// Load settings from `path`, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                tracing::debug!("Loaded settings from {}", path.display());
                Self::from_json(&text)
            }
            Err(e) => {
                tracing::debug!("No settings at {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Load `appsettings.json` from the executable's directory.
    pub fn load_default() -> Self {
        match default_settings_path() {
            Some(path) => Self::load(&path),
            None => Self::default(),
        }
    }

    /// The configured connect timeout. A zero value would fail every
    /// connect, so it maps to [`DEFAULT_CONNECT_TIMEOUT_MS`].
    pub fn connect_timeout(&self) -> std::time::Duration {
        let millis = match self.connect_timeout_ms {
            0 => DEFAULT_CONNECT_TIMEOUT_MS,
            millis => millis,
        };
        std::time::Duration::from_millis(millis)
    }
}

/// `appsettings.json` beside the running executable.
pub fn default_settings_path() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    Some(exe.parent()?.join(SETTINGS_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_quick_links() {
        let settings = Settings::from_json(
            r#"{"quickLinks": [{"name": "dev", "host": "10.0.0.1:2181"}], "connectTimeoutMs": 500}"#,
        );

        assert_eq!(
            settings.quick_links,
            vec![QuickLink {
                name: "dev".to_string(),
                host: "10.0.0.1:2181".to_string()
            }]
        );
        assert_eq!(settings.connect_timeout_ms, 500);
        assert_eq!(settings.default_host, DEFAULT_HOST);
    }

    #[test]
    fn test_zero_connect_timeout_uses_default() {
        let settings = Settings::from_json(r#"{"connectTimeoutMs": 0}"#);
        assert_eq!(
            settings.connect_timeout(),
            std::time::Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS)
        );

        let settings = Settings::from_json(r#"{"connectTimeoutMs": 250}"#);
        assert_eq!(settings.connect_timeout(), std::time::Duration::from_millis(250));
    }

    #[test]
    fn test_non_array_quick_links_are_ignored() {
        let settings = Settings::from_json(r#"{"quickLinks": {"name": "dev"}}"#);
        assert!(settings.quick_links.is_empty());
    }

    #[test]
    fn test_invalid_json_falls_back_to_defaults() {
        assert_eq!(Settings::from_json("{not json"), Settings::default());
    }

    #[test]
    fn test_load_missing_file() {
        let temp = tempdir().unwrap();
        let settings = Settings::load(&temp.path().join(SETTINGS_FILE));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_load_from_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(SETTINGS_FILE);
        std::fs::write(
            &path,
            r#"{"quickLinks": [{"name": "a", "host": "h:1"}, {"name": "b", "host": "h:2"}]}"#,
        )
        .unwrap();

        let settings = Settings::load(&path);
        assert_eq!(settings.quick_links.len(), 2);
        assert_eq!(settings.quick_links[1].host, "h:2");
    }
}
