//! User settings persistence.
//!
//! Stores preferences in ~/.agentscan/settings.json.
//! Settings are resolved with env var > settings.json > default priority;
//! see [`crate::config`] for the resolution step.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// User settings persisted to disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    // === Indexer ===
    /// API key for the DAS indexer. When absent, discovery goes straight
    /// to the chain scan.
    #[serde(default)]
    pub indexer_api_key: Option<String>,

    /// Indexer base URL.
    #[serde(default)]
    pub indexer_base_url: Option<String>,

    // === Ledger ===
    /// JSON-RPC endpoint.
    #[serde(default)]
    pub rpc_url: Option<String>,

    /// Maximum unique mints resolved by a chain scan.
    #[serde(default)]
    pub mint_cap: Option<usize>,

    /// Metadata lookups in flight during a chain scan.
    #[serde(default)]
    pub metadata_concurrency: Option<usize>,

    /// Per-request HTTP timeout.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    // === Wallet ===
    /// Wallet listed by `owned` when no address is given.
    #[serde(default)]
    pub wallet: Option<String>,
}

impl Settings {
    /// Get the default settings file path (~/.agentscan/settings.json).
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".agentscan")
            .join("settings.json")
    }

    /// Load settings from a specific path.
    ///
    /// A missing or unparseable file yields defaults.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(settings) => settings,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "ignoring unreadable settings file"
                    );
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Write settings to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
    }

    /// Get a setting value by key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        match json.get(key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::Bool(b) => Some(b.to_string()),
            serde_json::Value::Null => Some("null".to_string()),
            other => Some(other.to_string()),
        }
    }

    /// Set a setting value by key.
    ///
    /// `null` (or an empty value) clears the setting. Numeric settings must
    /// parse as non-negative integers.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        let mut json = serde_json::to_value(&self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;
        let obj = json
            .as_object_mut()
            .ok_or_else(|| "Settings are not an object".to_string())?;
        if !obj.contains_key(key) {
            return Err(format!("Unknown setting: {}", key));
        }

        let value = value.trim();
        let new_value = if value.is_empty() || value == "null" {
            serde_json::Value::Null
        } else if NUMERIC_KEYS.contains(&key) {
            let n = value
                .parse::<u64>()
                .map_err(|_| format!("Expected integer for {}, got '{}'", key, value))?;
            serde_json::Value::Number(n.into())
        } else {
            serde_json::Value::String(value.to_string())
        };
        obj.insert(key.to_string(), new_value);

        *self =
            serde_json::from_value(json).map_err(|e| format!("Failed to apply setting: {}", e))?;
        Ok(())
    }

    /// List all settings as (key, value) pairs, with the API key masked.
    pub fn list(&self) -> Vec<(String, String)> {
        let json = match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(obj)) => obj,
            _ => return Vec::new(),
        };
        let mut results: Vec<(String, String)> = json
            .into_iter()
            .map(|(key, value)| {
                let display = match value {
                    serde_json::Value::Null => "null".to_string(),
                    _ if key == "indexer_api_key" => "********".to_string(),
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (key, display)
            })
            .collect();
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }
}

const NUMERIC_KEYS: &[&str] = &["mint_cap", "metadata_concurrency", "request_timeout_secs"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("nope.json"));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = Settings {
            rpc_url: Some("https://rpc.example".to_string()),
            mint_cap: Some(50),
            ..Default::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path), settings);
    }

    #[test]
    fn test_garbage_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
    }

    #[test]
    fn test_get_and_set() {
        let mut settings = Settings::default();
        assert_eq!(settings.get("rpc_url"), Some("null".to_string()));
        assert_eq!(settings.get("nonexistent"), None);

        settings.set("rpc_url", "https://rpc.example").unwrap();
        assert_eq!(settings.rpc_url.as_deref(), Some("https://rpc.example"));

        settings.set("mint_cap", "200").unwrap();
        assert_eq!(settings.mint_cap, Some(200));
        assert!(settings.set("mint_cap", "lots").is_err());

        settings.set("rpc_url", "null").unwrap();
        assert_eq!(settings.rpc_url, None);

        assert!(settings.set("bogus", "1").is_err());
    }

    #[test]
    fn test_list_masks_api_key() {
        let settings = Settings {
            indexer_api_key: Some("secret".to_string()),
            ..Default::default()
        };
        let list = settings.list();
        let key = list.iter().find(|(k, _)| k == "indexer_api_key").unwrap();
        assert_eq!(key.1, "********");
        assert!(list.iter().any(|(k, _)| k == "wallet"));
    }
}
