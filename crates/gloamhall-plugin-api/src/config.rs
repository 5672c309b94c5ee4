//! Host configuration consumed by the plugin runtime.
//!
//! The embedding application owns the file this is parsed from; the runtime
//! only reads it. Search-path entries support a `~` home shorthand, and
//! relative entries are anchored to the application's install directory by
//! the runtime (not the process working directory) so discovery stays
//! deterministic regardless of launch location.

use serde::Deserialize;
use std::collections::HashMap;

/// Configuration slice the plugin runtime consumes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Root directories scanned for plugin subdirectories.
    ///
    /// Entries may be absolute, `~`-prefixed, or relative to the install
    /// directory. When empty, the runtime falls back to the per-user plugin
    /// directory.
    pub plugin_paths: Vec<String>,

    /// Active deployment profile, selecting which entry-point key each
    /// manifest is resolved with.
    pub profile: String,

    /// Whether plugin reload is exposed to operators.
    pub hot_reload: bool,

    /// Free-form host settings plugins may read.
    pub settings: HashMap<String, toml::Value>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            plugin_paths: Vec::new(),
            profile: "default".to_string(),
            hot_reload: false,
            settings: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HostConfig::default();
        assert!(config.plugin_paths.is_empty());
        assert_eq!(config.profile, "default");
        assert!(!config.hot_reload);
        assert!(config.settings.is_empty());
    }

    #[test]
    fn test_deserialize_config() {
        let toml = r#"
plugin_paths = ["~/plugins", "mods"]
profile = "release"
hot_reload = true

[settings]
tile_size = 16
"#;

        let config: HostConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.plugin_paths, vec!["~/plugins", "mods"]);
        assert_eq!(config.profile, "release");
        assert!(config.hot_reload);
        assert_eq!(
            config.settings.get("tile_size").and_then(|v| v.as_integer()),
            Some(16)
        );
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: HostConfig = toml::from_str("profile = \"dev\"").unwrap();
        assert_eq!(config.profile, "dev");
        assert!(!config.hot_reload);
    }
}
