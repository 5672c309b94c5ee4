//! Plugin manifest parsing.
//!
//! Each plugin directory contains a `manifest.toml` describing the plugin's
//! identity, per-profile entry points, dependencies and capability tags:
//!
//! ```toml
//! capabilities = ["renderer"]
//!
//! [plugin]
//! id = "braille-renderer"
//! name = "Braille Renderer"
//! version = "0.3.0"
//!
//! [entry_point]
//! default = "libbraille.so,braille::BrailleRenderer"
//!
//! [[dependencies]]
//! id = "core-render"
//! ```

use crate::capability::CapabilitySet;
use crate::error::{RuntimeError, RuntimeResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Plugin manifest structure. Immutable after parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Plugin identity.
    pub plugin: PluginMetadata,

    /// Map from deployment profile to an entry-point locator of the form
    /// `"<binary-file>,<fully-qualified-type-name>"`.
    #[serde(default)]
    pub entry_point: HashMap<String, String>,

    /// Plugins that must (or, if optional, should) load before this one.
    #[serde(default)]
    pub dependencies: Vec<PluginDependency>,

    /// Free-form capability tags.
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// Plugin identity block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Unique identifier for the plugin.
    pub id: String,

    /// Human-readable name. Defaults to the id.
    #[serde(default)]
    pub name: String,

    /// Version string. Defaults to "1.0.0".
    #[serde(default)]
    pub version: String,

    /// Plugin description.
    #[serde(default)]
    pub description: Option<String>,
}

/// One declared dependency edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginDependency {
    /// Id of the plugin depended upon.
    pub id: String,

    /// Optional dependencies that are absent are silently ignored; required
    /// ones abort the whole discovery pass.
    #[serde(default)]
    pub optional: bool,
}

/// A parsed entry-point locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    /// File name of the plugin binary, resolved inside the plugin directory.
    pub binary: String,

    /// Fully-qualified name of the plugin type inside that binary.
    pub type_name: String,
}

impl EntryPoint {
    /// Parse a `"<binary>,<type>"` locator.
    pub fn parse(plugin_id: &str, locator: &str) -> RuntimeResult<Self> {
        let malformed = || RuntimeError::EntryPointMalformed {
            plugin: plugin_id.to_string(),
            value: locator.to_string(),
        };

        let (binary, type_name) = locator.split_once(',').ok_or_else(malformed)?;
        let binary = binary.trim();
        let type_name = type_name.trim();
        if binary.is_empty() || type_name.is_empty() {
            return Err(malformed());
        }

        Ok(Self {
            binary: binary.to_string(),
            type_name: type_name.to_string(),
        })
    }
}

impl PluginManifest {
    /// Load a manifest from a TOML file.
    ///
    /// Fails with [`RuntimeError::ManifestNotFound`] if the file is absent.
    pub fn from_file(path: &Path) -> RuntimeResult<Self> {
        if !path.exists() {
            return Err(RuntimeError::ManifestNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a manifest from a TOML string.
    pub fn from_str(content: &str) -> RuntimeResult<Self> {
        let mut manifest: PluginManifest = toml::from_str(content)
            .map_err(|e| RuntimeError::ManifestInvalid(e.to_string()))?;
        manifest.validate()?;
        manifest.apply_defaults();
        Ok(manifest)
    }

    fn validate(&self) -> RuntimeResult<()> {
        if self.plugin.id.is_empty() {
            return Err(RuntimeError::ManifestInvalid(
                "plugin id cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn apply_defaults(&mut self) {
        if self.plugin.name.is_empty() {
            self.plugin.name = self.plugin.id.clone();
        }
        if self.plugin.version.is_empty() {
            self.plugin.version = "1.0.0".to_string();
        }
    }

    /// Get the plugin id.
    pub fn id(&self) -> &str {
        &self.plugin.id
    }

    /// The entry-point locator for a profile, parsed.
    pub fn entry_point_for(&self, profile: &str) -> RuntimeResult<EntryPoint> {
        let locator =
            self.entry_point
                .get(profile)
                .ok_or_else(|| RuntimeError::EntryPointMissing {
                    plugin: self.plugin.id.clone(),
                    profile: profile.to_string(),
                })?;
        EntryPoint::parse(&self.plugin.id, locator)
    }

    /// Whether an entry point exists for the given profile.
    pub fn has_entry_point(&self, profile: &str) -> bool {
        self.entry_point.contains_key(profile)
    }

    /// The capability set declared by this plugin.
    pub fn capability_set(&self) -> CapabilitySet {
        CapabilitySet::from_strings(&self.capabilities)
    }
}
