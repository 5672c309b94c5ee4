//! Error types for the plugin runtime.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while discovering, ordering and loading plugins.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// No descriptor file exists at the expected location.
    #[error("manifest not found: {0}")]
    ManifestNotFound(PathBuf),

    /// The descriptor exists but cannot be used.
    #[error("invalid manifest: {0}")]
    ManifestInvalid(String),

    /// A required dependency is absent from the discovery pass.
    #[error("plugin '{plugin}' requires missing dependency '{dependency}'")]
    MissingDependency { plugin: String, dependency: String },

    /// The dependency graph contains a cycle; no load order exists.
    #[error("cyclic dependency among plugins: {0:?}")]
    CyclicDependency(Vec<String>),

    /// The manifest has no entry point for the active profile.
    #[error("plugin '{plugin}' has no entry point for profile '{profile}'")]
    EntryPointMissing { plugin: String, profile: String },

    /// The entry-point locator is not of the form `<binary>,<type>`.
    #[error("plugin '{plugin}' has malformed entry point '{value}'")]
    EntryPointMalformed { plugin: String, value: String },

    /// The entry binary was not found in the plugin or host directories.
    #[error("plugin '{plugin}': binary '{binary}' not found")]
    BinaryNotFound { plugin: String, binary: String },

    /// The loaded binary declares a different type than the manifest names.
    #[error("plugin '{plugin}': type '{type_name}' not found (binary declares '{declared}')")]
    TypeNotFound {
        plugin: String,
        type_name: String,
        declared: String,
    },

    /// The loaded binary was built against an incompatible contract.
    #[error("plugin '{plugin}' does not implement the plugin contract: {reason}")]
    ContractNotImplemented { plugin: String, reason: String },

    /// The plugin factory failed or panicked.
    #[error("plugin '{plugin}' could not be instantiated: {reason}")]
    InstantiationFailed { plugin: String, reason: String },

    /// A lifecycle hook returned an error.
    #[error("plugin '{plugin}' failed during {phase}: {reason}")]
    LifecycleFailed {
        plugin: String,
        phase: &'static str,
        reason: String,
    },

    /// A plugin with this id is already loaded; the earlier one wins.
    #[error("plugin id '{0}' is already loaded")]
    DuplicatePluginId(String),

    /// No loaded plugin has this id.
    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    /// The load context was already unloaded.
    #[error("load context for plugin '{0}' is closed")]
    ContextClosed(String),

    /// Reload was requested but the host configuration disables it.
    #[error("hot reload is disabled by host configuration")]
    HotReloadDisabled,

    /// The plugin failed to reappear after an unload/re-load cycle.
    #[error("plugin '{0}' was not present after reload")]
    ReloadIncomplete(String),

    /// Failed to load a native library.
    #[error("library load error: {0}")]
    Library(#[from] libloading::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;
