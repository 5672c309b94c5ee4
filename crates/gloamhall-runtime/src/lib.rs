//! # gloamhall-runtime
//!
//! Plugin runtime for Gloamhall: discovers plugin packages on disk, orders
//! them by declared dependencies, loads each into its own isolated context,
//! and manages their lifecycle.
//!
//! This crate provides:
//! - Plugin discovery from configured search roots
//! - Plugin manifest parsing
//! - Dependency-order resolution (Kahn's algorithm)
//! - Per-plugin load contexts over native libraries
//! - The orchestrating [`PluginLoader`] with unload and hot-reload support
//!
//! ## Plugin Structure
//!
//! Plugins are directories containing:
//! - `manifest.toml` - plugin identity, entry points, dependencies
//! - the plugin's native binaries, referenced by the entry-point locator
//!
//! ## Interaction model
//!
//! Loaded plugins never hold references to each other; all cross-plugin
//! interaction goes through the shared service registry and event bus from
//! `gloamhall-plugin-api`, which the loader injects into every plugin's
//! context.

pub mod capability;
pub mod context;
pub mod discovery;
pub mod error;
pub mod loader;
pub mod manifest;
pub mod resolver;

pub use capability::CapabilitySet;
pub use context::LoadContext;
pub use discovery::{discover_plugin, discover_plugins, DiscoveredPlugin, MANIFEST_FILE};
pub use error::{RuntimeError, RuntimeResult};
pub use loader::{PluginInfo, PluginLoader};
pub use manifest::{EntryPoint, PluginDependency, PluginManifest, PluginMetadata};
pub use resolver::resolve_load_order;
