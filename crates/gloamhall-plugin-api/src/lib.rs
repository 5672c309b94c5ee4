//! # gloamhall-plugin-api
//!
//! Plugin contract for Gloamhall plugins.
//!
//! This crate is the single shared boundary between the host and every
//! dynamically loaded plugin. It provides:
//!
//! - The [`Plugin`] lifecycle trait and the `declare_plugin!` export macro
//! - The [`ServiceRegistry`], a priority-ranked capability registry
//! - The [`EventBus`], a typed publish/subscribe channel
//! - The [`PluginContext`] façade handed to each plugin at initialization
//!
//! ## Isolation model
//!
//! Each plugin lives in its own load context, so two loads of "the same"
//! interface can have distinct runtime identities. Every contract check in
//! this crate therefore compares fully-qualified type names, never `TypeId`
//! or reference identity. The host links this crate exactly once; plugins
//! compile against the same version, which the runtime verifies through the
//! [`declaration::PluginDeclaration`] exported by each plugin binary.

pub mod config;
pub mod context;
pub mod declaration;
pub mod events;
pub mod plugin;
pub mod registry;

pub use config::HostConfig;
pub use context::{LogLevel, PluginContext, PluginHost, PluginLogger};
pub use declaration::{PluginDeclaration, PLUGIN_ABI_VERSION, PLUGIN_CONTRACT};
pub use events::{EventBus, EventBusError, SubscriptionId};
pub use plugin::Plugin;
pub use registry::{RegistryError, SelectionMode, ServiceMetadata, ServiceRegistry};
