//! The façade handed to each plugin at initialization.
//!
//! A plugin never reaches for globals: everything it may touch on the host
//! side (configuration, the service registry, the event bus, logging, the
//! restart capability) arrives bundled in one [`PluginContext`].

use crate::config::HostConfig;
use crate::events::EventBus;
use crate::registry::ServiceRegistry;
use async_trait::async_trait;
use std::sync::Arc;

/// Log level for plugin logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Logger scoped to one plugin id.
///
/// Messages are forwarded to `tracing` with the plugin id attached as a
/// structured field.
#[derive(Debug, Clone)]
pub struct PluginLogger {
    plugin_id: String,
}

impl PluginLogger {
    /// Create a logger for the given plugin id.
    pub fn new(plugin_id: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
        }
    }

    /// Log a message at the given level.
    pub fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Trace => tracing::trace!(plugin = %self.plugin_id, "{}", message),
            LogLevel::Debug => tracing::debug!(plugin = %self.plugin_id, "{}", message),
            LogLevel::Info => tracing::info!(plugin = %self.plugin_id, "{}", message),
            LogLevel::Warn => tracing::warn!(plugin = %self.plugin_id, "{}", message),
            LogLevel::Error => tracing::error!(plugin = %self.plugin_id, "{}", message),
        }
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

/// Host operations a plugin may request.
///
/// Implemented by the loader; routed back through it so a plugin can ask for
/// its own (or another plugin's) restart without holding loader internals.
#[async_trait]
pub trait PluginHost: Send + Sync {
    /// Stop, unload and re-load the named plugin.
    ///
    /// Availability is governed by the host's hot-reload setting.
    async fn restart_plugin(&self, id: &str) -> anyhow::Result<()>;
}

/// Per-plugin view of the host, built by the loader before `initialize`.
#[derive(Clone)]
pub struct PluginContext {
    plugin_id: String,
    config: Arc<HostConfig>,
    registry: Arc<ServiceRegistry>,
    events: Arc<EventBus>,
    host: Arc<dyn PluginHost>,
    logger: PluginLogger,
}

impl PluginContext {
    /// Assemble a context for one plugin.
    pub fn new(
        plugin_id: impl Into<String>,
        config: Arc<HostConfig>,
        registry: Arc<ServiceRegistry>,
        events: Arc<EventBus>,
        host: Arc<dyn PluginHost>,
    ) -> Self {
        let plugin_id = plugin_id.into();
        let logger = PluginLogger::new(plugin_id.clone());
        Self {
            plugin_id,
            config,
            registry,
            events,
            host,
            logger,
        }
    }

    /// Id of the plugin this context belongs to.
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Host configuration (read-only).
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// The shared service registry.
    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// The shared event bus.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// The host façade.
    pub fn host(&self) -> &Arc<dyn PluginHost> {
        &self.host
    }

    /// Logger scoped to this plugin.
    pub fn logger(&self) -> &PluginLogger {
        &self.logger
    }
}
