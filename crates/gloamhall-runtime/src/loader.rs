//! Plugin loading orchestration.
//!
//! The [`PluginLoader`] drives the whole pass: discover descriptors, order
//! them by dependency, then load each plugin in turn (open a load context,
//! verify and instantiate the declared type, hand it a [`PluginContext`],
//! run `initialize`/`start`, commit the record). One broken plugin never
//! aborts the pass; resolution failures (missing required dependency,
//! cycle) do, because no safe order exists.

use crate::context::LoadContext;
use crate::discovery::{self, DiscoveredPlugin};
use crate::error::{RuntimeError, RuntimeResult};
use crate::manifest::PluginManifest;
use crate::resolver::resolve_load_order;
use async_trait::async_trait;
use gloamhall_plugin_api::{
    EventBus, HostConfig, Plugin, PluginContext, PluginHost, ServiceRegistry,
};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// State of one successfully loaded plugin.
///
/// Field order matters: the instance must drop before the load context that
/// produced it, so its library code stays mapped while it is torn down.
struct PluginRecord {
    directory: PathBuf,
    manifest: PluginManifest,
    instance: Box<dyn Plugin>,
    context: LoadContext,
}

/// Information about a loaded plugin.
#[derive(Debug, Clone)]
pub struct PluginInfo {
    pub id: String,
    pub name: String,
    pub version: String,
    pub directory: PathBuf,
    pub capabilities: Vec<String>,
}

/// Orchestrates discovery, ordering, loading, unloading and reloading.
pub struct PluginLoader {
    config: Arc<HostConfig>,
    registry: Arc<ServiceRegistry>,
    events: Arc<EventBus>,
    install_root: PathBuf,
    records: Mutex<HashMap<String, PluginRecord>>,
    self_weak: Weak<PluginLoader>,
}

impl PluginLoader {
    /// Create a loader anchored to the running executable's directory.
    pub fn new(
        config: Arc<HostConfig>,
        registry: Arc<ServiceRegistry>,
        events: Arc<EventBus>,
    ) -> Arc<Self> {
        let install_root = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        Self::with_install_root(config, registry, events, install_root)
    }

    /// Create a loader with an explicit install root.
    pub fn with_install_root(
        config: Arc<HostConfig>,
        registry: Arc<ServiceRegistry>,
        events: Arc<EventBus>,
        install_root: PathBuf,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            config,
            registry,
            events,
            install_root,
            records: Mutex::new(HashMap::new()),
            self_weak: weak.clone(),
        })
    }

    fn records(&self) -> std::sync::MutexGuard<'_, HashMap<String, PluginRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Discover, order and load every plugin under the configured paths.
    ///
    /// Returns the number of plugins that loaded successfully this pass;
    /// per-plugin failures are logged and skipped.
    pub async fn load_all(&self, cancel: &CancellationToken) -> RuntimeResult<usize> {
        let roots = discovery::resolve_search_paths(&self.config.plugin_paths, &self.install_root);
        let discovered = discovery::discover_plugins(&roots, &self.config.profile)?;
        self.load_discovered(discovered, cancel).await
    }

    async fn load_discovered(
        &self,
        discovered: Vec<DiscoveredPlugin>,
        cancel: &CancellationToken,
    ) -> RuntimeResult<usize> {
        let mut directory_by_id: HashMap<String, PathBuf> = HashMap::new();
        let mut manifests = Vec::with_capacity(discovered.len());
        for plugin in discovered {
            directory_by_id.insert(plugin.id().to_string(), plugin.directory);
            manifests.push(plugin.manifest);
        }

        // Resolution failures abort the pass: without an order there is no
        // safe way to load anything.
        let ordered = resolve_load_order(manifests)?;

        let mut loaded = 0;
        for manifest in ordered {
            if cancel.is_cancelled() {
                info!("plugin loading cancelled");
                break;
            }
            let id = manifest.id().to_string();
            // The directory is always present: both maps came from the same
            // discovery pass.
            let Some(directory) = directory_by_id.remove(&id) else {
                continue;
            };
            match self.load_one(manifest, directory, cancel).await {
                Ok(_) => loaded += 1,
                Err(e) => warn!(plugin = %id, error = %e, "failed to load plugin"),
            }
        }

        info!("loaded {} plugins", loaded);
        Ok(loaded)
    }

    /// Load a single plugin from its directory.
    async fn load_one(
        &self,
        manifest: PluginManifest,
        directory: PathBuf,
        cancel: &CancellationToken,
    ) -> RuntimeResult<String> {
        let id = manifest.id().to_string();
        let entry = manifest.entry_point_for(&self.config.profile)?;

        let mut context =
            LoadContext::open(id.as_str(), &directory, vec![self.install_root.clone()]);
        let declaration = match context.load_declaration(&entry.binary) {
            Ok(declaration) => declaration,
            Err(e) => {
                context.close();
                return Err(e);
            }
        };

        // Contract and type checks are by fully-qualified name: the plugin
        // binary and the host live in different load boundaries, so runtime
        // type identity is not trustworthy across them.
        if !declaration.is_compatible() {
            let reason = format!(
                "binary declares ABI v{} of '{}', host expects ABI v{} of '{}'",
                declaration.abi_version,
                declaration.contract,
                gloamhall_plugin_api::PLUGIN_ABI_VERSION,
                gloamhall_plugin_api::PLUGIN_CONTRACT,
            );
            context.close();
            return Err(RuntimeError::ContractNotImplemented { plugin: id, reason });
        }
        if declaration.type_name != entry.type_name {
            let declared = declaration.type_name.to_string();
            context.close();
            return Err(RuntimeError::TypeNotFound {
                plugin: id,
                type_name: entry.type_name,
                declared,
            });
        }

        let instance = match catch_unwind(AssertUnwindSafe(declaration.create)) {
            Ok(instance) => instance,
            Err(payload) => {
                context.close();
                return Err(RuntimeError::InstantiationFailed {
                    plugin: id,
                    reason: panic_message(payload),
                });
            }
        };

        debug!(plugin = %id, binary = %entry.binary, "instantiated plugin");
        self.install(manifest, directory, context, instance, cancel)
            .await
    }

    /// Run a statically linked plugin through the regular lifecycle.
    ///
    /// Built-in plugins share the context, initialize/start order, commit
    /// and rollback paths of dynamically loaded ones; they simply have no
    /// libraries to unload.
    pub async fn load_builtin(
        &self,
        manifest: PluginManifest,
        instance: Box<dyn Plugin>,
        cancel: &CancellationToken,
    ) -> RuntimeResult<String> {
        let context = LoadContext::builtin(manifest.id());
        self.install(manifest, PathBuf::new(), context, instance, cancel)
            .await
    }

    /// Initialize, start and commit an instantiated plugin.
    async fn install(
        &self,
        manifest: PluginManifest,
        directory: PathBuf,
        mut context: LoadContext,
        mut instance: Box<dyn Plugin>,
        cancel: &CancellationToken,
    ) -> RuntimeResult<String> {
        let id = manifest.id().to_string();
        let plugin_context = PluginContext::new(
            id.as_str(),
            Arc::clone(&self.config),
            Arc::clone(&self.registry),
            Arc::clone(&self.events),
            Arc::new(LoaderHost {
                loader: self.self_weak.clone(),
            }),
        );

        if let Err(e) = instance.initialize(plugin_context, cancel.clone()).await {
            self.roll_back(&id, &mut instance, &mut context).await;
            return Err(RuntimeError::LifecycleFailed {
                plugin: id,
                phase: "initialize",
                reason: e.to_string(),
            });
        }
        if let Err(e) = instance.start(cancel.clone()).await {
            self.roll_back(&id, &mut instance, &mut context).await;
            return Err(RuntimeError::LifecycleFailed {
                plugin: id,
                phase: "start",
                reason: e.to_string(),
            });
        }

        {
            let mut records = self.records();
            if !records.contains_key(&id) {
                records.insert(
                    id.clone(),
                    PluginRecord {
                        directory,
                        manifest,
                        instance,
                        context,
                    },
                );
                info!(plugin = %id, "plugin started");
                return Ok(id);
            }
        }

        // First-loaded wins: discard the newer instance, keep the old one.
        warn!(plugin = %id, "duplicate plugin id; keeping the first-loaded instance");
        self.roll_back(&id, &mut instance, &mut context).await;
        Err(RuntimeError::DuplicatePluginId(id))
    }

    /// Best-effort teardown of a partially loaded plugin.
    async fn roll_back(
        &self,
        id: &str,
        instance: &mut Box<dyn Plugin>,
        context: &mut LoadContext,
    ) {
        if let Err(e) = instance.stop(CancellationToken::new()).await {
            warn!(plugin = %id, error = %e, "rollback stop failed");
        }
        context.close();
    }

    /// Stop and unload one plugin, removing its record.
    pub async fn unload(&self, id: &str) -> RuntimeResult<()> {
        let record = self
            .records()
            .remove(id)
            .ok_or_else(|| RuntimeError::PluginNotFound(id.to_string()))?;

        let PluginRecord {
            mut instance,
            mut context,
            ..
        } = record;

        if let Err(e) = instance.stop(CancellationToken::new()).await {
            warn!(plugin = %id, error = %e, "plugin stop failed during unload");
        }
        // Release the instance before its libraries: code from the plugin
        // boundary must not run after the handles are gone.
        drop(instance);
        context.close();

        info!(plugin = %id, "plugin unloaded");
        Ok(())
    }

    /// Unload a plugin, then rediscover and re-load it from its directory.
    ///
    /// This is stop-then-reload, not live state migration. Succeeds only if
    /// the plugin is present again afterwards.
    pub async fn reload(&self, id: &str, cancel: &CancellationToken) -> RuntimeResult<()> {
        if !self.config.hot_reload {
            return Err(RuntimeError::HotReloadDisabled);
        }

        let directory = self
            .records()
            .get(id)
            .map(|record| record.directory.clone())
            .ok_or_else(|| RuntimeError::PluginNotFound(id.to_string()))?;

        self.unload(id).await?;

        let rediscovered = discovery::discover_plugin(&directory)?;
        self.load_one(rediscovered.manifest, rediscovered.directory, cancel)
            .await?;

        if self.is_loaded(id) {
            info!(plugin = %id, "plugin reloaded");
            Ok(())
        } else {
            Err(RuntimeError::ReloadIncomplete(id.to_string()))
        }
    }

    /// Whether a plugin with this id is currently loaded.
    pub fn is_loaded(&self, id: &str) -> bool {
        self.records().contains_key(id)
    }

    /// Ids of all loaded plugins.
    pub fn loaded_ids(&self) -> Vec<String> {
        self.records().keys().cloned().collect()
    }

    /// Number of loaded plugins.
    pub fn plugin_count(&self) -> usize {
        self.records().len()
    }

    /// Information about every loaded plugin.
    pub fn list_plugins(&self) -> Vec<PluginInfo> {
        self.records()
            .values()
            .map(|record| PluginInfo {
                id: record.manifest.plugin.id.clone(),
                name: record.manifest.plugin.name.clone(),
                version: record.manifest.plugin.version.clone(),
                directory: record.directory.clone(),
                capabilities: record.manifest.capabilities.clone(),
            })
            .collect()
    }

    /// Ids of loaded plugins declaring a capability tag.
    pub fn plugins_with_capability(&self, tag: &str) -> Vec<String> {
        self.records()
            .values()
            .filter(|record| record.manifest.capability_set().has(tag))
            .map(|record| record.manifest.plugin.id.clone())
            .collect()
    }
}

/// Host façade handed to plugins, routing restart requests back through the
/// loader without exposing its internals.
struct LoaderHost {
    loader: Weak<PluginLoader>,
}

#[async_trait]
impl PluginHost for LoaderHost {
    async fn restart_plugin(&self, id: &str) -> anyhow::Result<()> {
        let loader = self
            .loader
            .upgrade()
            .ok_or_else(|| anyhow::anyhow!("plugin loader is shut down"))?;
        loader.reload(id, &CancellationToken::new()).await?;
        Ok(())
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "plugin constructor panicked".to_string()
    }
}
