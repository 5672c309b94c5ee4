//! The plugin lifecycle contract.
//!
//! A plugin moves through *Created → Initialized → Started → Stopped*. The
//! loader drives the transitions in that order and reverses them on unload.

use crate::context::PluginContext;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Contract every loadable plugin must implement.
///
/// All hooks are cancellable: the token is checked cooperatively by the
/// caller between lifecycle steps, and a plugin that performs long-running
/// work inside a hook should observe it as well.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Called exactly once after instantiation, before `start`.
    ///
    /// The context is the plugin's only handle to the host: configuration,
    /// the service registry, the event bus, and a plugin-scoped logger.
    async fn initialize(
        &mut self,
        context: PluginContext,
        cancel: CancellationToken,
    ) -> anyhow::Result<()>;

    /// Called after a successful `initialize`.
    async fn start(&mut self, cancel: CancellationToken) -> anyhow::Result<()>;

    /// Called on unload, and best-effort during rollback of a failed load.
    ///
    /// Plugins should release registrations and subscriptions here; the
    /// registry and event bus do not clean up on the plugin's behalf.
    async fn stop(&mut self, cancel: CancellationToken) -> anyhow::Result<()>;
}
