//! Dummy plugin for testing the Gloamhall plugin runtime.
//!
//! Registers a trivial `Greeter` service and listens for `TurnEnded`
//! events. Useful as a template for real plugins: the interesting parts are
//! the `declare_plugin!` invocation at the bottom and the symmetric
//! register/unregister in `initialize`/`stop`.

use async_trait::async_trait;
use gloamhall_plugin_api::{
    declare_plugin, Plugin, PluginContext, ServiceMetadata, SubscriptionId,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Capability interface this plugin implements.
pub trait Greeter: Send + Sync {
    fn greet(&self, name: &str) -> String;
}

/// Event published by the host at the end of each game turn.
#[derive(Debug)]
pub struct TurnEnded {
    pub turn: u64,
}

struct DummyGreeter;

impl Greeter for DummyGreeter {
    fn greet(&self, name: &str) -> String {
        format!("the dummy plugin greets {name}")
    }
}

/// The plugin entry type named by `manifest.toml`.
#[derive(Default)]
pub struct DummyPlugin {
    context: Option<PluginContext>,
    greeter: Option<Arc<DummyGreeter>>,
    subscription: Option<SubscriptionId>,
}

impl DummyPlugin {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Plugin for DummyPlugin {
    async fn initialize(
        &mut self,
        context: PluginContext,
        _cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        context.logger().info("dummy plugin initializing");

        let greeter = Arc::new(DummyGreeter);
        context
            .registry()
            .register::<dyn Greeter>(greeter.clone(), ServiceMetadata::with_priority(0));
        self.greeter = Some(greeter);

        let logger = context.logger().clone();
        self.subscription = Some(context.events().subscribe::<TurnEnded, _, _>(move |event| {
            let logger = logger.clone();
            async move {
                logger.info(&format!("turn {} ended", event.turn));
                Ok(())
            }
        }));

        self.context = Some(context);
        Ok(())
    }

    async fn start(&mut self, _cancel: CancellationToken) -> anyhow::Result<()> {
        if let Some(context) = &self.context {
            context.logger().info("dummy plugin started");
        }
        Ok(())
    }

    async fn stop(&mut self, _cancel: CancellationToken) -> anyhow::Result<()> {
        let Some(context) = self.context.take() else {
            return Ok(());
        };

        if let Some(subscription) = self.subscription.take() {
            context.events().unsubscribe(subscription);
        }
        if let Some(greeter) = self.greeter.take() {
            let greeter: Arc<dyn Greeter> = greeter;
            context.registry().unregister::<dyn Greeter>(&greeter);
        }

        context.logger().info("dummy plugin stopped");
        Ok(())
    }
}

declare_plugin!("plugin_dummy::DummyPlugin", DummyPlugin::new);

#[cfg(test)]
mod tests {
    use super::*;
    use gloamhall_plugin_api::{EventBus, HostConfig, PluginHost, SelectionMode, ServiceRegistry};

    struct NoopHost;

    #[async_trait]
    impl PluginHost for NoopHost {
        async fn restart_plugin(&self, _id: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn test_context(registry: Arc<ServiceRegistry>, events: Arc<EventBus>) -> PluginContext {
        PluginContext::new(
            "dummy",
            Arc::new(HostConfig::default()),
            registry,
            events,
            Arc::new(NoopHost),
        )
    }

    #[tokio::test]
    async fn test_lifecycle_registers_and_cleans_up() {
        let registry = Arc::new(ServiceRegistry::new());
        let events = Arc::new(EventBus::new());
        let mut plugin = DummyPlugin::new();
        let cancel = CancellationToken::new();

        plugin
            .initialize(test_context(registry.clone(), events.clone()), cancel.clone())
            .await
            .unwrap();
        plugin.start(cancel.clone()).await.unwrap();

        let greeter = registry.get::<dyn Greeter>(SelectionMode::One).unwrap();
        assert_eq!(greeter.greet("tester"), "the dummy plugin greets tester");
        assert_eq!(events.subscriber_count::<TurnEnded>(), 1);

        events
            .publish(TurnEnded { turn: 3 }, &cancel)
            .await
            .unwrap();

        plugin.stop(cancel).await.unwrap();
        assert!(!registry.is_registered::<dyn Greeter>());
        assert_eq!(events.subscriber_count::<TurnEnded>(), 0);
    }
}
