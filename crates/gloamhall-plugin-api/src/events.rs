//! Typed publish/subscribe event channel.
//!
//! Plugins communicate through events without referencing each other.
//! Handlers for an event type run sequentially in subscription order;
//! dispatch happens outside the subscriber lock, so a slow handler never
//! stalls new subscriptions or publishes of other event types.
//!
//! Publish is run-all-then-report: a failing handler does not prevent later
//! handlers from running, and the publish call fails afterwards with an
//! aggregate error carrying every handler failure.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type DynHandler =
    Arc<dyn Fn(Arc<dyn Any + Send + Sync>) -> BoxFuture<anyhow::Result<()>> + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`], used to remove the
/// subscription again. Subscriptions are not tied to a plugin's lifetime;
/// plugins must unsubscribe in `stop` or the list outlives them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscription-{}", self.0)
    }
}

/// Error returned by [`EventBus::publish`].
#[derive(Debug)]
pub struct EventBusError {
    /// Fully-qualified name of the published event type.
    pub event_type: &'static str,
    /// Every handler failure from this publish, in dispatch order.
    pub failures: Vec<(SubscriptionId, anyhow::Error)>,
}

impl fmt::Display for EventBusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} handler(s) failed for event '{}': ",
            self.failures.len(),
            self.event_type
        )?;
        for (i, (id, err)) in self.failures.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{id}: {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for EventBusError {}

struct Subscriber {
    id: SubscriptionId,
    handler: DynHandler,
}

/// Process-wide event channel, keyed by event type name.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<HashMap<&'static str, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Create an empty event bus.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<&'static str, Vec<Subscriber>>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Subscribe an asynchronous handler for events of type `E`.
    ///
    /// Handlers registered while a publish of `E` is in flight do not
    /// receive that event.
    pub fn subscribe<E, F, Fut>(&self, handler: F) -> SubscriptionId
    where
        E: Any + Send + Sync + 'static,
        F: Fn(Arc<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let key = std::any::type_name::<E>();
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));

        let erased: DynHandler = Arc::new(move |event: Arc<dyn Any + Send + Sync>| {
            match event.downcast::<E>() {
                Ok(event) => Box::pin(handler(event)),
                // Keys are type names, so a mismatch means two distinct
                // types share a name; refuse rather than drop silently.
                Err(_) => Box::pin(async {
                    Err(anyhow::anyhow!("event payload did not match subscribed type"))
                }),
            }
        });

        debug!(event_type = key, subscription = %id, "subscribing handler");
        self.lock()
            .entry(key)
            .or_default()
            .push(Subscriber { id, handler: erased });
        id
    }

    /// Remove a subscription. Returns whether it was present.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.lock();
        for (key, list) in subscribers.iter_mut() {
            let before = list.len();
            list.retain(|s| s.id != id);
            if list.len() < before {
                debug!(event_type = key, subscription = %id, "unsubscribed handler");
                return true;
            }
        }
        false
    }

    /// Publish an event to every currently-subscribed handler of `E`.
    ///
    /// The subscriber list is snapshotted under the lock; handlers are then
    /// awaited one at a time in subscription order. Cancellation stops
    /// dispatch before the next unrun handler. If any handler failed, the
    /// call returns an [`EventBusError`] enumerating every failure.
    pub async fn publish<E>(
        &self,
        event: E,
        cancel: &CancellationToken,
    ) -> Result<(), EventBusError>
    where
        E: Any + Send + Sync + 'static,
    {
        let key = std::any::type_name::<E>();
        let snapshot: Vec<(SubscriptionId, DynHandler)> = {
            let subscribers = self.lock();
            subscribers
                .get(key)
                .map(|list| {
                    list.iter()
                        .map(|s| (s.id, Arc::clone(&s.handler)))
                        .collect()
                })
                .unwrap_or_default()
        };

        let event: Arc<dyn Any + Send + Sync> = Arc::new(event);
        let mut failures = Vec::new();

        for (id, handler) in snapshot {
            if cancel.is_cancelled() {
                debug!(event_type = key, "publish cancelled");
                break;
            }
            if let Err(err) = (handler.as_ref())(Arc::clone(&event)).await {
                warn!(event_type = key, subscription = %id, error = %err, "event handler failed");
                failures.push((id, err));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(EventBusError {
                event_type: key,
                failures,
            })
        }
    }

    /// Number of live subscriptions for event type `E`.
    pub fn subscriber_count<E>(&self) -> usize
    where
        E: Any + Send + Sync + 'static,
    {
        self.lock()
            .get(std::any::type_name::<E>())
            .map_or(0, Vec::len)
    }
}
