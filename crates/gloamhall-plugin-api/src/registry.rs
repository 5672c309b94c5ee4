//! Priority-ranked service registry.
//!
//! Plugins publish capability implementations here and discover each other's
//! without holding direct references. Entries are keyed by the capability
//! interface's fully-qualified type name, never `TypeId` (see the crate docs
//! on cross-boundary identity), and kept sorted by descending priority.
//!
//! Registration is expected to be rare relative to lookup, so a single
//! exclusive lock guards each registry instance; callers never need their
//! own synchronization.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

/// Errors surfaced directly to registry callers.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// No implementation is registered for the requested capability.
    #[error("no service registered for '{0}'")]
    NoServiceRegistered(&'static str),

    /// `SelectionMode::One` was used while several implementations exist.
    #[error("ambiguous service for '{interface}': {count} implementations registered")]
    AmbiguousService {
        interface: &'static str,
        count: usize,
    },

    /// `SelectionMode::All` was passed to the single-result lookup.
    #[error("selection mode 'All' is invalid for a single-result lookup; use get_all")]
    InvalidSelectionMode,
}

/// Policy for resolving a single implementation of a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    /// Exactly one implementation must be registered.
    One,
    /// The highest-priority implementation wins.
    HighestPriority,
    /// All implementations; only valid with [`ServiceRegistry::get_all`].
    All,
}

/// Metadata attached to a registration.
#[derive(Debug, Clone, Default)]
pub struct ServiceMetadata {
    /// Higher values are preferred. Defaults to 0.
    pub priority: i32,
    /// Display name of the implementation.
    pub name: Option<String>,
    /// Implementation version.
    pub version: Option<String>,
}

impl ServiceMetadata {
    /// Metadata with only a priority set.
    pub fn with_priority(priority: i32) -> Self {
        Self {
            priority,
            ..Self::default()
        }
    }
}

/// One registered implementation, type-erased.
///
/// `service` holds an `Arc<T>` boxed as `Any`; the registry keeps a
/// reference to the implementation, not its lifetime.
struct Registration {
    service: Box<dyn Any + Send + Sync>,
    metadata: ServiceMetadata,
}

/// Concurrent, priority-ordered map from capability interface to
/// implementations.
#[derive(Default)]
pub struct ServiceRegistry {
    entries: Mutex<HashMap<&'static str, Vec<Registration>>>,
}

impl ServiceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<&'static str, Vec<Registration>>> {
        // A poisoned lock only means another caller panicked mid-operation;
        // the map itself is still structurally sound.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register an implementation of capability `T`.
    ///
    /// Multiple implementations of the same capability may coexist; the list
    /// is re-sorted by descending priority on every insert.
    pub fn register<T>(&self, implementation: Arc<T>, metadata: ServiceMetadata)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let key = std::any::type_name::<T>();
        debug!(
            interface = key,
            priority = metadata.priority,
            "registering service"
        );

        let mut entries = self.lock();
        let list = entries.entry(key).or_default();
        list.push(Registration {
            service: Box::new(implementation),
            metadata,
        });
        list.sort_by(|a, b| b.metadata.priority.cmp(&a.metadata.priority));
    }

    /// Resolve a single implementation of `T` according to `mode`.
    pub fn get<T>(&self, mode: SelectionMode) -> Result<Arc<T>, RegistryError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let key = std::any::type_name::<T>();
        let entries = self.lock();
        let list = entries
            .get(key)
            .filter(|l| !l.is_empty())
            .ok_or(RegistryError::NoServiceRegistered(key))?;

        match mode {
            SelectionMode::HighestPriority => Ok(clone_service::<T>(&list[0])),
            SelectionMode::One => {
                if list.len() > 1 {
                    return Err(RegistryError::AmbiguousService {
                        interface: key,
                        count: list.len(),
                    });
                }
                Ok(clone_service::<T>(&list[0]))
            }
            SelectionMode::All => Err(RegistryError::InvalidSelectionMode),
        }
    }

    /// All implementations of `T` in descending priority order.
    pub fn get_all<T>(&self) -> Vec<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let entries = self.lock();
        entries
            .get(std::any::type_name::<T>())
            .map(|list| list.iter().map(clone_service::<T>).collect())
            .unwrap_or_default()
    }

    /// Whether at least one implementation of `T` exists.
    pub fn is_registered<T>(&self) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let entries = self.lock();
        entries
            .get(std::any::type_name::<T>())
            .map_or(false, |list| !list.is_empty())
    }

    /// Remove a registration by reference identity.
    ///
    /// Returns whether a matching registration was removed. The capability
    /// entry disappears entirely once its list is emptied.
    pub fn unregister<T>(&self, implementation: &Arc<T>) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let key = std::any::type_name::<T>();
        let mut entries = self.lock();
        let Some(list) = entries.get_mut(key) else {
            return false;
        };

        let before = list.len();
        list.retain(|reg| {
            reg.service
                .downcast_ref::<Arc<T>>()
                .map_or(true, |svc| !Arc::ptr_eq(svc, implementation))
        });
        let removed = list.len() < before;

        if list.is_empty() {
            entries.remove(key);
        }
        if removed {
            debug!(interface = key, "unregistered service");
        }
        removed
    }

    /// Number of implementations registered for `T`.
    pub fn count<T>(&self) -> usize
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let entries = self.lock();
        entries
            .get(std::any::type_name::<T>())
            .map_or(0, Vec::len)
    }
}

fn clone_service<T>(registration: &Registration) -> Arc<T>
where
    T: ?Sized + Send + Sync + 'static,
{
    registration
        .service
        .downcast_ref::<Arc<T>>()
        .cloned()
        // The key is the type name of T, and every insert under that key
        // stores an Arc<T>, so the downcast cannot fail.
        .unwrap_or_else(|| unreachable!("registry entry stored under mismatched key"))
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Renderer: std::fmt::Debug + Send + Sync {
        fn id(&self) -> &str;
    }

    #[derive(Debug)]
    struct NamedRenderer(&'static str);

    impl Renderer for NamedRenderer {
        fn id(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn test_register_and_get_highest_priority() {
        let registry = ServiceRegistry::new();
        registry.register::<dyn Renderer>(
            Arc::new(NamedRenderer("low")),
            ServiceMetadata::with_priority(1),
        );
        registry.register::<dyn Renderer>(
            Arc::new(NamedRenderer("high")),
            ServiceMetadata::with_priority(10),
        );

        let best = registry
            .get::<dyn Renderer>(SelectionMode::HighestPriority)
            .unwrap();
        assert_eq!(best.id(), "high");
    }

    #[test]
    fn test_get_one() {
        let registry = ServiceRegistry::new();

        let err = registry.get::<dyn Renderer>(SelectionMode::One).unwrap_err();
        assert!(matches!(err, RegistryError::NoServiceRegistered(_)));

        let only = Arc::new(NamedRenderer("only"));
        registry.register::<dyn Renderer>(only, ServiceMetadata::default());
        let got = registry.get::<dyn Renderer>(SelectionMode::One).unwrap();
        assert_eq!(got.id(), "only");

        registry.register::<dyn Renderer>(
            Arc::new(NamedRenderer("second")),
            ServiceMetadata::default(),
        );
        let err = registry.get::<dyn Renderer>(SelectionMode::One).unwrap_err();
        assert!(matches!(err, RegistryError::AmbiguousService { count: 2, .. }));
    }

    #[test]
    fn test_get_with_all_mode_is_invalid() {
        let registry = ServiceRegistry::new();
        registry.register::<dyn Renderer>(
            Arc::new(NamedRenderer("x")),
            ServiceMetadata::default(),
        );

        let err = registry.get::<dyn Renderer>(SelectionMode::All).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidSelectionMode));
    }

    #[test]
    fn test_get_all_descending_priority() {
        let registry = ServiceRegistry::new();
        for (name, priority) in [("mid", 5), ("low", 1), ("high", 9)] {
            registry.register::<dyn Renderer>(
                Arc::new(NamedRenderer(name)),
                ServiceMetadata::with_priority(priority),
            );
        }

        let all = registry.get_all::<dyn Renderer>();
        let ids: Vec<&str> = all.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["high", "mid", "low"]);
    }

    #[test]
    fn test_unregister_by_identity() {
        let registry = ServiceRegistry::new();
        let first: Arc<dyn Renderer> = Arc::new(NamedRenderer("first"));
        let second: Arc<dyn Renderer> = Arc::new(NamedRenderer("second"));
        registry.register::<dyn Renderer>(first.clone(), ServiceMetadata::default());
        registry.register::<dyn Renderer>(second.clone(), ServiceMetadata::default());

        assert!(registry.unregister::<dyn Renderer>(&first));
        assert!(!registry.unregister::<dyn Renderer>(&first));

        let remaining = registry.get_all::<dyn Renderer>();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id(), "second");

        assert!(registry.unregister::<dyn Renderer>(&second));
        assert!(!registry.is_registered::<dyn Renderer>());
    }
}
