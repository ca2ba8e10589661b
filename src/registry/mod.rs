//! Service registry subsystem.
//!
//! # Data Flow
//! ```text
//! Extension setup:
//!     → registry.register_value / register_factory (+ optional ping)
//!     → registry.on_close (cleanup hooks)
//!
//! Request handling:
//!     → Container (one per request, caches factory results)
//!     → container.get::<T>() → overrides → registrations
//!
//! Health checks:
//!     → container.pings() → ServicePing::ping()
//!
//! Lifespan exit:
//!     → registry.close() runs hooks in reverse order
//! ```
//!
//! # Design Decisions
//! - Keyed by `TypeId`; one registration per type
//! - Overrides live in a separate map so tests can replace services
//!   before startup and keep them through setup
//! - Map guards are never held across an await

pub mod container;
pub mod ping;

use std::any::{Any, TypeId};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use thiserror::Error;

use crate::BoxError;

pub use container::Container;
pub use ping::ServicePing;

pub(crate) type Instance = Arc<dyn Any + Send + Sync>;
pub(crate) type FactoryFn = Arc<dyn Fn(Container) -> BoxFuture<'static, Result<Instance, BoxError>> + Send + Sync>;
pub(crate) type PingFn = Arc<dyn Fn(Instance) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;
type CloseFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), BoxError>> + Send>;

/// Errors returned when resolving services.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Service not registered: {name}")]
    ServiceNotFound { name: String },

    #[error("Factory for {name} failed: {source}")]
    Factory {
        name: String,
        #[source]
        source: BoxError,
    },

    #[error("Registered value for {name} has an unexpected type")]
    TypeMismatch { name: String },
}

#[derive(Clone)]
pub(crate) enum Provider {
    Value(Instance),
    Factory(FactoryFn),
}

#[derive(Clone)]
pub(crate) struct Registration {
    pub(crate) type_id: TypeId,
    pub(crate) name: &'static str,
    pub(crate) provider: Provider,
    pub(crate) ping: Option<PingFn>,
    order: u64,
}

#[derive(Default)]
struct RegistryInner {
    services: DashMap<TypeId, Registration>,
    overrides: DashMap<TypeId, Registration>,
    close_hooks: Mutex<Vec<(String, CloseFn)>>,
    next_order: AtomicU64,
}

/// Shared store of live services, keyed by type.
///
/// Cloning is cheap; all clones see the same registrations.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("services", &self.inner.services.len())
            .field("overrides", &self.inner.overrides.len())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a ready-made value shared by every container.
    pub fn register_value<T: Send + Sync + 'static>(&self, value: T) {
        let registration = self.registration::<T>(Provider::Value(Arc::new(value)), None);
        self.insert(registration);
    }

    /// Register a value along with a health ping.
    pub fn register_value_with_ping<T, P, Fut>(&self, value: T, ping: P)
    where
        T: Send + Sync + 'static,
        P: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let registration = self.registration::<T>(Provider::Value(Arc::new(value)), Some(erase_ping(ping)));
        self.insert(registration);
    }

    /// Register an async factory; each container calls it at most once.
    pub fn register_factory<T, F, Fut>(&self, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(Container) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        let registration = self.registration::<T>(Provider::Factory(erase_factory(factory)), None);
        self.insert(registration);
    }

    /// Register an async factory along with a health ping.
    pub fn register_factory_with_ping<T, F, Fut, P, PFut>(&self, factory: F, ping: P)
    where
        T: Send + Sync + 'static,
        F: Fn(Container) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
        P: Fn(Arc<T>) -> PFut + Send + Sync + 'static,
        PFut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let registration = self.registration::<T>(
            Provider::Factory(erase_factory(factory)),
            Some(erase_ping(ping)),
        );
        self.insert(registration);
    }

    /// Replace a service for tests; wins over any later `register_*` call.
    pub fn override_value<T: Send + Sync + 'static>(&self, value: T) {
        let registration = self.registration::<T>(Provider::Value(Arc::new(value)), None);
        tracing::debug!(service = registration.name, "Service override installed");
        self.inner.overrides.insert(registration.type_id, registration);
    }

    /// Drop every override.
    pub fn clear_overrides(&self) {
        self.inner.overrides.clear();
    }

    /// Whether a registration or override exists for `T`.
    pub fn contains<T: 'static>(&self) -> bool {
        let id = TypeId::of::<T>();
        self.inner.overrides.contains_key(&id) || self.inner.services.contains_key(&id)
    }

    /// Number of registered services (overrides not counted).
    pub fn len(&self) -> usize {
        self.inner.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.services.is_empty()
    }

    /// Open a new resolution scope.
    pub fn container(&self) -> Container {
        Container::new(self.clone())
    }

    /// Register a hook to run when the registry closes.
    pub fn on_close<F, Fut>(&self, name: impl Into<String>, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let hook: CloseFn = Box::new(move || hook().boxed());
        self.inner
            .close_hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name.into(), hook));
    }

    /// Run close hooks in reverse registration order.
    ///
    /// Every hook runs even if an earlier one fails. Returns the failures.
    pub async fn close(&self) -> Vec<(String, BoxError)> {
        let hooks = std::mem::take(
            &mut *self
                .inner
                .close_hooks
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );

        let mut failures = Vec::new();
        for (name, hook) in hooks.into_iter().rev() {
            match hook().await {
                Ok(()) => tracing::debug!(hook = %name, "Registry close hook finished"),
                Err(e) => {
                    tracing::warn!(hook = %name, error = %e, "Registry close hook failed");
                    failures.push((name, e));
                }
            }
        }
        failures
    }

    /// Resolve the active registration for a type, override first.
    pub(crate) fn lookup(&self, id: TypeId) -> Option<Registration> {
        if let Some(found) = self.inner.overrides.get(&id) {
            return Some(found.value().clone());
        }
        self.inner.services.get(&id).map(|r| r.value().clone())
    }

    /// Registrations that carry a ping, in registration order.
    pub(crate) fn pinged(&self) -> Vec<Registration> {
        let mut found: Vec<Registration> = self
            .inner
            .services
            .iter()
            .filter(|r| r.ping.is_some())
            .map(|r| r.value().clone())
            .collect();
        found.sort_by_key(|r| r.order);
        found
    }

    fn registration<T: 'static>(&self, provider: Provider, ping: Option<PingFn>) -> Registration {
        Registration {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            provider,
            ping,
            order: self.inner.next_order.fetch_add(1, Ordering::Relaxed),
        }
    }

    fn insert(&self, registration: Registration) {
        tracing::debug!(service = registration.name, "Service registered");
        self.inner.services.insert(registration.type_id, registration);
    }
}

fn erase_factory<T, F, Fut>(factory: F) -> FactoryFn
where
    T: Send + Sync + 'static,
    F: Fn(Container) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
{
    Arc::new(move |container: Container| {
        let fut = factory(container);
        async move { fut.await.map(|value| Arc::new(value) as Instance) }.boxed()
    })
}

fn erase_ping<T, P, Fut>(ping: P) -> PingFn
where
    T: Send + Sync + 'static,
    P: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    Arc::new(move |instance: Instance| match instance.downcast::<T>() {
        Ok(service) => ping(service).boxed(),
        Err(_) => {
            let err: BoxError = Box::new(RegistryError::TypeMismatch {
                name: std::any::type_name::<T>().to_string(),
            });
            async move { Err(err) }.boxed()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, PartialEq)]
    struct Database(&'static str);

    #[tokio::test]
    async fn test_value_roundtrip() {
        let registry = Registry::new();
        registry.register_value(Database("primary"));

        let db = registry.container().get::<Database>().await.unwrap();
        assert_eq!(*db, Database("primary"));
        assert!(registry.contains::<Database>());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_service() {
        let registry = Registry::new();
        let err = registry.container().get::<Database>().await.unwrap_err();
        assert!(matches!(err, RegistryError::ServiceNotFound { ref name } if name.ends_with("Database")));
    }

    #[tokio::test]
    async fn test_override_survives_later_registration() {
        let registry = Registry::new();
        registry.override_value(Database("mock"));
        registry.register_value(Database("primary"));

        let db = registry.container().get::<Database>().await.unwrap();
        assert_eq!(*db, Database("mock"));

        registry.clear_overrides();
        let db = registry.container().get::<Database>().await.unwrap();
        assert_eq!(*db, Database("primary"));
    }

    #[tokio::test]
    async fn test_close_hooks_run_in_reverse_and_continue_after_failure() {
        let registry = Registry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let order = order.clone();
            registry.on_close(name, move || async move {
                order.lock().unwrap().push(name);
                if name == "second" {
                    Err::<(), BoxError>("boom".into())
                } else {
                    Ok(())
                }
            });
        }

        let failures = registry.close().await;
        assert_eq!(*order.lock().unwrap(), vec!["third", "second", "first"]);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "second");

        // Hooks are consumed.
        assert!(registry.close().await.is_empty());
    }

    #[tokio::test]
    async fn test_factory_called_once_per_container() {
        let registry = Registry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        registry.register_factory(move |_c| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(Database("pooled"))
            }
        });

        let container = registry.container();
        container.get::<Database>().await.unwrap();
        container.get::<Database>().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        registry.container().get::<Database>().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
