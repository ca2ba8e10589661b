//! Per-scope service resolution.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::registry::{Instance, Provider, Registry, RegistryError, ServicePing};

/// A resolution scope over a [`Registry`].
///
/// Factory results are cached for the lifetime of the container, so a
/// request that asks for the same service twice gets the same instance.
#[derive(Clone)]
pub struct Container {
    registry: Registry,
    instances: Arc<Mutex<HashMap<TypeId, Instance>>>,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Container {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            instances: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The registry this container resolves from.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Resolve a service by type.
    pub async fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, RegistryError> {
        let instance = self.resolve(TypeId::of::<T>(), type_name::<T>()).await?;
        instance.downcast::<T>().map_err(|_| RegistryError::TypeMismatch {
            name: type_name::<T>().to_string(),
        })
    }

    /// Pings for every registered service that declared one.
    pub fn pings(&self) -> Vec<ServicePing> {
        self.registry
            .pinged()
            .into_iter()
            .filter_map(|registration| {
                let check = registration.ping?;
                Some(ServicePing::new(
                    registration.name,
                    registration.type_id,
                    check,
                    self.clone(),
                ))
            })
            .collect()
    }

    pub(crate) async fn resolve(&self, id: TypeId, name: &str) -> Result<Instance, RegistryError> {
        if let Some(hit) = self.cached(id) {
            return Ok(hit);
        }

        let registration = self
            .registry
            .lookup(id)
            .ok_or_else(|| RegistryError::ServiceNotFound {
                name: name.to_string(),
            })?;

        match registration.provider {
            Provider::Value(value) => Ok(value),
            Provider::Factory(factory) => {
                let created = factory(self.clone())
                    .await
                    .map_err(|source| RegistryError::Factory {
                        name: name.to_string(),
                        source,
                    })?;

                let mut instances = self.instances.lock().unwrap_or_else(PoisonError::into_inner);
                Ok(instances.entry(id).or_insert(created).clone())
            }
        }
    }

    fn cached(&self, id: TypeId) -> Option<Instance> {
        self.instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BoxError;

    #[derive(Debug)]
    struct Pool(u32);
    struct Repository(Arc<Pool>);

    #[tokio::test]
    async fn test_factory_resolves_dependencies() {
        let registry = Registry::new();
        registry.register_value(Pool(7));
        registry.register_factory(|c: Container| async move {
            let pool = c.get::<Pool>().await?;
            Ok::<_, BoxError>(Repository(pool))
        });

        let repo = registry.container().get::<Repository>().await.unwrap();
        assert_eq!(repo.0 .0, 7);
    }

    #[tokio::test]
    async fn test_factory_error_is_wrapped() {
        let registry = Registry::new();
        registry.register_factory(|_c: Container| async move {
            Err::<Pool, BoxError>("connection refused".into())
        });

        let err = registry.container().get::<Pool>().await.unwrap_err();
        assert!(matches!(err, RegistryError::Factory { .. }));
        assert!(err.to_string().contains("connection refused"));
    }
}
