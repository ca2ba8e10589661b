//! Health pings for registered services.

use std::any::TypeId;

use crate::registry::{Container, PingFn};
use crate::BoxError;

/// A health check bound to one registered service.
pub struct ServicePing {
    name: &'static str,
    type_id: TypeId,
    check: PingFn,
    container: Container,
}

impl std::fmt::Debug for ServicePing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServicePing").field("name", &self.name()).finish()
    }
}

impl ServicePing {
    pub(crate) fn new(name: &'static str, type_id: TypeId, check: PingFn, container: Container) -> Self {
        Self {
            name,
            type_id,
            check,
            container,
        }
    }

    /// Short type name of the service (module path stripped).
    pub fn name(&self) -> &str {
        short_type_name(self.name)
    }

    /// Fully qualified type name of the service.
    pub fn type_name(&self) -> &'static str {
        self.name
    }

    /// Resolve the service and run its ping.
    pub async fn ping(&self) -> Result<(), BoxError> {
        let instance = self.container.resolve(self.type_id, self.name).await?;
        (self.check)(instance).await
    }
}

/// `app::db::Database<app::Pg>` → `Database<app::Pg>`.
fn short_type_name(full: &str) -> &str {
    let head_end = full.find('<').unwrap_or(full.len());
    let start = full[..head_end].rfind("::").map(|i| i + 2).unwrap_or(0);
    &full[start..]
}
