//! In-memory directory of registered services

use crate::{
    error::{Error, Result},
    models::ServiceRecord,
};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;
use uuid::Uuid;

/// Lock-guarded map from service name to its record.
///
/// Every operation holds the lock for its whole duration and releases it
/// before returning. Records are never mutated after insertion.
#[derive(Debug, Default)]
pub struct Directory {
    services: RwLock<HashMap<String, ServiceRecord>>,
}

impl Directory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new service and return its freshly generated token
    pub fn insert(&self, name: &str, callback_url: &str) -> Result<String> {
        let mut services = self.write();
        if services.contains_key(name) {
            return Err(Error::AlreadyExists(name.to_string()));
        }

        let token = Uuid::new_v4().to_string();
        services.insert(
            name.to_string(),
            ServiceRecord {
                name: name.to_string(),
                token: token.clone(),
                callback_url: callback_url.to_string(),
            },
        );
        info!("Service {} was registered", name);

        Ok(token)
    }

    /// Get a service by name
    pub fn get(&self, name: &str) -> Result<ServiceRecord> {
        self.read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    /// Snapshot of all services, in no particular order
    pub fn get_all(&self) -> Vec<ServiceRecord> {
        self.read().values().cloned().collect()
    }

    /// Remove a service
    pub fn delete(&self, name: &str) -> Result<()> {
        match self.write().remove(name) {
            Some(_) => {
                info!("Service {} was removed", name);
                Ok(())
            }
            None => Err(Error::NotFound(name.to_string())),
        }
    }

    /// Number of registered services
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no service is registered
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // A panicking writer cannot leave a half-inserted record behind, so a
    // poisoned lock still guards a consistent map.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ServiceRecord>> {
        self.services.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ServiceRecord>> {
        self.services.write().unwrap_or_else(PoisonError::into_inner)
    }
}
