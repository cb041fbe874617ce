use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{Endpoint, EndpointStore, RegistryError};

/// Non-durable store keyed by display name.
#[derive(Debug, Default)]
pub struct MemoryStore {
    endpoints: DashMap<String, Endpoint>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EndpointStore for MemoryStore {
    async fn insert(&self, endpoint: Endpoint) -> Result<(), RegistryError> {
        match self.endpoints.entry(endpoint.display_name.clone()) {
            Entry::Occupied(_) => Err(RegistryError::Duplicate(endpoint.display_name)),
            Entry::Vacant(slot) => {
                slot.insert(endpoint);
                Ok(())
            }
        }
    }

    async fn list_all(&self) -> Result<Vec<Endpoint>, RegistryError> {
        Ok(self.endpoints.iter().map(|e| e.value().clone()).collect())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Endpoint>, RegistryError> {
        Ok(self.endpoints.get(name).map(|e| e.value().clone()))
    }

    async fn set_down(&self, name: &str, down: bool) -> Result<bool, RegistryError> {
        Ok(self
            .endpoints
            .get_mut(name)
            .map(|mut e| e.down = down)
            .is_some())
    }

    async fn increment_downtime(&self, name: &str) -> Result<bool, RegistryError> {
        Ok(self
            .endpoints
            .get_mut(name)
            .map(|mut e| e.downtime = e.downtime.saturating_add(1))
            .is_some())
    }

    async fn remove(&self, name: &str) -> Result<bool, RegistryError> {
        Ok(self.endpoints.remove(name).is_some())
    }
}
