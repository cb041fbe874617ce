//! Durable registry of monitored endpoints.
//!
//! [`EndpointStore`] is the persistence seam (SQLite on disk, or an in-memory
//! map for tests). [`Registry`] sits on top of it and owns the one piece of
//! behaviour that is more than storage: seeding the initial `down` flag of a
//! new endpoint with a synchronous probe.

mod memory;
mod schema;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::probe::Probe;

pub const DEFAULT_PORT: u16 = 80;

/// A monitored `host:port` pair. `display_name` is the identity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub display_name: String,
    pub hostname: String,
    pub port: u16,
    pub down: bool,
    pub downtime: u64,
}

impl Endpoint {
    pub fn new(display_name: impl Into<String>, hostname: impl Into<String>, port: u16) -> Self {
        Self {
            display_name: display_name.into(),
            hostname: hostname.into(),
            port,
            down: false,
            downtime: 0,
        }
    }

    pub fn with_down(mut self, down: bool) -> Self {
        self.down = down;
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Endpoint '{0}' already exists")]
    Duplicate(String),
    #[error("Endpoint '{0}' not found")]
    NotFound(String),
    #[error("Invalid endpoint: {0}")]
    Invalid(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl RegistryError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

/// Storage backend for endpoints.
///
/// `insert` must detect a duplicate `display_name` atomically with the insert
/// itself. `set_down`, `increment_downtime` and `remove` report whether a
/// record matched; a missing record is not an error at this layer.
#[async_trait]
pub trait EndpointStore: Send + Sync {
    async fn insert(&self, endpoint: Endpoint) -> Result<(), RegistryError>;
    async fn list_all(&self) -> Result<Vec<Endpoint>, RegistryError>;
    async fn find_by_name(&self, name: &str) -> Result<Option<Endpoint>, RegistryError>;
    async fn set_down(&self, name: &str, down: bool) -> Result<bool, RegistryError>;
    async fn increment_downtime(&self, name: &str) -> Result<bool, RegistryError>;
    async fn remove(&self, name: &str) -> Result<bool, RegistryError>;
}

pub struct Registry {
    store: Arc<dyn EndpointStore>,
    probe: Arc<dyn Probe>,
    probe_timeout: Duration,
}

impl Registry {
    pub fn new(store: Arc<dyn EndpointStore>, probe: Arc<dyn Probe>, probe_timeout: Duration) -> Self {
        Self {
            store,
            probe,
            probe_timeout,
        }
    }

    /// Register a new endpoint.
    ///
    /// One probe runs before the insert to seed `down`. A duplicate name is
    /// reported by the store's uniqueness check, so nothing is written.
    pub async fn add(
        &self,
        display_name: &str,
        hostname: &str,
        port: Option<u16>,
    ) -> Result<Endpoint, RegistryError> {
        let display_name = display_name.trim();
        let hostname = hostname.trim();
        if display_name.is_empty() {
            return Err(RegistryError::Invalid("display_name must not be empty".into()));
        }
        if hostname.is_empty() {
            return Err(RegistryError::Invalid("hostname must not be empty".into()));
        }
        let port = port.unwrap_or(DEFAULT_PORT);
        if port == 0 {
            return Err(RegistryError::Invalid("port must be between 1 and 65535".into()));
        }

        let reachable = self
            .probe
            .is_reachable(hostname, port, self.probe_timeout)
            .await;
        let endpoint = Endpoint::new(display_name, hostname, port).with_down(!reachable);

        self.store.insert(endpoint.clone()).await?;
        info!(
            endpoint = %endpoint.display_name,
            address = %endpoint.address(),
            down = endpoint.down,
            "Endpoint registered"
        );
        Ok(endpoint)
    }

    pub async fn list_all(&self) -> Result<Vec<Endpoint>, RegistryError> {
        self.store.list_all().await
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Endpoint, RegistryError> {
        self.store
            .find_by_name(name)
            .await?
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Update the `down` flag. Unknown names are ignored.
    pub async fn set_down(&self, name: &str, down: bool) -> Result<(), RegistryError> {
        if !self.store.set_down(name, down).await? {
            debug!(endpoint = name, "set_down on missing endpoint ignored");
        }
        Ok(())
    }

    pub async fn increment_downtime(&self, name: &str) -> Result<(), RegistryError> {
        if !self.store.increment_downtime(name).await? {
            debug!(endpoint = name, "increment_downtime on missing endpoint ignored");
        }
        Ok(())
    }

    pub async fn remove(&self, name: &str) -> Result<(), RegistryError> {
        if self.store.remove(name).await? {
            info!(endpoint = name, "Endpoint removed");
            Ok(())
        } else {
            Err(RegistryError::NotFound(name.to_string()))
        }
    }
}
