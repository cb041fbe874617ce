use std::sync::Arc;

use portwatch_core::{Monitor, Registry};

use crate::lookup::Lookup;

#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<Monitor>,
    pub lookup: Arc<Lookup>,
}

impl AppState {
    pub fn new(monitor: Arc<Monitor>) -> Self {
        let lookup = Lookup::new(monitor.config().probe_timeout);
        Self {
            monitor,
            lookup: Arc::new(lookup),
        }
    }

    pub fn with_lookup(mut self, lookup: Lookup) -> Self {
        self.lookup = Arc::new(lookup);
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        self.monitor.registry()
    }
}
