use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the polling loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Time between two polling ticks (default: 60s).
    pub check_duration: Duration,
    /// Upper bound for a single reachability probe (default: 5s).
    pub probe_timeout: Duration,
    /// Maximum number of probes in flight within one tick. `None` probes
    /// every endpoint at once.
    pub max_concurrent_probes: Option<usize>,
    /// Maximum number of transitions retained in memory (ring buffer capacity).
    pub event_limit: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_duration: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(5),
            max_concurrent_probes: None,
            event_limit: 100,
        }
    }
}

impl MonitorConfig {
    pub fn with_check_duration_secs(mut self, secs: u64) -> Self {
        self.check_duration = Duration::from_secs(secs.max(1));
        self
    }

    pub fn with_check_duration(mut self, duration: Duration) -> Self {
        self.check_duration = duration.max(Duration::from_millis(1));
        self
    }

    pub fn with_probe_timeout_ms(mut self, ms: u64) -> Self {
        self.probe_timeout = Duration::from_millis(ms.max(1));
        self
    }

    pub fn with_max_concurrent_probes(mut self, max: usize) -> Self {
        self.max_concurrent_probes = Some(max.max(1));
        self
    }

    pub fn with_event_limit(mut self, limit: usize) -> Self {
        self.event_limit = limit.max(1);
        self
    }
}
