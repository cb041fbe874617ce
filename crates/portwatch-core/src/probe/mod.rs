mod tcp;

pub use tcp::{ProbeOutcome, TcpProbe};

use std::time::Duration;

use async_trait::async_trait;

/// Trait for checking whether a `host:port` accepts connections.
///
/// Refusal, DNS failure and timeout all collapse to `false`; implementations
/// never return errors to the caller. The trait is object-safe and
/// Send + Sync for use across async tasks.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn is_reachable(&self, host: &str, port: u16, timeout: Duration) -> bool;
}
