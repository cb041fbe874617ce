use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

use super::Probe;

/// TCP-connect probe. Opens one socket per call and closes it immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProbe;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub reachable: bool,
    pub latency: Duration,
}

impl TcpProbe {
    pub fn new() -> Self {
        Self
    }

    /// Like [`Probe::is_reachable`] but also reports how long the attempt took.
    pub async fn measure(&self, host: &str, port: u16, timeout: Duration) -> ProbeOutcome {
        let start = Instant::now();
        let reachable = connect(host, port, timeout).await;
        ProbeOutcome {
            reachable,
            latency: start.elapsed(),
        }
    }
}

async fn connect(host: &str, port: u16, timeout: Duration) -> bool {
    // The timeout covers name resolution as well as the handshake.
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => {
            drop(stream);
            true
        }
        Ok(Err(e)) => {
            debug!(host, port, error = %e, "TCP connect failed");
            false
        }
        Err(_) => {
            debug!(host, port, timeout_ms = timeout.as_millis(), "TCP connect timed out");
            false
        }
    }
}

#[async_trait]
impl Probe for TcpProbe {
    async fn is_reachable(&self, host: &str, port: u16, timeout: Duration) -> bool {
        connect(host, port, timeout).await
    }
}
