use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::registry::Endpoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Endpoint stopped accepting connections.
    Down,
    /// Endpoint recovered.
    Up,
}

impl EventKind {
    pub fn notification_type(self) -> &'static str {
        match self {
            Self::Down => "endpoint_down",
            Self::Up => "endpoint_up",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Down => write!(f, "DOWN"),
            Self::Up => write!(f, "UP"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub endpoint_name: String,
    pub hostname: String,
    pub port: u16,
    /// Cumulative number of ticks the endpoint was observed down.
    pub downtime: u64,
}

impl TransitionEvent {
    pub fn new(kind: EventKind, endpoint: &Endpoint, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp,
            kind,
            endpoint_name: endpoint.display_name.clone(),
            hostname: endpoint.hostname.clone(),
            port: endpoint.port,
            downtime: endpoint.downtime,
        }
    }

    pub fn with_downtime(mut self, downtime: u64) -> Self {
        self.downtime = downtime;
        self
    }
}

/// Fixed-capacity circular buffer for recent transitions. O(1) insert, evicts oldest when full.
#[derive(Debug, Clone)]
pub struct EventRing {
    buffer: VecDeque<TransitionEvent>,
    capacity: usize,
}

impl EventRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, event: TransitionEvent) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(event);
    }

    pub fn list(&self) -> Vec<TransitionEvent> {
        self.buffer.iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
