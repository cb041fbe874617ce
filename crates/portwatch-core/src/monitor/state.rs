use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::TransitionEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    Idle,
    Active,
    Stopping,
    Stopped,
}

impl MonitorState {
    pub fn can_transition_to(self, target: MonitorState) -> bool {
        matches!(
            (self, target),
            (MonitorState::Idle, MonitorState::Active)
                | (MonitorState::Active, MonitorState::Stopping)
                | (MonitorState::Stopping, MonitorState::Stopped)
                | (MonitorState::Stopped, MonitorState::Active)
        )
    }
}

impl std::fmt::Display for MonitorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Active => write!(f, "active"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Summary of one polling tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickReport {
    pub started_at: DateTime<Utc>,
    /// Endpoints probed and evaluated.
    pub checked: usize,
    pub reachable: usize,
    pub unreachable: usize,
    /// Endpoints skipped because their record could not be read or written.
    pub skipped: usize,
    pub events: Vec<TransitionEvent>,
}

impl TickReport {
    pub fn empty(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            checked: 0,
            reachable: 0,
            unreachable: 0,
            skipped: 0,
            events: Vec::new(),
        }
    }
}
