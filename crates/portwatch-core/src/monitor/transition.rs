use serde::{Deserialize, Serialize};

use super::event::EventKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointState {
    Up,
    Down,
}

impl EndpointState {
    pub fn from_down(down: bool) -> Self {
        if down {
            Self::Down
        } else {
            Self::Up
        }
    }

    pub fn is_down(self) -> bool {
        self == Self::Down
    }
}

impl std::fmt::Display for EndpointState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
        }
    }
}

/// Result of evaluating one probe against the stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub state: EndpointState,
    /// Set only when the state changed.
    pub event: Option<EventKind>,
}

/// Up/down state machine. Pure: depends only on the stored flag and the
/// fresh probe result.
pub fn transition(prev_down: bool, alive: bool) -> Transition {
    match (prev_down, alive) {
        (true, true) => Transition {
            state: EndpointState::Up,
            event: Some(EventKind::Up),
        },
        (false, true) => Transition {
            state: EndpointState::Up,
            event: None,
        },
        (false, false) => Transition {
            state: EndpointState::Down,
            event: Some(EventKind::Down),
        },
        (true, false) => Transition {
            state: EndpointState::Down,
            event: None,
        },
    }
}
