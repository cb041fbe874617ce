pub mod clock;
pub mod engine;
pub mod event;
pub mod state;
pub mod transition;

pub use clock::{Clock, SystemClock};
pub use engine::Monitor;
pub use event::{EventKind, EventRing, TransitionEvent};
pub use state::{MonitorState, TickReport};
pub use transition::{transition, EndpointState, Transition};
