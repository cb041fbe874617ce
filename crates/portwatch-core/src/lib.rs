#![forbid(unsafe_code)]

pub mod config;
pub mod monitor;
pub mod notify;
pub mod probe;
pub mod registry;
pub mod webhook;

pub use config::MonitorConfig;
pub use monitor::{
    transition, Clock, EndpointState, EventKind, EventRing, Monitor, MonitorState, SystemClock,
    TickReport, Transition, TransitionEvent,
};
pub use notify::{
    notification_channel, ChannelNotifier, NotificationMessage, Notifier, NotifyError,
};
pub use probe::{Probe, ProbeOutcome, TcpProbe};
pub use registry::{
    Endpoint, EndpointStore, MemoryStore, Registry, RegistryError, SqliteStore, DEFAULT_PORT,
};
pub use webhook::{
    WebhookConfig, WebhookDispatcher, WebhookFormat, WebhookPayload, MAX_WEBHOOK_RETRIES,
};
