use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::{Notify, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::MonitorConfig;
use crate::monitor::clock::{Clock, SystemClock};
use crate::monitor::event::{EventRing, TransitionEvent};
use crate::monitor::state::{MonitorState, TickReport};
use crate::monitor::transition::transition;
use crate::notify::Notifier;
use crate::probe::Probe;
use crate::registry::{Endpoint, Registry, RegistryError};

/// Periodic reachability monitor over every endpoint in a [`Registry`].
pub struct Monitor {
    id: Uuid,
    config: MonitorConfig,
    state: Arc<RwLock<MonitorState>>,
    stop_signal: Arc<Notify>,
    created_at: DateTime<Utc>,
    runner: TickRunner,
}

/// Everything a tick needs, cheap to clone into the background task.
#[derive(Clone)]
struct TickRunner {
    config: MonitorConfig,
    registry: Arc<Registry>,
    probe: Arc<dyn Probe>,
    notifier: Option<Arc<dyn Notifier>>,
    clock: Arc<dyn Clock>,
    last_checked: Arc<RwLock<Option<DateTime<Utc>>>>,
    tick_count: Arc<AtomicU64>,
    events: Arc<RwLock<EventRing>>,
}

enum EndpointOutcome {
    Checked {
        alive: bool,
        event: Option<TransitionEvent>,
    },
    Skipped,
}

impl Monitor {
    pub fn new(
        registry: Arc<Registry>,
        probe: Arc<dyn Probe>,
        config: MonitorConfig,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        let runner = TickRunner {
            config: config.clone(),
            registry,
            probe,
            notifier,
            clock: Arc::new(SystemClock),
            last_checked: Arc::new(RwLock::new(None)),
            tick_count: Arc::new(AtomicU64::new(0)),
            events: Arc::new(RwLock::new(EventRing::new(config.event_limit))),
        };
        Self {
            id: Uuid::new_v4(),
            config,
            state: Arc::new(RwLock::new(MonitorState::Idle)),
            stop_signal: Arc::new(Notify::new()),
            created_at: Utc::now(),
            runner,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.created_at = clock.now();
        self.runner.clock = clock;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.runner.registry
    }

    pub async fn state(&self) -> MonitorState {
        *self.state.read().await
    }

    pub async fn last_checked(&self) -> Option<DateTime<Utc>> {
        *self.runner.last_checked.read().await
    }

    pub fn tick_count(&self) -> u64 {
        self.runner.tick_count.load(Ordering::Relaxed)
    }

    /// Recent transitions, newest first.
    pub async fn recent_events(&self) -> Vec<TransitionEvent> {
        self.runner.events.read().await.list()
    }

    /// Run a single polling cycle now.
    pub async fn tick(&self) -> TickReport {
        self.runner.tick().await
    }

    /// Spawn the periodic loop. The first tick fires one `check_duration`
    /// after start. Ticks never overlap; firings missed while a tick overran
    /// are skipped.
    pub async fn start(&self) -> Result<(), String> {
        {
            let mut state = self.state.write().await;
            if *state == MonitorState::Active {
                return Ok(());
            }
            if !state.can_transition_to(MonitorState::Active) {
                return Err(format!("Monitor cannot start while {}", *state));
            }
            *state = MonitorState::Active;
        }

        info!(
            monitor_id = %self.id,
            check_duration_secs = self.config.check_duration.as_secs_f64(),
            "Starting monitor"
        );

        let state = Arc::clone(&self.state);
        let stop_signal = Arc::clone(&self.stop_signal);
        let runner = self.runner.clone();
        let period = self.config.check_duration;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick of a tokio interval completes immediately.
            interval.tick().await;

            loop {
                let stop_requested = tokio::select! {
                    _ = interval.tick() => false,
                    _ = stop_signal.notified() => true,
                };

                {
                    let current_state = *state.read().await;
                    if current_state != MonitorState::Active {
                        *state.write().await = MonitorState::Stopped;
                        info!("Monitor stopped");
                        break;
                    }
                }

                // A permit left over from a stop that raced the previous run.
                if stop_requested {
                    continue;
                }

                let report = runner.tick().await;
                debug!(
                    checked = report.checked,
                    unreachable = report.unreachable,
                    skipped = report.skipped,
                    transitions = report.events.len(),
                    "Tick complete"
                );
            }
        });

        Ok(())
    }

    pub async fn stop(&self) {
        let mut state = self.state.write().await;
        if *state == MonitorState::Active {
            *state = MonitorState::Stopping;
            info!(monitor_id = %self.id, "Stopping monitor");
            self.stop_signal.notify_one();
        }
    }
}

impl TickRunner {
    async fn tick(&self) -> TickReport {
        let started_at = self.clock.now();
        *self.last_checked.write().await = Some(started_at);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let snapshot = match self.registry.list_all().await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                warn!(error = %e, "Failed to read registry, skipping tick");
                return TickReport::empty(started_at);
            }
        };

        let concurrency = self
            .config
            .max_concurrent_probes
            .unwrap_or(snapshot.len())
            .max(1);
        let checks: Vec<_> = snapshot
            .into_iter()
            .map(|endpoint| self.check_endpoint(endpoint))
            .collect();
        let outcomes: Vec<EndpointOutcome> = stream::iter(checks)
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut report = TickReport::empty(started_at);
        for outcome in outcomes {
            match outcome {
                EndpointOutcome::Checked { alive, event } => {
                    report.checked += 1;
                    if alive {
                        report.reachable += 1;
                    } else {
                        report.unreachable += 1;
                    }
                    report.events.extend(event);
                }
                EndpointOutcome::Skipped => report.skipped += 1,
            }
        }
        report
    }

    async fn check_endpoint(&self, endpoint: Endpoint) -> EndpointOutcome {
        let timeout = self.config.probe_timeout;
        // The probe bounds itself, but a misbehaving implementation must not
        // hold up the tick either.
        let alive = tokio::time::timeout(
            timeout,
            self.probe
                .is_reachable(&endpoint.hostname, endpoint.port, timeout),
        )
        .await
        .unwrap_or(false);

        // Re-read: the snapshot may be stale by the time the probe returns.
        let current = match self.registry.find_by_name(&endpoint.display_name).await {
            Ok(current) => current,
            Err(RegistryError::NotFound(_)) => {
                debug!(endpoint = %endpoint.display_name, "Endpoint removed during tick");
                return EndpointOutcome::Skipped;
            }
            Err(e) => {
                warn!(endpoint = %endpoint.display_name, error = %e, "Failed to read endpoint state");
                return EndpointOutcome::Skipped;
            }
        };

        let mut downtime = current.downtime;
        if !alive {
            match self.registry.increment_downtime(&current.display_name).await {
                Ok(()) => downtime += 1,
                Err(e) => {
                    warn!(endpoint = %current.display_name, error = %e, "Failed to record downtime");
                }
            }
        }

        let step = transition(current.down, alive);
        let Some(kind) = step.event else {
            return EndpointOutcome::Checked { alive, event: None };
        };

        if let Err(e) = self
            .registry
            .set_down(&current.display_name, step.state.is_down())
            .await
        {
            warn!(endpoint = %current.display_name, error = %e, "Failed to persist endpoint state");
            return EndpointOutcome::Skipped;
        }

        let event = TransitionEvent::new(kind, &current, self.clock.now()).with_downtime(downtime);
        info!(
            endpoint = %event.endpoint_name,
            address = %current.address(),
            kind = %event.kind,
            "Endpoint state changed"
        );

        self.events.write().await.push(event.clone());
        self.dispatch(&event);

        EndpointOutcome::Checked {
            alive,
            event: Some(event),
        }
    }

    fn dispatch(&self, event: &TransitionEvent) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        if let Err(e) = notifier.notify(event) {
            warn!(endpoint = %event.endpoint_name, error = %e, "Notification dropped");
        }
    }
}
