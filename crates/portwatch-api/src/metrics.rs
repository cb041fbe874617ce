use std::fmt::Write;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use portwatch_core::EventKind;

use crate::state::AppState;

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut out = String::with_capacity(4096);
    let m = &state.monitor;
    let id = m.id();

    writeln!(out, "# TYPE portwatch_monitor_info info").unwrap();
    writeln!(out, "# HELP portwatch_monitor_info Information about the reachability monitor").unwrap();
    writeln!(
        out,
        "portwatch_monitor_info{{monitor_id=\"{}\",created=\"{}\"}} 1",
        id,
        m.created_at().to_rfc3339()
    )
    .unwrap();

    writeln!(out, "# TYPE portwatch_monitor_state stateset").unwrap();
    writeln!(out, "# HELP portwatch_monitor_state Current state of the monitor loop").unwrap();
    let s = m.state().await.to_string();
    for variant in &["idle", "active", "stopping", "stopped"] {
        writeln!(
            out,
            "portwatch_monitor_state{{monitor_id=\"{}\",state=\"{}\"}} {}",
            id,
            variant,
            if s == *variant { 1 } else { 0 }
        )
        .unwrap();
    }

    writeln!(out, "# TYPE portwatch_monitor_ticks counter").unwrap();
    writeln!(out, "# HELP portwatch_monitor_ticks Polling ticks run since start").unwrap();
    writeln!(
        out,
        "portwatch_monitor_ticks_total{{monitor_id=\"{}\"}} {}",
        id,
        m.tick_count()
    )
    .unwrap();

    writeln!(out, "# TYPE portwatch_monitor_last_check_timestamp_seconds gauge").unwrap();
    writeln!(
        out,
        "# HELP portwatch_monitor_last_check_timestamp_seconds Unix timestamp of the last tick"
    )
    .unwrap();
    if let Some(t) = m.last_checked().await {
        let secs = t.timestamp() as f64 + (t.timestamp_subsec_millis() as f64 / 1000.0);
        writeln!(
            out,
            "portwatch_monitor_last_check_timestamp_seconds{{monitor_id=\"{}\"}} {:.3}",
            id, secs
        )
        .unwrap();
    }

    writeln!(out, "# TYPE portwatch_monitor_uptime_seconds gauge").unwrap();
    writeln!(out, "# HELP portwatch_monitor_uptime_seconds Time since the monitor was created").unwrap();
    let uptime = (chrono::Utc::now() - m.created_at()).num_milliseconds() as f64 / 1000.0;
    writeln!(
        out,
        "portwatch_monitor_uptime_seconds{{monitor_id=\"{}\"}} {:.3}",
        id, uptime
    )
    .unwrap();

    writeln!(out, "# TYPE portwatch_recent_transitions gauge").unwrap();
    writeln!(
        out,
        "# HELP portwatch_recent_transitions Transitions held in the event buffer by kind"
    )
    .unwrap();
    let events = m.recent_events().await;
    for kind in [EventKind::Down, EventKind::Up] {
        let count = events.iter().filter(|e| e.kind == kind).count();
        writeln!(
            out,
            "portwatch_recent_transitions{{monitor_id=\"{}\",kind=\"{}\"}} {}",
            id,
            kind.notification_type(),
            count
        )
        .unwrap();
    }

    // A registry read failure drops the per-endpoint families for this scrape.
    match m.registry().list_all().await {
        Ok(endpoints) => {
            writeln!(out, "# TYPE portwatch_endpoints gauge").unwrap();
            writeln!(out, "# HELP portwatch_endpoints Number of registered endpoints").unwrap();
            writeln!(out, "portwatch_endpoints {}", endpoints.len()).unwrap();

            writeln!(out, "# TYPE portwatch_endpoint_up gauge").unwrap();
            writeln!(
                out,
                "# HELP portwatch_endpoint_up Whether the endpoint accepted a connection on the last check"
            )
            .unwrap();
            for e in &endpoints {
                writeln!(
                    out,
                    "portwatch_endpoint_up{{endpoint=\"{}\",address=\"{}\"}} {}",
                    escape_label(&e.display_name),
                    escape_label(&e.address()),
                    if e.down { 0 } else { 1 }
                )
                .unwrap();
            }

            writeln!(out, "# TYPE portwatch_endpoint_downtime_checks counter").unwrap();
            writeln!(
                out,
                "# HELP portwatch_endpoint_downtime_checks Checks that found the endpoint down"
            )
            .unwrap();
            for e in &endpoints {
                writeln!(
                    out,
                    "portwatch_endpoint_downtime_checks_total{{endpoint=\"{}\"}} {}",
                    escape_label(&e.display_name),
                    e.downtime
                )
                .unwrap();
            }
        }
        Err(e) => tracing::warn!(error = %e, "Failed to read registry for metrics"),
    }

    writeln!(out, "# EOF").unwrap();

    (
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        out,
    )
}
