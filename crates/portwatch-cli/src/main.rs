mod config;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing_subscriber::{fmt, EnvFilter};

use portwatch_api::lookup::Lookup;
use portwatch_api::state::AppState;
use portwatch_core::{
    notification_channel, ChannelNotifier, Endpoint, EndpointStore, EventKind, MemoryStore,
    Monitor, MonitorConfig, Notifier, Probe, Registry, SqliteStore, TcpProbe, TickReport,
    TransitionEvent, WebhookConfig, WebhookDispatcher,
};

use crate::config::{AppConfig, EndpointDef};

fn version_string() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("GIT_HASH");

    if GIT_HASH.is_empty() {
        VERSION
    } else {
        // Called once; the string lives for the rest of the program.
        Box::leak(format!("{VERSION} ({GIT_HASH})").into_boxed_str())
    }
}

/// TCP endpoint monitor: get notified when a host:port goes down or comes back.
#[derive(Parser)]
#[command(name = "portwatch", version = version_string(), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the monitor loop and the HTTP API server.
    Serve {
        /// Listen address (e.g. 0.0.0.0:8080). Overrides config file.
        #[arg(short, long)]
        listen: Option<SocketAddr>,

        /// Path to TOML config file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Watch endpoints from the command line (no API server).
    Watch {
        /// Endpoints as `[NAME=]HOST[:PORT]`.
        endpoints: Vec<String>,

        /// SQLite database to read endpoints from and record state in.
        /// Without it, state is kept in memory only.
        #[arg(long)]
        database: Option<PathBuf>,

        /// Seconds between checks.
        #[arg(long, default_value_t = 10)]
        check_duration: u64,

        /// Per-probe timeout in milliseconds.
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,

        /// Optional Discord webhook URL to POST transitions to.
        #[arg(long)]
        webhook_url: Option<String>,
    },
    /// Register an endpoint in the database.
    Add {
        /// Unique display name.
        name: String,

        /// Hostname or IP address.
        host: String,

        #[arg(short, long)]
        port: Option<u16>,

        #[arg(long, default_value_os_t = config::default_database())]
        database: PathBuf,

        /// Timeout of the initial probe in milliseconds.
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
    },
    /// List registered endpoints.
    List {
        #[arg(long, default_value_os_t = config::default_database())]
        database: PathBuf,

        /// Print JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { listen, config } => {
            run_serve(listen, config).await;
        }
        Commands::Watch {
            endpoints,
            database,
            check_duration,
            timeout_ms,
            webhook_url,
        } => {
            init_quiet_tracing();
            run_watch(endpoints, database, check_duration, timeout_ms, webhook_url).await;
        }
        Commands::Add {
            name,
            host,
            port,
            database,
            timeout_ms,
        } => {
            init_quiet_tracing();
            run_add(&name, &host, port, &database, timeout_ms).await;
        }
        Commands::List { database, json } => {
            init_quiet_tracing();
            run_list(&database, json).await;
        }
    }
}

async fn open_sqlite(path: &Path) -> Arc<SqliteStore> {
    match SqliteStore::open(path).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Failed to open database");
            eprintln!("{} {}", style("error:").red().bold(), e);
            std::process::exit(1);
        }
    }
}

async fn seed_endpoints(registry: &Registry, defs: &[EndpointDef]) {
    for def in defs {
        match registry.add(&def.display_name, &def.hostname, def.port).await {
            Ok(_) => {}
            Err(e) if e.is_duplicate() => {
                tracing::debug!(endpoint = %def.display_name, "Endpoint already registered");
            }
            Err(e) => {
                tracing::warn!(endpoint = %def.display_name, error = %e, "Failed to register endpoint");
            }
        }
    }
}

async fn run_serve(listen_override: Option<SocketAddr>, config_path: Option<PathBuf>) {
    let app_config = if let Some(ref path) = config_path {
        match AppConfig::load(path) {
            Ok(c) => {
                init_tracing(&c.server.log_format);
                tracing::info!(path = %path.display(), "Loaded config file");
                c
            }
            Err(e) => {
                init_tracing("pretty");
                tracing::error!("{}", e);
                std::process::exit(1);
            }
        }
    } else {
        init_tracing("pretty");
        AppConfig::default()
    };

    let listen = listen_override.unwrap_or(app_config.server.listen);
    let monitor_config = app_config.monitor.to_monitor_config();

    let store = open_sqlite(&app_config.monitor.database).await;
    let probe: Arc<dyn Probe> = Arc::new(TcpProbe::new());
    let registry = Arc::new(Registry::new(
        store,
        Arc::clone(&probe),
        monitor_config.probe_timeout,
    ));
    seed_endpoints(&registry, &app_config.endpoint).await;

    let client = reqwest::Client::new();
    let (notification_tx, notification_rx) = notification_channel();

    let webhook_handle = if !app_config.webhook.is_empty() {
        let dispatcher =
            WebhookDispatcher::new(notification_rx, app_config.webhook.clone(), client.clone());
        let handle = tokio::spawn(dispatcher.run());
        tracing::info!(count = app_config.webhook.len(), "Webhook dispatcher started");
        handle
    } else {
        tokio::spawn(async move {
            let mut rx = notification_rx;
            while rx.recv().await.is_some() {}
        })
    };

    let monitor = Arc::new(Monitor::new(
        registry,
        probe,
        monitor_config.clone(),
        Some(Arc::new(ChannelNotifier::new(notification_tx))),
    ));
    if let Err(e) = monitor.start().await {
        tracing::error!(error = %e, "Failed to start monitor");
        std::process::exit(1);
    }

    let mut lookup = Lookup::new(monitor_config.probe_timeout);
    if let Some(api) = &app_config.lookup.api {
        lookup = lookup.with_geo_api(client, api.clone());
    }
    let state = AppState::new(Arc::clone(&monitor)).with_lookup(lookup);

    tracing::info!(%listen, "Starting portwatch API server");
    if let Err(e) =
        portwatch_api::serve_with_state(listen, state, portwatch_api::shutdown_signal()).await
    {
        tracing::error!(error = %e, "Server failed");
        std::process::exit(1);
    }

    tracing::info!("Shutdown signal received, stopping monitor...");
    monitor.stop().await;
    // The notification sender lives in the monitor; dropping it lets the
    // dispatcher drain and exit.
    drop(monitor);

    match tokio::time::timeout(Duration::from_secs(5), webhook_handle).await {
        Ok(_) => tracing::info!("Webhook dispatcher shut down"),
        Err(_) => tracing::warn!("Webhook dispatcher did not shut down in time, aborting"),
    }

    tracing::info!("Shutdown complete");
}

async fn run_watch(
    endpoint_args: Vec<String>,
    database: Option<PathBuf>,
    check_duration: u64,
    timeout_ms: u64,
    webhook_url: Option<String>,
) {
    let mut defs = Vec::with_capacity(endpoint_args.len());
    for arg in &endpoint_args {
        match EndpointDef::parse_arg(arg) {
            Ok(def) => defs.push(def),
            Err(e) => {
                eprintln!("{} {}", style("error:").red().bold(), e);
                std::process::exit(2);
            }
        }
    }

    let config = MonitorConfig::default()
        .with_check_duration_secs(check_duration)
        .with_probe_timeout_ms(timeout_ms);

    let store: Arc<dyn EndpointStore> = match &database {
        Some(path) => open_sqlite(path).await,
        None => Arc::new(MemoryStore::new()),
    };
    let probe: Arc<dyn Probe> = Arc::new(TcpProbe::new());
    let registry = Arc::new(Registry::new(store, Arc::clone(&probe), config.probe_timeout));
    seed_endpoints(&registry, &defs).await;

    let notifier = webhook_url.as_ref().map(|wh_url| {
        let (tx, rx) = notification_channel();
        let dispatcher =
            WebhookDispatcher::new(rx, vec![WebhookConfig::new(wh_url.clone())], reqwest::Client::new());
        tokio::spawn(dispatcher.run());
        Arc::new(ChannelNotifier::new(tx)) as Arc<dyn Notifier>
    });

    let monitor = Monitor::new(Arc::clone(&registry), probe, config.clone(), notifier);

    let multi = MultiProgress::new();
    let msg_style = ProgressStyle::with_template("{wide_msg}").expect("valid template");

    multi
        .println(format!(
            "{} {}",
            style("portwatch").bold(),
            style(env!("CARGO_PKG_VERSION")).dim()
        ))
        .ok();
    multi
        .println(format!("  {} {}s", style("every:  ").dim(), check_duration.max(1)))
        .ok();
    multi
        .println(format!("  {} {}ms", style("timeout:").dim(), timeout_ms.max(1)))
        .ok();
    multi
        .println(format!(
            "  {} {}",
            style("store:  ").dim(),
            database
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "memory".into())
        ))
        .ok();
    if let Some(ref wh) = webhook_url {
        multi
            .println(format!("  {} {}", style("webhook:").dim(), wh))
            .ok();
    }

    let initial = registry.list_all().await.unwrap_or_default();
    if initial.is_empty() {
        multi
            .println(format!(
                "\n{}",
                style("No endpoints to watch. Pass [NAME=]HOST[:PORT] or --database.").yellow()
            ))
            .ok();
        return;
    }
    for e in &initial {
        multi.println(format!("  {}", format_endpoint(e))).ok();
    }
    multi.println("").ok();
    multi
        .println(format!("{}", style("Press Ctrl+C to stop").dim()))
        .ok();
    multi.println("").ok();

    let status_bar = multi.add(ProgressBar::new_spinner().with_style(msg_style));
    status_bar.set_message(format!(
        "{}\n  {}",
        format_separator(0),
        style("Waiting for first check...").dim()
    ));

    let mut interval = tokio::time::interval(config.check_duration);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let shutdown = portwatch_api::shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = &mut shutdown => {
                status_bar.finish_and_clear();
                multi.println(format!("\n{}", style("Monitor stopped.").dim())).ok();
                return;
            }
        }

        let report = monitor.tick().await;
        for ev in &report.events {
            multi.println(format_event(ev)).ok();
        }

        let mut status_lines = vec![format_separator(monitor.tick_count())];
        status_lines.push(format_summary(&report));
        match registry.list_all().await {
            Ok(endpoints) => {
                for e in &endpoints {
                    status_lines.push(format!("  {}", format_endpoint(e)));
                }
            }
            Err(e) => status_lines.push(format!("  {} {}", style("registry:").red(), e)),
        }

        status_bar.set_message(status_lines.join("\n"));
    }
}

async fn run_add(name: &str, host: &str, port: Option<u16>, database: &Path, timeout_ms: u64) {
    let store = open_sqlite(database).await;
    let registry = Registry::new(
        store,
        Arc::new(TcpProbe::new()),
        Duration::from_millis(timeout_ms.max(1)),
    );

    match registry.add(name, host, port).await {
        Ok(endpoint) => {
            println!(
                "Monitor {} added successfully.",
                style(&endpoint.display_name).bold()
            );
            println!("  {}", format_endpoint(&endpoint));
        }
        Err(e) if e.is_duplicate() => {
            eprintln!("{}", style(portwatch_api::error::DUPLICATE_MESSAGE).red());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            std::process::exit(1);
        }
    }
}

async fn run_list(database: &Path, json: bool) {
    let store = open_sqlite(database).await;
    let endpoints = match store.list_all().await {
        Ok(e) => e,
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            std::process::exit(1);
        }
    };

    if json {
        match serde_json::to_string_pretty(&endpoints) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("{} {}", style("error:").red().bold(), e);
                std::process::exit(1);
            }
        }
        return;
    }

    if endpoints.is_empty() {
        println!("{}", style("No endpoints registered.").dim());
        return;
    }
    for e in &endpoints {
        println!("{}", format_endpoint(e));
    }
}

fn format_endpoint(e: &Endpoint) -> String {
    let state = if e.down {
        style("DOWN").red().bold()
    } else {
        style("UP  ").green().bold()
    };
    format!(
        "{}  {:<20} {}  {}",
        state,
        e.display_name,
        style(e.address()).dim(),
        style(format!("downtime={}", e.downtime)).dim()
    )
}

fn format_event(ev: &TransitionEvent) -> String {
    let ts = ev.timestamp.format("%H:%M:%S");
    let kind = format!("{:<5}", ev.kind.to_string());
    match ev.kind {
        EventKind::Down => format!(
            "  {}  {} {}  {}",
            style(ts).dim(),
            style(kind).red().bold(),
            ev.endpoint_name,
            style(format!("{}:{}", ev.hostname, ev.port)).dim()
        ),
        EventKind::Up => format!(
            "  {}  {} {}  {}  {}",
            style(ts).dim(),
            style(kind).green().bold(),
            ev.endpoint_name,
            style(format!("{}:{}", ev.hostname, ev.port)).dim(),
            style(format!("downtime={}", ev.downtime)).dim()
        ),
    }
}

fn format_summary(report: &TickReport) -> String {
    let mut line = format!(
        "  {} up, {} down",
        style(report.reachable).green(),
        style(report.unreachable).red()
    );
    if report.skipped > 0 {
        line.push_str(&format!(", {} skipped", style(report.skipped).yellow()));
    }
    line
}

fn format_separator(tick: u64) -> String {
    let label = if tick == 0 {
        String::new()
    } else {
        format!(" check {} ", tick)
    };
    let width = 54usize.saturating_sub(label.len());
    format!(
        "{}{}{}",
        style("──").dim(),
        style(label).dim().bold(),
        style("─".repeat(width)).dim()
    )
}

fn init_quiet_tracing() {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
}

fn init_tracing(log_format: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_format {
        "json" => {
            fmt()
                .with_env_filter(filter)
                .json()
                .init();
        }
        _ => {
            fmt()
                .with_env_filter(filter)
                .init();
        }
    }
}
