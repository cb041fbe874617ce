//! TOML configuration file schema and parsing.
//!
//! Example config file:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8080"
//! log_format = "json"
//!
//! [monitor]
//! check_duration = 60
//! timeout_ms = 5000
//! database = "portwatch.sqlite"
//!
//! [lookup]
//! api = "http://ip-api.com/json/"
//!
//! [[webhook]]
//! url = "https://discord.com/api/webhooks/123/abc"
//! format = "discord"
//! username = "Uptime"
//!
//! [[webhook]]
//! url = "https://hooks.example.com/portwatch"
//! format = "json"
//! events = ["endpoint_down"]
//! secret = "my-key"
//!
//! [[endpoint]]
//! display_name = "web1"
//! hostname = "example.com"
//! port = 443
//! ```

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use portwatch_core::{MonitorConfig, WebhookConfig, WebhookFormat, MAX_WEBHOOK_RETRIES};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub monitor: MonitorSection,

    #[serde(default)]
    pub lookup: LookupConfig,

    #[serde(default)]
    pub webhook: Vec<WebhookConfig>,

    #[serde(default)]
    pub endpoint: Vec<EndpointDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            log_format: default_log_format(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_log_format() -> String {
    "pretty".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSection {
    /// Seconds between two polling ticks.
    #[serde(default = "default_check_duration")]
    pub check_duration: u64,

    /// Per-probe timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_database")]
    pub database: PathBuf,

    #[serde(default)]
    pub max_concurrent_probes: Option<usize>,

    #[serde(default)]
    pub event_limit: Option<usize>,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            check_duration: default_check_duration(),
            timeout_ms: default_timeout_ms(),
            database: default_database(),
            max_concurrent_probes: None,
            event_limit: None,
        }
    }
}

fn default_check_duration() -> u64 {
    60
}

fn default_timeout_ms() -> u64 {
    5000
}

pub fn default_database() -> PathBuf {
    PathBuf::from("portwatch.sqlite")
}

impl MonitorSection {
    pub fn to_monitor_config(&self) -> MonitorConfig {
        let mut c = MonitorConfig::default()
            .with_check_duration_secs(self.check_duration)
            .with_probe_timeout_ms(self.timeout_ms);
        if let Some(v) = self.max_concurrent_probes {
            c = c.with_max_concurrent_probes(v);
        }
        if let Some(v) = self.event_limit {
            c = c.with_event_limit(v);
        }
        c
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LookupConfig {
    /// Base URL of an ip-api compatible geolocation service. The host is appended.
    #[serde(default)]
    pub api: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EndpointDef {
    pub display_name: String,
    pub hostname: String,
    #[serde(default)]
    pub port: Option<u16>,
}

impl EndpointDef {
    /// Parse a command-line endpoint: `[NAME=]HOST[:PORT]`, with IPv6 hosts
    /// in brackets (`[::1]:22`). Without a name, the target itself is used.
    pub fn parse_arg(arg: &str) -> Result<Self, String> {
        let (name, target) = match arg.split_once('=') {
            Some((n, t)) => (Some(n.trim()), t.trim()),
            None => (None, arg.trim()),
        };

        let (host, port) = if let Some(rest) = target.strip_prefix('[') {
            let (host, after) = rest
                .split_once(']')
                .ok_or_else(|| format!("Unclosed '[' in endpoint '{}'", arg))?;
            let port = match after.strip_prefix(':') {
                Some(p) => Some(parse_port(p, arg)?),
                None if after.is_empty() => None,
                None => return Err(format!("Unexpected '{}' in endpoint '{}'", after, arg)),
            };
            (host, port)
        } else {
            match target.rsplit_once(':') {
                Some((host, p)) if !host.contains(':') => (host, Some(parse_port(p, arg)?)),
                _ => (target, None),
            }
        };

        if host.is_empty() {
            return Err(format!("Missing host in endpoint '{}'", arg));
        }

        let display_name = match name {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => target.to_string(),
        };

        Ok(Self {
            display_name,
            hostname: host.to_string(),
            port,
        })
    }
}

fn parse_port(s: &str, arg: &str) -> Result<u16, String> {
    match s.parse::<u16>() {
        Ok(0) | Err(_) => Err(format!("Invalid port '{}' in endpoint '{}'", s, arg)),
        Ok(p) => Ok(p),
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file {}: {}", path.display(), e))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        for (i, wh) in self.webhook.iter().enumerate() {
            url::Url::parse(&wh.url)
                .map_err(|e| format!("Invalid webhook URL at index {}: {} ({})", i, wh.url, e))?;
            if wh.secret.is_some() && wh.format == WebhookFormat::Discord {
                return Err(format!(
                    "Webhook at index {} sets a secret, which only applies to format = \"json\"",
                    i
                ));
            }
            if wh.max_retries > MAX_WEBHOOK_RETRIES {
                return Err(format!(
                    "Webhook at index {} sets max_retries = {}: at most {} allowed",
                    i, wh.max_retries, MAX_WEBHOOK_RETRIES
                ));
            }
            for event in &wh.events {
                if event != "endpoint_down" && event != "endpoint_up" {
                    return Err(format!(
                        "Unknown webhook event '{}' at index {}: must be 'endpoint_down' or 'endpoint_up'",
                        event, i
                    ));
                }
            }
        }

        if let Some(api) = &self.lookup.api {
            let parsed = url::Url::parse(api)
                .map_err(|e| format!("Invalid lookup api URL: {} ({})", api, e))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(format!("Lookup api URL must use http or https: {}", api));
            }
        }

        if self.monitor.check_duration == 0 {
            return Err("monitor.check_duration must be at least 1 second".into());
        }
        if self.monitor.timeout_ms == 0 {
            return Err("monitor.timeout_ms must be at least 1".into());
        }

        let mut names = HashSet::new();
        for e in &self.endpoint {
            if e.display_name.trim().is_empty() {
                return Err("Endpoint display_name must not be empty".into());
            }
            if e.hostname.trim().is_empty() {
                return Err(format!("Endpoint '{}' has no hostname", e.display_name));
            }
            if e.port == Some(0) {
                return Err(format!("Endpoint '{}' has port 0", e.display_name));
            }
            if !names.insert(e.display_name.trim()) {
                return Err(format!("Duplicate endpoint display_name: {}", e.display_name));
            }
        }

        match self.server.log_format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(format!(
                    "Invalid log_format '{}': must be 'pretty' or 'json'",
                    other
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn parse_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        config.validate().unwrap();
        assert_eq!(config.server.listen.port(), 8080);
        assert_eq!(config.server.log_format, "pretty");
        assert_eq!(config.monitor.check_duration, 60);
        assert_eq!(config.monitor.timeout_ms, 5000);
        assert_eq!(config.monitor.database, PathBuf::from("portwatch.sqlite"));
        assert!(config.lookup.api.is_none());
        assert!(config.webhook.is_empty());
        assert!(config.endpoint.is_empty());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[server]
listen = "127.0.0.1:9090"
log_format = "json"

[monitor]
check_duration = 30
timeout_ms = 2500
database = "/var/lib/portwatch/data.sqlite"
max_concurrent_probes = 64

[lookup]
api = "http://ip-api.com/json/"

[[webhook]]
url = "https://discord.com/api/webhooks/1/abc"
username = "Uptime"
avatar_url = "https://example.com/bot.png"

[[webhook]]
url = "https://hooks.example.com/alerts"
format = "json"
events = ["endpoint_down"]
secret = "my-key"

[[endpoint]]
display_name = "web1"
hostname = "example.com"
port = 443

[[endpoint]]
display_name = "dns"
hostname = "1.1.1.1"
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.server.listen.port(), 9090);
        assert_eq!(config.server.log_format, "json");
        assert_eq!(config.lookup.api.as_deref(), Some("http://ip-api.com/json/"));

        let mc = config.monitor.to_monitor_config();
        assert_eq!(mc.check_duration, Duration::from_secs(30));
        assert_eq!(mc.probe_timeout, Duration::from_millis(2500));
        assert_eq!(mc.max_concurrent_probes, Some(64));
        assert_eq!(mc.event_limit, 100);

        assert_eq!(config.webhook.len(), 2);
        assert_eq!(config.webhook[0].format, WebhookFormat::Discord);
        assert_eq!(config.webhook[0].username.as_deref(), Some("Uptime"));
        assert_eq!(config.webhook[1].format, WebhookFormat::Json);
        assert_eq!(config.webhook[1].events, vec!["endpoint_down"]);
        assert_eq!(config.webhook[1].secret.as_deref(), Some("my-key"));

        assert_eq!(config.endpoint.len(), 2);
        assert_eq!(config.endpoint[0].port, Some(443));
        assert_eq!(config.endpoint[1].port, None);
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[monitor]\ncheck_duration = 5").unwrap();
        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.monitor.check_duration, 5);

        let err = AppConfig::load(Path::new("/nonexistent/portwatch.toml")).unwrap_err();
        assert!(err.contains("Failed to read config file"), "{}", err);
    }

    #[test]
    fn validate_rejects_duplicate_endpoint_names() {
        let toml = r#"
[[endpoint]]
display_name = "same"
hostname = "a.example.com"

[[endpoint]]
display_name = "same"
hostname = "b.example.com"
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("Duplicate endpoint"), "{}", err);
    }

    #[test]
    fn validate_rejects_port_zero() {
        let toml = r#"
[[endpoint]]
display_name = "zero"
hostname = "example.com"
port = 0
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("port 0"), "{}", err);
    }

    #[test]
    fn validate_rejects_invalid_webhook() {
        let config: AppConfig = toml::from_str("[[webhook]]\nurl = \"not-valid\"").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("Invalid webhook URL"), "{}", err);

        let config: AppConfig = toml::from_str(
            "[[webhook]]\nurl = \"https://a.example.com\"\nevents = [\"error\"]",
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("Unknown webhook event"), "{}", err);

        let config: AppConfig = toml::from_str(
            "[[webhook]]\nurl = \"https://a.example.com\"\nsecret = \"k\"",
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("only applies"), "{}", err);

        let config: AppConfig = toml::from_str(
            "[[webhook]]\nurl = \"https://a.example.com\"\nmax_retries = 57",
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("max_retries"), "{}", err);
    }

    #[test]
    fn validate_rejects_invalid_lookup_api() {
        let config: AppConfig = toml::from_str("[lookup]\napi = \"ftp://example.com/\"").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("http or https"), "{}", err);
    }

    #[test]
    fn validate_rejects_zero_intervals() {
        let config: AppConfig = toml::from_str("[monitor]\ncheck_duration = 0").unwrap();
        assert!(config.validate().is_err());
        let config: AppConfig = toml::from_str("[monitor]\ntimeout_ms = 0").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_invalid_log_format() {
        let config: AppConfig = toml::from_str("[server]\nlog_format = \"xml\"").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("Invalid log_format"), "{}", err);
    }

    #[test]
    fn parse_endpoint_args() {
        let e = EndpointDef::parse_arg("web1=example.com:443").unwrap();
        assert_eq!(e.display_name, "web1");
        assert_eq!(e.hostname, "example.com");
        assert_eq!(e.port, Some(443));

        let e = EndpointDef::parse_arg("example.com").unwrap();
        assert_eq!(e.display_name, "example.com");
        assert_eq!(e.port, None);

        let e = EndpointDef::parse_arg("db=[::1]:5432").unwrap();
        assert_eq!(e.hostname, "::1");
        assert_eq!(e.port, Some(5432));

        let e = EndpointDef::parse_arg("2001:db8::1").unwrap();
        assert_eq!(e.hostname, "2001:db8::1");
        assert_eq!(e.port, None);

        assert!(EndpointDef::parse_arg("web=example.com:0").is_err());
        assert!(EndpointDef::parse_arg("web=example.com:http").is_err());
        assert!(EndpointDef::parse_arg("web=:80").is_err());
        assert!(EndpointDef::parse_arg("[::1").is_err());
    }
}
