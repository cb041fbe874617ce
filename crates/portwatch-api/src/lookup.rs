//! One-off host lookup: a TCP probe plus optional IP geolocation.
//!
//! Geolocation is delegated to an ip-api compatible service: the host is
//! appended to the configured base URL and the JSON reply is read for
//! `city`, `regionName`, `country`, `as` and `timezone`. Any failure there
//! yields `geo: None`; it never fails the lookup.

use std::net::IpAddr;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use portwatch_core::{TcpProbe, DEFAULT_PORT};

const GEO_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
    Hostname,
}

impl AddressFamily {
    /// Classify `host`, or `None` if it is neither an IP address nor a valid domain.
    pub fn classify(host: &str) -> Option<Self> {
        match host.parse::<IpAddr>() {
            Ok(IpAddr::V4(_)) => Some(Self::Ipv4),
            Ok(IpAddr::V6(_)) => Some(Self::Ipv6),
            Err(_) => match url::Host::parse(host) {
                Ok(url::Host::Domain(_)) => Some(Self::Hostname),
                _ => None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoInfo {
    pub city: Option<String>,
    #[serde(rename = "regionName")]
    pub region_name: Option<String>,
    pub country: Option<String>,
    #[serde(rename = "as")]
    pub asn: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Deserialize)]
struct GeoResponse {
    status: Option<String>,
    message: Option<String>,
    #[serde(flatten)]
    info: GeoInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct LookupResult {
    pub host: String,
    pub port: u16,
    pub address_family: AddressFamily,
    pub reachable: bool,
    pub latency_ms: Option<f64>,
    pub geo: Option<GeoInfo>,
}

pub struct Lookup {
    probe: TcpProbe,
    timeout: Duration,
    geo: Option<(Client, String)>,
}

impl Lookup {
    pub fn new(timeout: Duration) -> Self {
        Self {
            probe: TcpProbe::new(),
            timeout,
            geo: None,
        }
    }

    /// Enable geolocation against `api` (e.g. `http://ip-api.com/json/`).
    pub fn with_geo_api(mut self, client: Client, api: impl Into<String>) -> Self {
        self.geo = Some((client, api.into()));
        self
    }

    pub fn has_geo(&self) -> bool {
        self.geo.is_some()
    }

    /// Probe and locate `host`. The caller validates `host` beforehand.
    pub async fn run(&self, host: &str, port: Option<u16>, family: AddressFamily) -> LookupResult {
        let port = port.unwrap_or(DEFAULT_PORT);
        let (outcome, geo) = tokio::join!(
            self.probe.measure(host, port, self.timeout),
            self.locate(host)
        );

        LookupResult {
            host: host.to_string(),
            port,
            address_family: family,
            reachable: outcome.reachable,
            latency_ms: outcome
                .reachable
                .then(|| outcome.latency.as_secs_f64() * 1000.0),
            geo,
        }
    }

    async fn locate(&self, host: &str) -> Option<GeoInfo> {
        let (client, api) = self.geo.as_ref()?;
        let url = format!("{}{}", api, host);

        let resp = match client.get(&url).timeout(GEO_TIMEOUT).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(host, error = %e, "Geolocation request failed");
                return None;
            }
        };
        if !resp.status().is_success() {
            warn!(host, status = %resp.status(), "Geolocation service returned an error");
            return None;
        }

        match resp.json::<GeoResponse>().await {
            Ok(body) if body.status.as_deref() == Some("fail") => {
                debug!(host, message = ?body.message, "Geolocation lookup rejected");
                None
            }
            Ok(body) => Some(body.info),
            Err(e) => {
                warn!(host, error = %e, "Invalid geolocation response");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn classify_address_families() {
        assert_eq!(AddressFamily::classify("1.1.1.1"), Some(AddressFamily::Ipv4));
        assert_eq!(AddressFamily::classify("2606:4700::1111"), Some(AddressFamily::Ipv6));
        assert_eq!(AddressFamily::classify("example.com"), Some(AddressFamily::Hostname));
        assert_eq!(AddressFamily::classify("bad host/../x"), None);
        assert_eq!(AddressFamily::classify(""), None);
    }

    #[tokio::test]
    async fn lookup_reports_geo_from_service() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/json/127.0.0.1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success",
                "city": "Amsterdam",
                "regionName": "North Holland",
                "country": "Netherlands",
                "as": "AS1136 KPN B.V.",
                "timezone": "Europe/Amsterdam"
            })))
            .mount(&server)
            .await;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let lookup = Lookup::new(Duration::from_secs(2))
            .with_geo_api(Client::new(), format!("{}/json/", server.uri()));
        let result = lookup.run("127.0.0.1", Some(port), AddressFamily::Ipv4).await;

        assert!(result.reachable);
        assert!(result.latency_ms.is_some());
        let geo = result.geo.unwrap();
        assert_eq!(geo.city.as_deref(), Some("Amsterdam"));
        assert_eq!(geo.region_name.as_deref(), Some("North Holland"));
        assert_eq!(geo.asn.as_deref(), Some("AS1136 KPN B.V."));
    }

    #[tokio::test]
    async fn lookup_geo_failure_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "fail",
                "message": "private range"
            })))
            .mount(&server)
            .await;

        let lookup = Lookup::new(Duration::from_millis(500))
            .with_geo_api(Client::new(), format!("{}/json/", server.uri()));
        let result = lookup.run("127.0.0.1", Some(9), AddressFamily::Ipv4).await;
        assert!(result.geo.is_none());

        let broken = Lookup::new(Duration::from_millis(500))
            .with_geo_api(Client::new(), "http://127.0.0.1:9/json/");
        let result = broken.run("127.0.0.1", Some(9), AddressFamily::Ipv4).await;
        assert!(result.geo.is_none());
        assert!(!result.reachable);
        assert!(result.latency_ms.is_none());
    }

    #[tokio::test]
    async fn lookup_defaults_port() {
        let lookup = Lookup::new(Duration::from_millis(200));
        assert!(!lookup.has_geo());
        let result = lookup.run("no-such-host.invalid", None, AddressFamily::Hostname).await;
        assert_eq!(result.port, DEFAULT_PORT);
        assert!(!result.reachable);
    }
}
