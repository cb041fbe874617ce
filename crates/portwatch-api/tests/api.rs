//! API integration tests for portwatch-api routes.
//!
//! Uses Axum's `tower::ServiceExt` to send requests directly to the app
//! without binding a TCP socket.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use portwatch_api::app::build_app;
use portwatch_api::lookup::Lookup;
use portwatch_api::state::AppState;
use portwatch_core::{
    Endpoint, EndpointStore, MemoryStore, Monitor, MonitorConfig, Probe, Registry, RegistryError,
};

/// Probe whose answer can be flipped between requests.
struct SwitchProbe(AtomicBool);

#[async_trait]
impl Probe for SwitchProbe {
    async fn is_reachable(&self, _host: &str, _port: u16, _timeout: Duration) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Store that fails every operation.
struct BrokenStore;

#[async_trait]
impl EndpointStore for BrokenStore {
    async fn insert(&self, _endpoint: Endpoint) -> Result<(), RegistryError> {
        Err(RegistryError::Persistence("database is locked".into()))
    }
    async fn list_all(&self) -> Result<Vec<Endpoint>, RegistryError> {
        Err(RegistryError::Persistence("database is locked".into()))
    }
    async fn find_by_name(&self, _name: &str) -> Result<Option<Endpoint>, RegistryError> {
        Err(RegistryError::Persistence("database is locked".into()))
    }
    async fn set_down(&self, _name: &str, _down: bool) -> Result<bool, RegistryError> {
        Err(RegistryError::Persistence("database is locked".into()))
    }
    async fn increment_downtime(&self, _name: &str) -> Result<bool, RegistryError> {
        Err(RegistryError::Persistence("database is locked".into()))
    }
    async fn remove(&self, _name: &str) -> Result<bool, RegistryError> {
        Err(RegistryError::Persistence("database is locked".into()))
    }
}

fn monitor_with(store: Arc<dyn EndpointStore>, probe: Arc<SwitchProbe>) -> Arc<Monitor> {
    let config = MonitorConfig::default().with_probe_timeout_ms(500);
    let registry = Arc::new(Registry::new(store, probe.clone(), config.probe_timeout));
    Arc::new(Monitor::new(registry, probe, config, None))
}

fn app_with(reachable: bool) -> (axum::Router, Arc<Monitor>, Arc<SwitchProbe>) {
    let probe = Arc::new(SwitchProbe(AtomicBool::new(reachable)));
    let monitor = monitor_with(Arc::new(MemoryStore::new()), probe.clone());
    (build_app(AppState::new(monitor.clone())), monitor, probe)
}

fn app() -> axum::Router {
    app_with(true).0
}

async fn body_json(body: Body) -> Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(b) = body {
        builder.body(Body::from(serde_json::to_vec(&b).unwrap())).unwrap()
    } else {
        builder.body(Body::empty()).unwrap()
    }
}

fn create_web1() -> Request<Body> {
    json_request(
        "POST",
        "/api/v1/endpoints",
        Some(json!({ "display_name": "web1", "hostname": "example.test", "port": 80 })),
    )
}

#[tokio::test]
async fn health_returns_ok() {
    let app = app();
    let resp = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn unknown_route_returns_json_404() {
    let app = app();
    let resp = app
        .oneshot(json_request("GET", "/api/v1/nope", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = body_json(resp.into_body()).await;
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn metrics_returns_openmetrics() {
    let (app, _, _) = app_with(false);
    app.clone().oneshot(create_web1()).await.unwrap();

    let resp = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let ct = resp.headers().get("content-type").unwrap().to_str().unwrap();
    assert!(ct.contains("openmetrics-text"));
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("portwatch_endpoints 1"));
    assert!(text.contains("portwatch_endpoint_up{endpoint=\"web1\",address=\"example.test:80\"} 0"));
    assert!(text.contains("state=\"idle\"} 1"));
    assert!(text.ends_with("# EOF\n"));
}

#[tokio::test]
async fn create_endpoint_returns_201() {
    let app = app();
    let resp = app.oneshot(create_web1()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = body_json(resp.into_body()).await;
    assert_eq!(body["display_name"], "web1");
    assert_eq!(body["hostname"], "example.test");
    assert_eq!(body["port"], 80);
    assert_eq!(body["down"], false);
    assert_eq!(body["downtime"], 0);
}

#[tokio::test]
async fn create_endpoint_seeds_down_from_probe() {
    let (app, _, _) = app_with(false);
    let resp = app
        .oneshot(json_request(
            "POST",
            "/api/v1/endpoints",
            Some(json!({ "display_name": "db", "hostname": "db.example.test" })),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = body_json(resp.into_body()).await;
    assert_eq!(body["down"], true);
    assert_eq!(body["port"], 80);
}

#[tokio::test]
async fn create_endpoint_rejects_duplicate() {
    let app = app();
    let resp = app.clone().oneshot(create_web1()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/endpoints",
            Some(json!({ "display_name": "web1", "hostname": "other.test", "port": 443 })),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body = body_json(resp.into_body()).await;
    assert_eq!(body["error"], "conflict");
    assert_eq!(body["message"], "That monitor already exists.");

    let resp = app
        .oneshot(json_request("GET", "/api/v1/endpoints/web1", None))
        .await
        .unwrap();
    let body = body_json(resp.into_body()).await;
    assert_eq!(body["hostname"], "example.test");
    assert_eq!(body["port"], 80);
}

#[tokio::test]
async fn create_endpoint_rejects_missing_fields() {
    let app = app();
    let resp = app
        .oneshot(json_request(
            "POST",
            "/api/v1/endpoints",
            Some(json!({ "display_name": "web1" })),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp.into_body()).await;
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn create_endpoint_rejects_blank_name_and_port_zero() {
    let app = app();
    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/endpoints",
            Some(json!({ "display_name": "  ", "hostname": "example.test" })),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .oneshot(json_request(
            "POST",
            "/api/v1/endpoints",
            Some(json!({ "display_name": "web1", "hostname": "example.test", "port": 0 })),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn persistence_failure_is_generic_500() {
    let probe = Arc::new(SwitchProbe(AtomicBool::new(true)));
    let app = build_app(AppState::new(monitor_with(Arc::new(BrokenStore), probe)));

    let resp = app.clone().oneshot(create_web1()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(resp.into_body()).await;
    assert_eq!(body["error"], "internal_error");
    assert!(!body["message"].as_str().unwrap().contains("locked"));

    let resp = app
        .oneshot(json_request("GET", "/api/v1/endpoints", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn list_endpoints_empty() {
    let app = app();
    let resp = app
        .oneshot(json_request("GET", "/api/v1/endpoints", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp.into_body()).await;
    assert_eq!(body["endpoints"], json!([]));
}

#[tokio::test]
async fn get_endpoint_not_found() {
    let app = app();
    let resp = app
        .oneshot(json_request("GET", "/api/v1/endpoints/ghost", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = body_json(resp.into_body()).await;
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn endpoint_lifecycle() {
    let (app, monitor, probe) = app_with(true);

    let resp = app.clone().oneshot(create_web1()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = app
        .clone()
        .oneshot(json_request("GET", "/api/v1/endpoints", None))
        .await
        .unwrap();
    let body = body_json(resp.into_body()).await;
    assert_eq!(body["endpoints"].as_array().unwrap().len(), 1);

    // Drive one tick with the endpoint failing and observe the transition.
    probe.0.store(false, Ordering::SeqCst);
    monitor.tick().await;

    let resp = app
        .clone()
        .oneshot(json_request("GET", "/api/v1/endpoints/web1", None))
        .await
        .unwrap();
    let body = body_json(resp.into_body()).await;
    assert_eq!(body["down"], true);
    assert_eq!(body["downtime"], 1);

    let resp = app
        .clone()
        .oneshot(json_request("GET", "/api/v1/monitor/events", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp.into_body()).await;
    assert_eq!(body["events"].as_array().unwrap().len(), 1);
    assert_eq!(body["events"][0]["kind"], "down");
    assert_eq!(body["events"][0]["endpoint_name"], "web1");

    let resp = app
        .clone()
        .oneshot(json_request("DELETE", "/api/v1/endpoints/web1", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp.into_body()).await;
    assert_eq!(body["display_name"], "web1");

    let resp = app
        .oneshot(json_request("DELETE", "/api/v1/endpoints/web1", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn monitor_status_reports_state_and_config() {
    let (app, monitor, _) = app_with(true);
    monitor.tick().await;

    let resp = app
        .oneshot(json_request("GET", "/api/v1/monitor", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp.into_body()).await;
    assert_eq!(body["id"], monitor.id().to_string());
    assert_eq!(body["state"], "idle");
    assert_eq!(body["tick_count"], 1);
    assert_eq!(body["check_duration_secs"], 60);
    assert_eq!(body["probe_timeout_ms"], 500);
    assert_eq!(body["endpoint_count"], 0);
    assert!(body["last_checked"].is_string());
}

#[tokio::test]
async fn lookup_requires_host() {
    let app = app();
    let resp = app
        .clone()
        .oneshot(json_request("GET", "/api/v1/lookup", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp.into_body()).await;
    assert_eq!(body["message"], "You must specify an IP address first!");

    let resp = app
        .oneshot(json_request("GET", "/api/v1/lookup?host=bad%20host", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn lookup_probes_and_geolocates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/127.0.0.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "city": "Frankfurt am Main",
            "regionName": "Hesse",
            "country": "Germany",
            "as": "AS3320 Deutsche Telekom AG",
            "timezone": "Europe/Berlin"
        })))
        .mount(&server)
        .await;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let (_, monitor, _) = app_with(true);
    let lookup = Lookup::new(Duration::from_secs(2))
        .with_geo_api(reqwest::Client::new(), format!("{}/json/", server.uri()));
    let app = build_app(AppState::new(monitor).with_lookup(lookup));

    let resp = app
        .oneshot(json_request(
            "GET",
            &format!("/api/v1/lookup?host=127.0.0.1&port={}", port),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp.into_body()).await;
    assert_eq!(body["host"], "127.0.0.1");
    assert_eq!(body["address_family"], "ipv4");
    assert_eq!(body["reachable"], true);
    assert_eq!(body["geo"]["city"], "Frankfurt am Main");
    assert_eq!(body["geo"]["regionName"], "Hesse");
    assert_eq!(body["geo"]["as"], "AS3320 Deutsche Telekom AG");
}

#[tokio::test]
async fn lookup_without_geo_api_returns_null_geo() {
    let app = app();
    let resp = app
        .oneshot(json_request("GET", "/api/v1/lookup?host=127.0.0.1&port=9", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp.into_body()).await;
    assert_eq!(body["port"], 9);
    assert!(body["geo"].is_null());
}
