//! End-to-end tests for the request forwarder against mock backends.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cert_relay::config::RelayConfig;
use cert_relay::routing::{
    CERTIFICATE_HEADER, CLIENT_ID_HEADER, CLIENT_SECRET_HEADER, DIR_BASE_HEADER, FILE_NAME_HEADER,
};
use cert_relay::{ApiError, RequestForwarder};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde::{Deserialize, Serialize};

mod common;
use common::RecordedRequest;

#[derive(Debug, Serialize)]
struct NewOrder {
    sku: &'static str,
    quantity: u32,
}

#[derive(Debug, Deserialize, PartialEq)]
struct Order {
    id: u32,
}

#[derive(Debug, Deserialize)]
struct Outcome {
    status: String,
}

#[derive(Debug, Deserialize)]
struct Problem {
    message: String,
}

fn config_for(addr: SocketAddr) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.client.base_domain = Some(format!("http://{addr}/"));
    config.client.timeout_secs = 10;
    config.resilience.base_delay_ms = 10;
    config.resilience.max_delay_ms = 50;
    config.resilience.attempt_timeout_ms = 2_000;
    config.resilience.jitter = false;
    config
}

fn routing_headers(file_name: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CLIENT_ID_HEADER, HeaderValue::from_static(common::FIXTURE_IDENTITY));
    headers.insert(CLIENT_SECRET_HEADER, HeaderValue::from_static(common::FIXTURE_PASSPHRASE));
    headers.insert(DIR_BASE_HEADER, HeaderValue::from_static(common::FIXTURE_DIR));
    headers.insert(FILE_NAME_HEADER, HeaderValue::from_str(file_name).unwrap());
    headers
}

#[tokio::test]
async fn test_post_retries_through_transient_failures() {
    let calls = Arc::new(AtomicU32::new(0));
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let (c, b) = (calls.clone(), bodies.clone());
    let addr = common::start_recording_backend(move |req: RecordedRequest| {
        let (c, b) = (c.clone(), b.clone());
        async move {
            b.lock().unwrap().push(req.body.clone());
            if c.fetch_add(1, Ordering::SeqCst) < 2 {
                (503, String::new())
            } else {
                (200, r#"{"status":"ok"}"#.to_string())
            }
        }
    })
    .await;

    let mut config = config_for(addr);
    config.resilience.base_delay_ms = 100;
    config.resilience.max_delay_ms = 1_000;
    let forwarder = RequestForwarder::new(&config).unwrap();

    let started = Instant::now();
    let outcome: Outcome = forwarder
        .post("orders", &NewOrder { sku: "A1", quantity: 2 }, Some("t1"))
        .await
        .unwrap();

    assert_eq!(outcome.status, "ok");
    assert!(started.elapsed() >= Duration::from_millis(300), "backoff 100ms then 200ms");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let bodies = bodies.lock().unwrap();
    assert_eq!(bodies.len(), 3);
    for body in bodies.iter() {
        assert_eq!(body.as_slice(), br#"{"sku":"A1","quantity":2}"#);
    }
}

#[tokio::test]
async fn test_not_found_without_body_is_typed_error() {
    let addr = common::start_programmable_backend(|| async { (404, String::new()) }).await;
    let forwarder = RequestForwarder::new(&config_for(addr)).unwrap();

    let err = forwarder.get::<Order>("orders/9", "token").await.unwrap_err();
    match err {
        ApiError::NotFound { endpoint } => assert_eq!(endpoint, "orders/9"),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_error_status_with_body_is_returned_as_payload() {
    let addr = common::start_programmable_backend(|| async {
        (404, r#"{"message":"no such order"}"#.to_string())
    })
    .await;
    let forwarder = RequestForwarder::new(&config_for(addr)).unwrap();

    let problem: Problem = forwarder.get("orders/9", "token").await.unwrap();
    assert_eq!(problem.message, "no such order");
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let c = calls.clone();
    let addr = common::start_programmable_backend(move || {
        let c = c.clone();
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            (400, String::new())
        }
    })
    .await;
    let forwarder = RequestForwarder::new(&config_for(addr)).unwrap();

    let err = forwarder.get::<Order>("orders", "").await.unwrap_err();
    assert!(matches!(err, ApiError::BadRequest { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_exhausted_retries_classify_last_response() {
    let calls = Arc::new(AtomicU32::new(0));
    let c = calls.clone();
    let addr = common::start_programmable_backend(move || {
        let c = c.clone();
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            (503, String::new())
        }
    })
    .await;
    let forwarder = RequestForwarder::new(&config_for(addr)).unwrap();

    let err = forwarder.get::<Order>("orders", "").await.unwrap_err();
    assert!(matches!(err, ApiError::ServiceUnavailable { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_open_circuit_fails_fast_without_dispatch() {
    let calls = Arc::new(AtomicU32::new(0));
    let c = calls.clone();
    let addr = common::start_programmable_backend(move || {
        let c = c.clone();
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            (500, String::new())
        }
    })
    .await;
    let mut config = config_for(addr);
    config.resilience.max_retries = 0;
    config.resilience.breaker_threshold = 2;
    config.resilience.breaker_cooldown_ms = 60_000;
    let forwarder = RequestForwarder::new(&config).unwrap();

    for _ in 0..2 {
        let err = forwarder.get::<Order>("orders", "").await.unwrap_err();
        assert!(matches!(err, ApiError::InternalServerFault { .. }));
    }

    let err = forwarder.get::<Order>("orders", "").await.unwrap_err();
    assert!(err.is_circuit_open(), "expected CircuitOpen, got {err:?}");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unreachable_backend_is_transport_error() {
    let addr = common::closed_port().await;
    let mut config = config_for(addr);
    config.resilience.max_retries = 1;
    let forwarder = RequestForwarder::new(&config).unwrap();

    let err = forwarder.get::<Order>("orders", "").await.unwrap_err();
    assert!(matches!(err, ApiError::Transport { .. }), "got {err:?}");
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let addr = common::start_programmable_backend(|| async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        (200, r#"{"id":1}"#.to_string())
    })
    .await;
    let mut config = config_for(addr);
    config.resilience.attempt_timeout_ms = 100;
    config.resilience.max_retries = 1;
    let forwarder = RequestForwarder::new(&config).unwrap();

    let err = forwarder.get::<Order>("orders", "").await.unwrap_err();
    assert!(matches!(err, ApiError::Timeout { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_unset_base_domain_is_configuration_error() {
    let forwarder = RequestForwarder::new(&RelayConfig::default()).unwrap();
    let err = forwarder.get::<Order>("orders", "").await.unwrap_err();
    assert!(matches!(err, ApiError::Configuration(_)));
}

#[tokio::test]
async fn test_bearer_token_and_default_headers_are_sent() {
    let seen = Arc::new(Mutex::new(None));
    let s = seen.clone();
    let addr = common::start_recording_backend(move |req: RecordedRequest| {
        let s = s.clone();
        async move {
            *s.lock().unwrap() = Some(req);
            (200, r#"{"id":7}"#.to_string())
        }
    })
    .await;
    let forwarder = RequestForwarder::new(&config_for(addr)).unwrap();

    let _: Order = forwarder.get("orders/7", "tok-123").await.unwrap();
    let req = seen.lock().unwrap().take().unwrap();
    assert_eq!(req.method, "GET");
    assert_eq!(req.target, "/orders/7");
    assert_eq!(req.header("authorization"), Some("Bearer tok-123"));
    assert_eq!(req.header("accept"), Some("application/json"));
}

#[tokio::test]
async fn test_certificate_bound_call_reuses_cached_client() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    let addr = common::start_recording_backend(move |req: RecordedRequest| {
        let s = s.clone();
        async move {
            s.lock().unwrap().push(req);
            (200, r#"{"id":1}"#.to_string())
        }
    })
    .await;
    let forwarder = RequestForwarder::new(&config_for(addr)).unwrap();
    let routing = routing_headers("client.p12");

    for _ in 0..2 {
        let reply = forwarder
            .send::<Order>(Method::GET, "orders/1", None, None, Some(&routing))
            .await
            .unwrap();
        assert_eq!(reply.payload, Order { id: 1 });
        assert_eq!(reply.content_type.as_deref(), Some("application/json"));
    }

    let components = forwarder.components();
    assert_eq!(components.certificates.decode_count(), 1);
    assert_eq!(components.clients.len(), 1);
    let identities: Vec<String> = components
        .clients
        .identities()
        .iter()
        .map(|i| i.to_string())
        .collect();
    assert_eq!(identities, vec![common::FIXTURE_IDENTITY.to_string()]);

    for req in seen.lock().unwrap().iter() {
        assert_eq!(req.header(CLIENT_ID_HEADER), None);
        assert_eq!(req.header(CLIENT_SECRET_HEADER), None);
    }
}

#[tokio::test]
async fn test_concurrent_first_calls_decode_once() {
    let addr =
        common::start_programmable_backend(|| async { (200, r#"{"id":1}"#.to_string()) }).await;
    let forwarder = Arc::new(RequestForwarder::new(&config_for(addr)).unwrap());
    let routing = routing_headers("client.p12");

    let calls = (0..8).map(|_| {
        let forwarder = forwarder.clone();
        let routing = routing.clone();
        async move {
            forwarder
                .send::<Order>(Method::GET, "orders/1", None, None, Some(&routing))
                .await
        }
    });
    let results = futures_util::future::join_all(calls).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(forwarder.components().certificates.decode_count(), 1);
    assert_eq!(forwarder.components().clients.len(), 1);
}

#[tokio::test]
async fn test_missing_certificate_file_is_not_dispatched() {
    let calls = Arc::new(AtomicU32::new(0));
    let c = calls.clone();
    let addr = common::start_programmable_backend(move || {
        let c = c.clone();
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            (200, r#"{"id":1}"#.to_string())
        }
    })
    .await;
    let forwarder = RequestForwarder::new(&config_for(addr)).unwrap();

    let err = forwarder
        .send::<Order>(Method::GET, "orders/1", None, None, Some(&routing_headers("missing.p12")))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::CertificateNotFound { .. }), "got {err:?}");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_download_returns_raw_bytes() {
    let addr =
        common::start_programmable_backend(|| async { (200, "raw-report".to_string()) }).await;
    let forwarder = RequestForwarder::new(&config_for(addr)).unwrap();

    let download = forwarder.download("reports/1", Some("tok")).await.unwrap();
    assert_eq!(&download.content[..], b"raw-report");
    assert_eq!(download.content_type, "application/json");

    let err = RequestForwarder::new(&RelayConfig::default())
        .unwrap()
        .download("reports/1", None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Configuration(_)));
}

#[tokio::test]
async fn test_reset_switches_to_new_base_domain() {
    let first =
        common::start_programmable_backend(|| async { (200, r#"{"id":1}"#.to_string()) }).await;
    let second =
        common::start_programmable_backend(|| async { (200, r#"{"id":2}"#.to_string()) }).await;
    let forwarder = RequestForwarder::new(&config_for(first)).unwrap();

    let order: Order = forwarder.get("orders", "").await.unwrap();
    assert_eq!(order.id, 1);

    forwarder.set_base_domain(format!("http://{second}/"));
    let order: Order = forwarder.get("orders", "").await.unwrap();
    assert_eq!(order.id, 1, "target is fixed until reset");

    forwarder.reset();
    let order: Order = forwarder.get("orders", "").await.unwrap();
    assert_eq!(order.id, 2);
}

fn mtls_config_for(addr: SocketAddr) -> RelayConfig {
    let mut config = config_for(addr);
    config.client.base_domain = Some(format!("https://{addr}/"));
    config.client.root_certificates = vec![common::fixture_ca_path()];
    config.resilience.max_retries = 0;
    config
}

#[tokio::test]
async fn test_certificate_bound_call_presents_client_certificate() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    let addr = common::start_mtls_backend(move |req: RecordedRequest| {
        let s = s.clone();
        async move {
            s.lock().unwrap().push(req);
            (200, r#"{"id":1}"#.to_string())
        }
    })
    .await;
    let forwarder = RequestForwarder::new(&mtls_config_for(addr)).unwrap();

    let reply = forwarder
        .send::<Order>(Method::GET, "orders/1", None, None, Some(&routing_headers("client.p12")))
        .await
        .unwrap();
    assert_eq!(reply.payload, Order { id: 1 });

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(
        seen[0].peer_certificate.as_deref(),
        Some(common::fixture_client_certificate().as_slice())
    );
}

#[tokio::test]
async fn test_default_route_is_refused_by_backend_requiring_certificates() {
    let calls = Arc::new(AtomicU32::new(0));
    let c = calls.clone();
    let addr = common::start_mtls_backend(move |_| {
        let c = c.clone();
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            (200, r#"{"id":1}"#.to_string())
        }
    })
    .await;
    let forwarder = RequestForwarder::new(&mtls_config_for(addr)).unwrap();

    let err = forwarder.get::<Order>("orders/1", "token").await.unwrap_err();
    assert!(matches!(err, ApiError::Transport { .. }), "got {err:?}");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cached_identity_refuses_other_secret() {
    let calls = Arc::new(AtomicU32::new(0));
    let c = calls.clone();
    let addr = common::start_programmable_backend(move || {
        let c = c.clone();
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            (200, r#"{"id":1}"#.to_string())
        }
    })
    .await;
    let forwarder = RequestForwarder::new(&config_for(addr)).unwrap();
    forwarder
        .send::<Order>(Method::GET, "orders/1", None, None, Some(&routing_headers("client.p12")))
        .await
        .unwrap();

    let mut wrong = routing_headers("client.p12");
    wrong.insert(CLIENT_SECRET_HEADER, HeaderValue::from_static("WRONG"));
    let err = forwarder
        .send::<Order>(Method::GET, "orders/1", None, None, Some(&wrong))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::CertificateMismatch { .. }), "got {err:?}");

    let mut garbage = HeaderMap::new();
    garbage.insert(CLIENT_ID_HEADER, HeaderValue::from_static(common::FIXTURE_IDENTITY));
    garbage.insert(CLIENT_SECRET_HEADER, HeaderValue::from_static("WRONG"));
    garbage.insert(CERTIFICATE_HEADER, HeaderValue::from_static("Z2FyYmFnZQ=="));
    let err = forwarder
        .send::<Order>(Method::GET, "orders/1", None, None, Some(&garbage))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::CertificateMismatch { .. }), "got {err:?}");

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(forwarder.components().certificates.decode_count(), 1);
}
