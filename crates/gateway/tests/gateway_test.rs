//! End-to-end behavior of the gateway pipeline against a mock portal.
//!
//! wiremock covers the HTTP status and retry scenarios. The size-guard
//! scenarios need a server that can declare lengths it never sends or
//! stream chunks forever, which wiremock will not do, so those use raw
//! TCP responders.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use portico_gateway::{
    GatewayClient, GatewayConfig, GatewayError, GatewayResources, Params, TelemetrySink,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Config with ample rate budget and fast backoff so tests exercise one
/// concern at a time.
fn test_config(base_url: &str) -> GatewayConfig {
    GatewayConfig::builder(base_url)
        .timeout(Duration::from_secs(5))
        .base_delay(Duration::from_millis(25))
        .max_delay(Duration::from_millis(200))
        .rate_tokens(50)
        .rate_interval(Duration::from_millis(100))
        .build()
        .expect("valid test config")
}

fn test_client(base_url: &str) -> GatewayClient {
    GatewayClient::new(test_config(base_url)).expect("client builds")
}

/// Serve one request with a Content-Length header and no body.
async fn spawn_declaring_server(declared: u64) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut head = [0u8; 1024];
            let _ = socket.read(&mut head).await;

            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/ld+json\r\ncontent-length: {declared}\r\n\r\n"
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.flush().await;

            // Hold the socket so the client sees headers, not an early EOF.
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    });

    format!("http://{addr}/")
}

/// Serve one request with a chunked body of `max_chunks` chunks, counting
/// how many were actually written before the client went away.
async fn spawn_chunked_server(chunk_size: usize, max_chunks: usize) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let served = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&served);

    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut head = [0u8; 1024];
            let _ = socket.read(&mut head).await;

            let response =
                "HTTP/1.1 200 OK\r\ncontent-type: application/ld+json\r\ntransfer-encoding: chunked\r\n\r\n";
            if socket.write_all(response.as_bytes()).await.is_err() {
                return;
            }

            let payload = vec![b'x'; chunk_size];
            let chunk_head = format!("{chunk_size:x}\r\n");
            for _ in 0..max_chunks {
                if socket.write_all(chunk_head.as_bytes()).await.is_err()
                    || socket.write_all(&payload).await.is_err()
                    || socket.write_all(b"\r\n").await.is_err()
                    || socket.flush().await.is_err()
                {
                    return;
                }
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            let _ = socket.write_all(b"0\r\n\r\n").await;
        }
    });

    (format!("http://{addr}/"), served)
}

#[derive(Debug, Default)]
struct RecordingSink {
    seen: Mutex<Vec<(String, Duration)>>,
}

impl TelemetrySink for RecordingSink {
    fn record_operation(&self, operation: &str, duration: Duration) {
        self.seen.lock().unwrap().push((operation.to_string(), duration));
    }
}

#[tokio::test]
async fn second_call_within_ttl_hits_the_cache() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param("limit", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": 1}, {"id": 2}],
            "total": 2
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());

    let first: Value = client.get("items", Params::new().with("limit", 10)).await.unwrap();
    let second: Value = client.get("items", Params::new().with("limit", 10)).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first["total"], json!(2));

    let stats = client.cache_stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.size, 1);
}

#[tokio::test]
async fn different_params_are_distinct_cache_entries() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(2)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());

    let _: Value = client.get("items", Params::new().with("limit", 10)).await.unwrap();
    let _: Value = client.get("items", Params::new().with("limit", 20)).await.unwrap();

    assert_eq!(client.cache_stats().size, 2);
}

#[tokio::test]
async fn declared_oversize_is_rejected_before_the_body() {
    // Declares 20 MB against the default 10 MiB cap; sends nothing.
    let base_url = spawn_declaring_server(20_000_000).await;
    let client = test_client(&base_url);

    let started = Instant::now();
    let result: Result<Value, _> = client.get("data", Params::new()).await;

    match result {
        Err(GatewayError::PayloadTooLarge { limit, declared, .. }) => {
            assert_eq!(limit, 10 * 1024 * 1024);
            assert_eq!(declared, Some(20_000_000));
        }
        other => panic!("expected PayloadTooLarge, got {other:?}"),
    }

    // Rejected from the headers alone; no 20 MB transfer happened.
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn chunked_overflow_aborts_mid_stream() {
    init_tracing();

    // 64 chunks of 16 KiB against a 100 kB cap; the guard trips around
    // chunk seven.
    let (base_url, served) = spawn_chunked_server(16 * 1024, 64).await;

    let config = GatewayConfig::builder(&base_url)
        .max_response_bytes(100_000)
        .build()
        .unwrap();
    let client = GatewayClient::new(config).unwrap();

    let result: Result<Value, _> = client.get("data", Params::new()).await;

    match result {
        Err(GatewayError::PayloadTooLarge { limit, declared, .. }) => {
            assert_eq!(limit, 100_000);
            assert_eq!(declared, None);
        }
        other => panic!("expected PayloadTooLarge, got {other:?}"),
    }

    // Give the server a moment to notice the aborted connection.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let written = served.load(Ordering::SeqCst);
    assert!(written < 32, "transfer was not aborted, server wrote {written} chunks");
}

#[tokio::test]
async fn transient_server_errors_retry_until_success() {
    init_tracing();
    let server = MockServer::start().await;

    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = Arc::clone(&hits);
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(move |_: &Request| {
            let attempt = hits_clone.fetch_add(1, Ordering::SeqCst);
            if attempt < 2 {
                ResponseTemplate::new(503)
            } else {
                ResponseTemplate::new(200).set_body_json(json!({"recovered": true}))
            }
        })
        .expect(3)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());

    let started = Instant::now();
    let value: Value = client.get("flaky", Params::new()).await.unwrap();

    assert_eq!(value, json!({"recovered": true}));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    // Two backoffs at 25 ms and 50 ms.
    assert!(started.elapsed() >= Duration::from_millis(70));
}

#[tokio::test]
async fn exhausted_retries_surface_the_last_upstream_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let config = GatewayConfig::builder(&server.uri())
        .base_delay(Duration::from_millis(10))
        .max_delay(Duration::from_millis(40))
        .max_retries(2)
        .build()
        .unwrap();
    let client = GatewayClient::new(config).unwrap();

    let result: Result<Value, _> = client.get("down", Params::new()).await;

    match result {
        Err(GatewayError::Upstream { status, .. }) => assert_eq!(status, 503),
        other => panic!("expected Upstream, got {other:?}"),
    }
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn client_errors_fail_fast_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());

    let result: Result<Value, _> = client.get("missing", Params::new()).await;

    match &result {
        Err(error @ GatewayError::Upstream { status, .. }) => {
            assert_eq!(*status, 404);
            assert_eq!(error.status_code(), Some(404));
        }
        other => panic!("expected Upstream, got {other:?}"),
    }
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn retry_disabled_means_a_single_attempt() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let config = GatewayConfig::builder(&server.uri()).enable_retry(false).build().unwrap();
    let client = GatewayClient::new(config).unwrap();

    let result: Result<Value, _> = client.get("down", Params::new()).await;

    assert!(matches!(result, Err(GatewayError::Upstream { status: 503, .. })));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn tokens_are_paid_before_the_cache() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    // Two tokens with a far-off refill: enough for exactly two calls.
    let config = GatewayConfig::builder(&server.uri())
        .rate_tokens(2)
        .rate_interval(Duration::from_secs(600))
        .build()
        .unwrap();
    let client = GatewayClient::new(config).unwrap();

    let _: Value = client.get("items", Params::new()).await.unwrap();
    let _: Value = client.get("items", Params::new()).await.unwrap();

    // The second call was a cache hit yet still paid a token.
    assert_eq!(client.cache_stats().hits, 1);
    assert_eq!(client.resources().bucket().available(), 0);
}

#[tokio::test]
async fn empty_bucket_defers_calls_until_refill() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(3)
        .mount(&server)
        .await;

    let config = GatewayConfig::builder(&server.uri())
        .rate_tokens(1)
        .rate_interval(Duration::from_millis(150))
        .build()
        .unwrap();
    let client = GatewayClient::new(config).unwrap();

    let started = Instant::now();
    for limit in [1, 2, 3] {
        let _: Value = client.get("items", Params::new().with("limit", limit)).await.unwrap();
    }

    // Calls two and three each waited for a refill.
    assert!(started.elapsed() >= Duration::from_millis(250));
}

#[tokio::test]
async fn sub_clients_share_rate_limit_and_cache() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/records"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"rows": 5})))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server.uri());
    let resources = GatewayResources::new(&config).unwrap();

    let datasets = GatewayClient::with_resources(config.clone(), resources.clone()).unwrap();
    let records = GatewayClient::with_resources(config, resources).unwrap();

    let from_first: Value = datasets.get("records", Params::new()).await.unwrap();
    let from_second: Value = records.get("records", Params::new()).await.unwrap();

    assert_eq!(from_first, from_second);

    // One fetch total: the second client was served by the shared cache.
    let stats = records.cache_stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
}

#[tokio::test]
async fn expired_entries_are_refetched() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(2)
        .mount(&server)
        .await;

    let config = GatewayConfig::builder(&server.uri())
        .cache_ttl(Duration::from_millis(100))
        .build()
        .unwrap();
    let client = GatewayClient::new(config).unwrap();

    let _: Value = client.get("items", Params::new()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;
    let _: Value = client.get("items", Params::new()).await.unwrap();

    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn clear_cache_forces_a_refetch() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(2)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());

    let _: Value = client.get("items", Params::new()).await.unwrap();
    client.clear_cache();
    let _: Value = client.get("items", Params::new()).await.unwrap();

    assert_eq!(server.received_requests().await.unwrap().len(), 2);
    assert_eq!(client.cache_stats().misses, 2);
}

#[tokio::test]
async fn deadline_exceeded_aborts_and_never_retries() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"ok": true}))
                .set_delay(Duration::from_millis(500)),
        )
        .expect(1)
        .mount(&server)
        .await;

    // Retry is on; a deadline must stop the pipeline anyway.
    let config = GatewayConfig::builder(&server.uri())
        .timeout(Duration::from_millis(100))
        .max_retries(3)
        .base_delay(Duration::from_millis(10))
        .max_delay(Duration::from_millis(40))
        .build()
        .unwrap();
    let client = GatewayClient::new(config).unwrap();

    let started = Instant::now();
    let result: Result<Value, _> = client.get("slow", Params::new()).await;

    match result {
        Err(GatewayError::DeadlineExceeded { timeout, .. }) => {
            assert_eq!(timeout, Duration::from_millis(100));
        }
        other => panic!("expected DeadlineExceeded, got {other:?}"),
    }
    // One attempt, no backoff sleeps.
    assert!(started.elapsed() < Duration::from_millis(400));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn connection_refused_maps_to_transport() {
    // Bind then drop to get a port nothing listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = GatewayConfig::builder(format!("http://{addr}/"))
        .enable_retry(false)
        .build()
        .unwrap();
    let client = GatewayClient::new(config).unwrap();

    let result: Result<Value, _> = client.get("items", Params::new()).await;

    match result {
        Err(error @ GatewayError::Transport { .. }) => {
            assert!(error.is_retryable());
            assert_eq!(error.status_code(), None);
        }
        other => panic!("expected Transport, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_json_maps_to_decode_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());

    let result: Result<Value, _> = client.get("broken", Params::new()).await;

    assert!(matches!(result, Err(GatewayError::Decode { .. })));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn responses_decode_into_caller_types() {
    #[derive(Debug, Deserialize, PartialEq)]
    struct Catalog {
        name: String,
        datasets: Vec<String>,
    }

    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/catalog"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "city-data",
            "datasets": ["air-quality", "traffic"]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());

    let catalog: Catalog = client.get("catalog", Params::new()).await.unwrap();
    assert_eq!(
        catalog,
        Catalog {
            name: "city-data".to_string(),
            datasets: vec!["air-quality".to_string(), "traffic".to_string()],
        }
    );
}

#[tokio::test]
async fn type_mismatches_surface_as_decode_errors() {
    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Expected {
        count: u64,
    }

    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/shape"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": "not a number"})))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());

    let result: Result<Expected, _> = client.get("shape", Params::new()).await;
    assert!(matches!(result, Err(GatewayError::Decode { .. })));
}

#[tokio::test]
async fn telemetry_records_every_call() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let sink = Arc::new(RecordingSink::default());
    let client = test_client(&server.uri())
        .with_telemetry(Arc::clone(&sink) as Arc<dyn TelemetrySink>);

    let _: Value = client.get("items", Params::new()).await.unwrap();
    let _: Result<Value, _> = client.get("missing", Params::new()).await;

    let seen = sink.seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].0, "items");
    assert_eq!(seen[1].0, "missing");
}

#[tokio::test]
async fn requests_carry_the_portal_headers() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .and(wiremock::matchers::header("accept", "application/ld+json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let _: Value = client.get("items", Params::new()).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let user_agent = requests[0]
        .headers
        .get("user-agent")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    assert!(user_agent.starts_with("portico-gateway/"));
}
