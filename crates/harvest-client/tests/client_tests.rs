//! HTTP behaviour of `ApiClient` against a mock server.

use std::sync::Arc;
use std::time::{Duration, Instant};

use harvest_client::{ApiClient, ApiError, ClientConfig, Endpoint, Page, Params};
use harvest_models::{BackoffSchedule, ErrorClass, OperationType};
use harvest_monitor::TimeoutMonitor;
use serde::Deserialize;
use serde_json::json;
use tokio_test::assert_err;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// =============================================================================
// Test Helpers
// =============================================================================

fn test_config(base_url: &str) -> ClientConfig {
    ClientConfig {
        base_url: base_url.to_string(),
        requests_per_second: 1_000.0,
        max_attempts: 4,
        backoff: BackoffSchedule::new(Duration::from_millis(20), Duration::from_millis(500)),
        call_timeout: Duration::from_secs(2),
        connect_timeout: Duration::from_secs(1),
    }
}

fn expenses() -> Endpoint {
    Endpoint::new("despesas", "/deputados/{id}/despesas").with_default("itens", 100)
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.map(|r| r.len()).unwrap_or(0)
}

// =============================================================================
// Retry Policy
// =============================================================================

#[tokio::test]
async fn test_transient_failures_then_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/deputados/1/despesas"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/deputados/1/despesas"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"dados": [{"id": 1}]})))
        .mount(&server)
        .await;

    let client = ApiClient::new(test_config(&server.uri())).unwrap();
    let started = Instant::now();
    let payload = client
        .fetch(&expenses(), &Params::new().with("id", 1))
        .await
        .unwrap();

    assert_eq!(payload["dados"][0]["id"], 1);
    assert_eq!(request_count(&server).await, 3);
    // 20ms after attempt 1, 40ms after attempt 2
    assert!(started.elapsed() >= Duration::from_millis(60));
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let client = ApiClient::new(test_config(&server.uri())).unwrap();
    let err = assert_err!(client.fetch(&expenses(), &Params::new().with("id", 999)).await);

    assert!(matches!(err, ApiError::Client { status: 404, .. }));
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn test_malformed_response_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let client = ApiClient::new(test_config(&server.uri())).unwrap();
    let err = assert_err!(client.fetch(&expenses(), &Params::new().with("id", 1)).await);

    assert_eq!(err.class(), ErrorClass::Malformed);
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn test_exhaustion_reports_last_error_and_emits_event() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("database down"))
        .mount(&server)
        .await;

    let monitor = Arc::new(TimeoutMonitor::default());
    let client = ApiClient::new(ClientConfig {
        max_attempts: 3,
        ..test_config(&server.uri())
    })
    .unwrap()
    .with_monitor(Arc::clone(&monitor));

    let err = assert_err!(client.fetch(&expenses(), &Params::new().with("id", 1)).await);

    match &err {
        ApiError::Exhausted {
            attempts,
            class,
            message,
        } => {
            assert_eq!(*attempts, 3);
            assert_eq!(*class, ErrorClass::ServerError);
            assert!(message.contains("database down"));
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }
    assert_eq!(request_count(&server).await, 3);

    let events = monitor.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].operation_type, OperationType::ClientCall);
    assert_eq!(events[0].error_class, ErrorClass::ServerError);
}

#[tokio::test]
async fn test_timeouts_are_reported_per_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"dados": []}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let monitor = Arc::new(TimeoutMonitor::default());
    let client = ApiClient::new(ClientConfig {
        max_attempts: 2,
        call_timeout: Duration::from_millis(100),
        ..test_config(&server.uri())
    })
    .unwrap()
    .with_monitor(Arc::clone(&monitor));

    let err = assert_err!(client.fetch(&expenses(), &Params::new().with("id", 1)).await);

    assert_eq!(err.class(), ErrorClass::Timeout);
    assert!(matches!(err, ApiError::Exhausted { attempts: 2, .. }));

    let analysis = monitor.analyze(None);
    assert_eq!(analysis.total_timeouts, 2);
    assert_eq!(analysis.dominant_error_class, Some(ErrorClass::Timeout));
}

#[tokio::test]
async fn test_rate_limit_honors_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"dados": []})))
        .mount(&server)
        .await;

    let client = ApiClient::new(test_config(&server.uri())).unwrap();
    let started = Instant::now();
    client
        .fetch(&expenses(), &Params::new().with("id", 1))
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(request_count(&server).await, 2);
}

// =============================================================================
// Rate Gate
// =============================================================================

#[tokio::test]
async fn test_sustained_calls_respect_rate() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"dados": []})))
        .mount(&server)
        .await;

    let client = ApiClient::new(ClientConfig {
        requests_per_second: 20.0,
        ..test_config(&server.uri())
    })
    .unwrap();

    let started = Instant::now();
    let calls: Vec<_> = (0..6)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .fetch(&expenses(), &Params::new().with("id", i))
                    .await
            })
        })
        .collect();
    for call in calls {
        call.await.unwrap().unwrap();
    }

    // six calls need five 50ms gaps
    assert!(started.elapsed() >= Duration::from_millis(250));
    assert_eq!(request_count(&server).await, 6);
}

// =============================================================================
// Requests and payloads
// =============================================================================

#[tokio::test]
async fn test_default_and_extra_query_params_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/deputados/7/despesas"))
        .and(query_param("itens", "100"))
        .and(query_param("pagina", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "dados": [{"id": 10}, {"id": 11}],
            "links": [{"rel": "next", "href": "x?pagina=3"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(test_config(&server.uri())).unwrap();
    let payload = client
        .fetch(&expenses(), &Params::new().with("id", 7).with("pagina", 2))
        .await
        .unwrap();

    let page = Page::from_payload(&payload, "dados").unwrap();
    assert_eq!(page.len(), 2);
    assert!(page.has_next());
}

#[tokio::test]
async fn test_fetch_json_typed() {
    #[derive(Debug, Deserialize)]
    struct Listing {
        dados: Vec<Entry>,
    }

    #[derive(Debug, Deserialize)]
    struct Entry {
        id: u64,
        nome: String,
    }

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/deputados"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "dados": [{"id": 204554, "nome": "Fulana"}]
        })))
        .mount(&server)
        .await;

    let client = ApiClient::new(test_config(&server.uri())).unwrap();
    let listing: Listing = client
        .fetch_json(&Endpoint::new("deputados", "/deputados"), &Params::new())
        .await
        .unwrap();

    assert_eq!(listing.dados.len(), 1);
    assert_eq!(listing.dados[0].id, 204554);
    assert_eq!(listing.dados[0].nome, "Fulana");
}
