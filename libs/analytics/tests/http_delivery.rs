//! End-to-end delivery through the reqwest transport against a mock collector.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use storefront_analytics::{
    EventLogger, EventName, FlushError, HttpBeacon, HttpTransport, InitOptions, Props, SignalHub,
};
use storefront_testing::{decode_batch, unsigned_token};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn logger(api_base: &str) -> EventLogger {
    EventLogger::builder(api_base)
        .flush_interval(Duration::from_secs(3600))
        .http_timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

async fn respond(server: &MockServer, endpoint: &str, status: u16) {
    Mock::given(method("POST"))
        .and(path(endpoint))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

async fn wait_for_requests(server: &MockServer, count: usize) -> Vec<wiremock::Request> {
    for _ in 0..100 {
        let received = server.received_requests().await.unwrap_or_default();
        if received.len() >= count {
            return received;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("collector did not receive {count} request(s)");
}

#[tokio::test]
async fn test_server_error_keeps_event_until_collector_recovers() {
    let server = MockServer::start().await;
    respond(&server, "/audit/events", 200).await;

    let logger = logger(&server.uri());
    logger.init(InitOptions::default(), SignalHub::new().subscribe());
    logger.flush(false).await.unwrap();
    assert_eq!(logger.queue_len(), 0);

    server.reset().await;
    respond(&server, "/audit/events", 500).await;

    let mut props = Props::new();
    props.insert("path".to_string(), json!("/"));
    logger.log(EventName::PageView, Some(props));

    let err = logger.flush(false).await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    let queued = logger.queued_events();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].name, EventName::PageView);

    server.reset().await;
    respond(&server, "/audit/events", 200).await;

    logger.flush(false).await.unwrap();
    assert_eq!(logger.queue_len(), 0);
}

#[tokio::test]
async fn test_request_carries_json_and_bearer_token() {
    let server = MockServer::start().await;
    let token = unsigned_token(&json!({"sid": "s1", "sub": "u1"}));

    Mock::given(method("POST"))
        .and(path("/audit/events"))
        .and(header("content-type", "application/json"))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let logger = logger(&server.uri());
    let bearer = token.clone();
    logger.init(
        InitOptions::default().with_access_token(move || Some(bearer.clone())),
        SignalHub::new().subscribe(),
    );
    logger.log(EventName::RegisterSuccess, None);
    logger.flush(false).await.unwrap();

    let received = server.received_requests().await.unwrap();
    let batch = decode_batch(&received[0].body);
    assert_eq!(batch.access_token.as_deref(), Some(token.as_str()));
    assert_eq!(batch.len(), 2);
    assert_eq!(batch.events[1].name, EventName::RegisterSuccess);
    assert_eq!(batch.events[1].sid.as_deref(), Some("s1"));
    assert_eq!(batch.events[1].user_id.as_deref(), Some("u1"));
}

#[tokio::test]
async fn test_anonymous_request_has_no_authorization() {
    let server = MockServer::start().await;
    respond(&server, "/audit/events", 200).await;

    let logger = logger(&server.uri());
    logger.init(InitOptions::default(), SignalHub::new().subscribe());
    logger.flush(false).await.unwrap();

    let received = server.received_requests().await.unwrap();
    assert!(received[0].headers.get("authorization").is_none());

    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert!(body.get("access_token").is_none());
    assert_eq!(body["events"][0]["sid"], serde_json::Value::Null);
    assert_eq!(body["events"][0]["user_id"], serde_json::Value::Null);
}

#[tokio::test]
async fn test_collector_cookie_is_replayed_on_next_delivery() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audit/events"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("set-cookie", "bs_sid=abc123; Path=/"),
        )
        .mount(&server)
        .await;

    let logger = logger(&server.uri());
    logger.init(InitOptions::default(), SignalHub::new().subscribe());
    logger.flush(false).await.unwrap();

    server.reset().await;
    Mock::given(method("POST"))
        .and(path("/audit/events"))
        .and(header("cookie", "bs_sid=abc123"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    logger.log(EventName::AuthModalOpen, None);
    logger.flush(false).await.unwrap();
    assert_eq!(logger.queue_len(), 0);
}

#[tokio::test]
async fn test_custom_path_joins_onto_api_base() {
    let server = MockServer::start().await;
    respond(&server, "/api/custom/ingest", 200).await;

    let logger = logger(&format!("{}/api/", server.uri()));
    logger.init(
        InitOptions::default().with_path("/custom/ingest"),
        SignalHub::new().subscribe(),
    );
    logger.flush(false).await.unwrap();

    assert_eq!(logger.queue_len(), 0);
}

#[tokio::test]
async fn test_unreachable_collector_requeues_batch() {
    let uri = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        format!("http://{}", listener.local_addr().unwrap())
    };

    let logger = logger(&uri);
    logger.init(InitOptions::default(), SignalHub::new().subscribe());
    logger.log(EventName::NavMenuOpen, None);

    let err = logger.flush(false).await.unwrap_err();
    assert!(matches!(err, FlushError::Transport(_)));

    let names: Vec<_> = logger.queued_events().iter().map(|e| e.name).collect();
    assert_eq!(names, vec![EventName::PageView, EventName::NavMenuOpen]);
}

#[tokio::test]
async fn test_keepalive_request_without_beacon() {
    let server = MockServer::start().await;
    respond(&server, "/audit/events", 200).await;

    let logger = logger(&server.uri());
    logger.init(InitOptions::default(), SignalHub::new().subscribe());
    logger.flush(true).await.unwrap();

    assert_eq!(logger.queue_len(), 0);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_hidden_page_sends_through_http_beacon() {
    let server = MockServer::start().await;
    respond(&server, "/audit/events", 200).await;

    let transport = Arc::new(HttpTransport::new(Duration::from_secs(5)).unwrap());
    let beacon = Arc::new(HttpBeacon::for_transport(&transport).unwrap());
    let logger = EventLogger::builder(server.uri())
        .flush_interval(Duration::from_secs(3600))
        .transport(transport)
        .beacon(beacon)
        .build()
        .unwrap();
    let hub = SignalHub::new();
    logger.init(InitOptions::default(), hub.subscribe());
    logger.log(EventName::NavMenuOpen, None);
    logger.log(EventName::NavMenuClose, None);

    hub.hidden();

    let received = wait_for_requests(&server, 1).await;
    assert_eq!(received.len(), 1);
    assert_eq!(decode_batch(&received[0].body).len(), 3);
    assert_eq!(logger.queue_len(), 0);
}
