use std::sync::Arc;
use std::time::Duration;

use loadmix_core::{
    ChatMessage, ChatRequest, ChatShape, ContentKind, DelayRange, FileCatalog, FilePick,
    MetricValues, Payload, RunSettings, ScenarioDefinition, ScenarioDriver, SchedulePolicy,
    ThresholdSet, Transport, TransportErrorKind, TransportSession, VirtualUser, WorkloadGenerator,
    WorkloadItem, WorkloadMix, metrics::names,
};
use loadmix_http::{FileStore, HttpTransport, HttpTransportConfig};
use loadmix_testserver::{Mode, TestServer, TestServerStats};

fn transport(base_url: &str, timeout: Duration) -> HttpTransport {
    let config = HttpTransportConfig {
        request_timeout: timeout,
        ..HttpTransportConfig::new(base_url, vec!["token-a".to_string(), "token-b".to_string()])
    };
    HttpTransport::new(config, FileStore::synthesized(&FileCatalog::standard()))
        .unwrap_or_else(|e| panic!("transport: {e}"))
}

fn upload_item(file_name: &str, size_bytes: u64) -> WorkloadItem {
    WorkloadItem {
        name: Arc::from("upload"),
        kind: ContentKind::Text,
        payload: Payload::Upload {
            file_name: Arc::from(file_name),
            content_type: "text/plain",
        },
        size_bytes,
    }
}

fn chat_item() -> WorkloadItem {
    let request = ChatRequest {
        model: "gpt-4o".to_string(),
        messages: vec![ChatMessage {
            role: "user".to_string(),
            content: "What is a load test?".to_string(),
        }],
        stream: false,
        temperature: 0.7,
        max_tokens: 150,
        files: Vec::new(),
    };
    let body = serde_json::to_vec(&request).unwrap_or_else(|e| panic!("encode: {e}"));
    WorkloadItem {
        name: Arc::from("chat"),
        kind: ContentKind::ChatTurn,
        size_bytes: body.len() as u64,
        payload: Payload::Chat {
            request: Arc::new(request),
            body: body.into(),
        },
    }
}

#[tokio::test]
async fn upload_is_sent_as_multipart_with_bearer_auth() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    let transport = transport(server.base_url(), Duration::from_secs(5));
    let mut session = transport.session(&VirtualUser::new(2, 2));

    let res = session
        .send(&upload_item("very-small-10KB.txt", 10 * 1024))
        .await?;

    assert_eq!(res.status, 200);
    let body: serde_json::Value = serde_json::from_slice(&res.body)?;
    assert_eq!(body[0]["id"], "file-1");
    assert_eq!(body[0]["bytes"], 10 * 1024);
    assert!(res.bytes_sent > 10 * 1024);
    assert!(res.bytes_received > res.body.len() as u64);
    assert!(res.ttfb > Duration::ZERO);

    assert_eq!(server.stats().uploads(), 1);
    assert_eq!(server.stats().uploaded_bytes(), 10 * 1024);
    assert_eq!(server.stats().unauthorized(), 0);
    Ok(())
}

#[tokio::test]
async fn chat_and_health_routes_answer() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    let transport = transport(server.base_url(), Duration::from_secs(5));
    let mut session = transport.session(&VirtualUser::new(1, 2));

    let chat = session.send(&chat_item()).await?;
    assert_eq!(chat.status, 200);
    let body: serde_json::Value = serde_json::from_slice(&chat.body)?;
    assert_eq!(
        body["choices"][0]["message"]["content"],
        "You asked: What is a load test?"
    );

    let browse = WorkloadItem {
        name: Arc::from("browse"),
        kind: ContentKind::Browse,
        payload: Payload::Browse,
        size_bytes: 0,
    };
    let health = session.send(&browse).await?;
    assert_eq!(health.status, 200);
    assert_eq!(health.body.as_ref(), b"[]");

    assert_eq!(server.stats().chats(), 1);
    assert_eq!(server.stats().health_checks(), 1);
    Ok(())
}

#[tokio::test]
async fn error_statuses_are_responses_not_transport_errors() -> anyhow::Result<()> {
    let stats = TestServerStats::default();
    stats.set_mode(Mode::ServerError);
    let server = TestServer::start_with(stats).await?;
    let transport = transport(server.base_url(), Duration::from_secs(5));
    let mut session = transport.session(&VirtualUser::new(1, 2));

    let res = session.send(&upload_item("Resume.pdf", 94 * 1024)).await?;
    assert_eq!(res.status, 500);
    Ok(())
}

#[tokio::test]
async fn slow_responses_time_out() -> anyhow::Result<()> {
    let stats = TestServerStats::default();
    stats.set_latency(Duration::from_millis(500));
    let server = TestServer::start_with(stats).await?;
    let transport = transport(server.base_url(), Duration::from_millis(100));
    let mut session = transport.session(&VirtualUser::new(1, 2));

    let err = match session.send(&chat_item()).await {
        Ok(res) => panic!("expected a timeout, got status {}", res.status),
        Err(e) => e,
    };
    assert_eq!(err.kind, TransportErrorKind::Timeout);
    Ok(())
}

#[tokio::test]
async fn refused_connections_are_connect_errors() -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let transport = transport(&format!("http://{addr}/api/v1"), Duration::from_secs(5));
    let mut session = transport.session(&VirtualUser::new(1, 2));

    let err = match session.send(&chat_item()).await {
        Ok(res) => panic!("expected a connect error, got status {}", res.status),
        Err(e) => e,
    };
    assert_eq!(err.kind, TransportErrorKind::Connect);
    Ok(())
}

#[tokio::test]
async fn unknown_upload_content_is_a_payload_error() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    let transport = transport(server.base_url(), Duration::from_secs(5));
    let mut session = transport.session(&VirtualUser::new(1, 2));

    let err = match session.send(&upload_item("missing.bin", 1)).await {
        Ok(res) => panic!("expected a payload error, got status {}", res.status),
        Err(e) => e,
    };
    assert_eq!(err.kind, TransportErrorKind::Payload);
    assert_eq!(server.stats().requests_total(), 0);
    Ok(())
}

#[tokio::test]
async fn mixed_scenario_runs_against_the_stub() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    let transport = Arc::new(transport(server.base_url(), Duration::from_secs(5)));

    let scenario = ScenarioDefinition {
        name: "mixed".to_string(),
        description: "uploads, chat and browsing".to_string(),
        policy: SchedulePolicy::Fixed {
            vus: 3,
            duration: Duration::from_millis(1500),
        },
        mix: WorkloadMix::weighted([
            (
                0.4,
                WorkloadGenerator::upload("upload", FilePick::Any, DelayRange::new(10, 30)),
            ),
            (
                0.4,
                WorkloadGenerator::chat("chat", ChatShape::Basic, DelayRange::new(10, 30)),
            ),
            (
                0.2,
                WorkloadGenerator::browse("browse", DelayRange::new(10, 30)),
            ),
        ]),
        thresholds: vec![
            ThresholdSet::new(names::HTTP_REQ_FAILED, ["rate<0.01"]),
            ThresholdSet::new(names::HTTP_REQ_DURATION, ["p(95)<2000"]),
        ],
    };
    let settings = RunSettings {
        credentials: vec!["token-a".to_string(), "token-b".to_string()],
        seed: Some(7),
        grace_period: Some(Duration::from_secs(5)),
        ..RunSettings::default()
    };

    let report = ScenarioDriver::new(scenario, settings, transport)
        .run()
        .await?;

    assert!(report.verdict.passed, "{:?}", report.verdict.violations);
    assert!(report.iterations > 0);
    assert_eq!(report.aborted_workers, 0);
    assert_eq!(server.stats().unauthorized(), 0);
    assert_eq!(
        server.stats().requests_total(),
        server.stats().uploads() + server.stats().chats() + server.stats().health_checks()
    );

    match report.metrics.get(names::HTTP_REQS) {
        Some(MetricValues::Counter { value }) => {
            assert_eq!(*value as u64, server.stats().requests_total());
        }
        other => panic!("unexpected http_reqs {other:?}"),
    }
    Ok(())
}
