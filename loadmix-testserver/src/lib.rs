use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub const PATH_FILES: &str = "/api/v1/files/";
pub const PATH_CHAT_COMPLETIONS: &str = "/api/chat/completions";

/// How the stub answers. Can be switched while the server is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Mode {
    /// Well-formed success responses.
    #[default]
    Healthy = 0,
    /// Every route answers `500`.
    ServerError = 1,
    /// `200` with a body that is not the expected JSON shape.
    MalformedBody = 2,
    /// Uploads answer `200 [{}]`, chats answer `200 {"choices":[]}`.
    MissingFields = 3,
}

impl Mode {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::ServerError,
            2 => Self::MalformedBody,
            3 => Self::MissingFields,
            _ => Self::Healthy,
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "healthy" => Ok(Self::Healthy),
            "server-error" => Ok(Self::ServerError),
            "malformed" => Ok(Self::MalformedBody),
            "missing-fields" => Ok(Self::MissingFields),
            other => Err(format!("unknown mode `{other}`")),
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    mode: AtomicU8,
    latency_ms: AtomicU64,

    requests_total: AtomicU64,
    unauthorized: AtomicU64,
    uploads: AtomicU64,
    uploaded_bytes: AtomicU64,
    chats: AtomicU64,
    health_checks: AtomicU64,
}

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    shared: Arc<Shared>,
}

impl TestServerStats {
    pub fn set_mode(&self, mode: Mode) {
        self.shared.mode.store(mode as u8, Ordering::Relaxed);
    }

    pub fn mode(&self) -> Mode {
        Mode::from_u8(self.shared.mode.load(Ordering::Relaxed))
    }

    /// Extra latency added before every response.
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.shared.latency_ms.store(ms, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.shared.requests_total.load(Ordering::Relaxed)
    }

    pub fn unauthorized(&self) -> u64 {
        self.shared.unauthorized.load(Ordering::Relaxed)
    }

    pub fn uploads(&self) -> u64 {
        self.shared.uploads.load(Ordering::Relaxed)
    }

    pub fn uploaded_bytes(&self) -> u64 {
        self.shared.uploaded_bytes.load(Ordering::Relaxed)
    }

    pub fn chats(&self) -> u64 {
        self.shared.chats.load(Ordering::Relaxed)
    }

    pub fn health_checks(&self) -> u64 {
        self.shared.health_checks.load(Ordering::Relaxed)
    }

    /// Counts the request, applies the configured latency and checks the bearer token.
    async fn admit(&self, headers: &HeaderMap) -> Result<Mode, Response> {
        self.shared.requests_total.fetch_add(1, Ordering::Relaxed);

        let latency = self.shared.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            sleep(Duration::from_millis(latency)).await;
        }

        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| !token.trim().is_empty());
        if !authorized {
            self.shared.unauthorized.fetch_add(1, Ordering::Relaxed);
            return Err((StatusCode::UNAUTHORIZED, "missing bearer token").into_response());
        }

        match self.mode() {
            Mode::ServerError => {
                Err((StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response())
            }
            mode => Ok(mode),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TestServerUrls {
    /// What a client should be configured with, e.g. `http://127.0.0.1:1234/api/v1`.
    pub base_url: String,
    pub files: String,
    pub chat_completions: String,
}

impl TestServerUrls {
    pub fn new(origin: &str) -> Self {
        Self {
            base_url: format!("{origin}/api/v1"),
            files: format!("{origin}{PATH_FILES}"),
            chat_completions: format!("{origin}{PATH_CHAT_COMPLETIONS}"),
        }
    }
}

async fn handle_upload(
    State(stats): State<TestServerStats>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let mode = match stats.admit(&headers).await {
        Ok(mode) => mode,
        Err(res) => return res,
    };

    let mut file: Option<(String, u64)> = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                let name = field.file_name().unwrap_or("upload.bin").to_string();
                match field.bytes().await {
                    Ok(data) => file = Some((name, data.len() as u64)),
                    Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
                }
            }
            Ok(None) => break,
            Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        }
    }
    let Some((filename, bytes)) = file else {
        return (StatusCode::BAD_REQUEST, "no file field").into_response();
    };

    let seq = stats.shared.uploads.fetch_add(1, Ordering::Relaxed) + 1;
    stats
        .shared
        .uploaded_bytes
        .fetch_add(bytes, Ordering::Relaxed);

    match mode {
        Mode::MalformedBody => (StatusCode::OK, "<html>upload ok</html>").into_response(),
        Mode::MissingFields => Json(json!([{}])).into_response(),
        _ => Json(json!([{
            "id": format!("file-{seq}"),
            "filename": filename,
            "bytes": bytes,
        }]))
        .into_response(),
    }
}

async fn handle_list_files(State(stats): State<TestServerStats>, headers: HeaderMap) -> Response {
    let mode = match stats.admit(&headers).await {
        Ok(mode) => mode,
        Err(res) => return res,
    };
    stats.shared.health_checks.fetch_add(1, Ordering::Relaxed);

    match mode {
        Mode::MalformedBody => (StatusCode::OK, "not json").into_response(),
        _ => Json(json!([])).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct ChatBody {
    model: String,
    messages: Vec<ChatBodyMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatBodyMessage {
    role: String,
    content: String,
}

async fn handle_chat(
    State(stats): State<TestServerStats>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mode = match stats.admit(&headers).await {
        Ok(mode) => mode,
        Err(res) => return res,
    };

    let req: ChatBody = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return (StatusCode::BAD_REQUEST, "bad json").into_response(),
    };
    if req.messages.is_empty() {
        return (StatusCode::BAD_REQUEST, "messages must not be empty").into_response();
    }
    let seq = stats.shared.chats.fetch_add(1, Ordering::Relaxed) + 1;

    let question = req
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.as_str())
        .unwrap_or_default();

    match mode {
        Mode::MalformedBody => (StatusCode::OK, "{\"choices\":").into_response(),
        Mode::MissingFields => Json(json!({ "choices": [] })).into_response(),
        _ => Json(json!({
            "id": format!("chatcmpl-{seq}"),
            "object": "chat.completion",
            "model": req.model,
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": format!("You asked: {question}"),
                },
                "finish_reason": "stop",
            }],
        }))
        .into_response(),
    }
}

pub fn router(stats: TestServerStats) -> Router {
    Router::new()
        .route(PATH_FILES, post(handle_upload).get(handle_list_files))
        .route(PATH_CHAT_COMPLETIONS, post(handle_chat))
        .with_state(stats)
}

pub struct TestServer {
    addr: SocketAddr,
    urls: TestServerUrls,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with(TestServerStats::default()).await
    }

    /// Starts on an ephemeral port with pre-configured stats (mode, latency).
    pub async fn start_with(stats: TestServerStats) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let app = router(stats.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Ok(Self {
            addr,
            urls: TestServerUrls::new(&format!("http://{addr}")),
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.urls.base_url
    }

    pub fn urls(&self) -> &TestServerUrls {
        &self.urls
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
