use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderValue, Method, Request, Uri, header};
use http_body_util::{BodyExt as _, Full};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use loadmix_core::{
    DEFAULT_REQUEST_TIMEOUT, Payload, RawResponse, Transport, TransportError, TransportSession,
    VirtualUser, WorkloadItem,
};
use tokio::time::Instant;

use super::connector::TimedConnector;
use super::endpoints::Endpoints;
use super::estimate::{estimate_http1_request_bytes, estimate_http1_response_head_bytes};
use super::files::FileStore;
use super::{Error, Result, multipart};

/// Unreachable hosts should fail promptly instead of waiting on the OS connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

const USER_AGENT: &str = concat!("loadmix/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub base_url: String,
    pub credentials: Vec<String>,
    pub request_timeout: Duration,
    pub connect_timeout: Option<Duration>,
}

impl HttpTransportConfig {
    pub fn new(base_url: impl Into<String>, credentials: Vec<String>) -> Self {
        Self {
            base_url: base_url.into(),
            credentials,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
        }
    }
}

/// Talks to the target API over HTTP/1.1 (plain or TLS).
///
/// Every VU session owns its own connection pool, so connections are reused within a VU and
/// never shared between VUs.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    endpoints: Arc<Endpoints>,
    authorizations: Arc<[HeaderValue]>,
    files: FileStore,
    request_timeout: Duration,
    connect_timeout: Option<Duration>,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig, files: FileStore) -> Result<Self> {
        if config.credentials.is_empty() {
            return Err(Error::NoCredentials);
        }
        let endpoints = Endpoints::from_base_url(&config.base_url)?;

        let authorizations = config
            .credentials
            .iter()
            .enumerate()
            .map(|(i, token)| {
                let mut value = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
                    .map_err(|_| Error::InvalidCredential(i))?;
                value.set_sensitive(true);
                Ok(value)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            endpoints: Arc::new(endpoints),
            authorizations: Arc::from(authorizations),
            files,
            request_timeout: config.request_timeout,
            connect_timeout: config.connect_timeout,
        })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }
}

impl Transport for HttpTransport {
    type Session = HttpSession;

    fn session(&self, vu: &VirtualUser) -> HttpSession {
        let connector = TimedConnector::new(self.connect_timeout);
        let client = Client::builder(TokioExecutor::new()).build(connector.clone());
        let authorization =
            self.authorizations[vu.credential_index % self.authorizations.len()].clone();

        HttpSession {
            client,
            connector,
            authorization,
            endpoints: self.endpoints.clone(),
            files: self.files.clone(),
            request_timeout: self.request_timeout,
            vu_id: vu.id,
            seq: 0,
        }
    }
}

pub struct HttpSession {
    client: Client<TimedConnector, Full<Bytes>>,
    connector: TimedConnector,
    authorization: HeaderValue,
    endpoints: Arc<Endpoints>,
    files: FileStore,
    request_timeout: Duration,
    vu_id: u64,
    seq: u64,
}

struct Prepared {
    request: Request<Full<Bytes>>,
    bytes_sent: u64,
}

impl HttpSession {
    fn prepare(&mut self, item: &WorkloadItem) -> Result<Prepared> {
        self.seq = self.seq.wrapping_add(1);

        let (method, uri, content_type, body): (Method, &Uri, Option<String>, Bytes) =
            match &item.payload {
                Payload::Upload {
                    file_name,
                    content_type,
                } => {
                    let data = self
                        .files
                        .get(file_name)
                        .ok_or_else(|| Error::UnknownFile(file_name.to_string()))?;
                    let boundary = format!("loadmix-{}-{}", self.vu_id, self.seq);
                    let body = multipart::encode_file_field(
                        &boundary,
                        "file",
                        file_name,
                        content_type,
                        &data,
                    );
                    (
                        Method::POST,
                        &self.endpoints.upload,
                        Some(multipart::content_type(&boundary)),
                        body,
                    )
                }
                Payload::Chat { body, .. } => (
                    Method::POST,
                    &self.endpoints.chat,
                    Some("application/json".to_string()),
                    body.clone(),
                ),
                Payload::Browse => (Method::GET, &self.endpoints.health, None, Bytes::new()),
            };

        let mut builder = Request::builder()
            .method(method)
            .uri(uri.clone())
            .header(header::HOST, self.endpoints.host.clone())
            .header(header::AUTHORIZATION, self.authorization.clone())
            .header(header::ACCEPT, "application/json")
            .header(header::USER_AGENT, USER_AGENT);
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        if !body.is_empty() {
            builder = builder.header(header::CONTENT_LENGTH, body.len());
        }

        let body_len = body.len() as u64;
        let request = builder.body(Full::new(body))?;
        let bytes_sent = estimate_http1_request_bytes(
            request.method(),
            request.uri(),
            request.headers(),
            body_len,
        );
        Ok(Prepared {
            request,
            bytes_sent,
        })
    }

    async fn exchange(&mut self, item: &WorkloadItem) -> Result<RawResponse> {
        let Prepared {
            request,
            bytes_sent,
        } = self.prepare(item)?;

        // Drop a stale measurement left by an earlier request that failed mid-flight.
        let _ = self.connector.take_connect_time();

        let started = Instant::now();
        let client = &self.client;
        let round_trip = async {
            let res = client.request(request).await?;
            let ttfb = started.elapsed();

            let (parts, body) = res.into_parts();
            let head_bytes =
                estimate_http1_response_head_bytes(parts.version, parts.status, &parts.headers);
            let body = body.collect().await?.to_bytes();
            Ok::<_, Error>((parts.status.as_u16(), ttfb, head_bytes, body))
        };

        let timeout = self.request_timeout;
        let (status, ttfb, head_bytes, body) = tokio::time::timeout(timeout, round_trip)
            .await
            .map_err(|_| Error::Timeout(timeout))??;

        Ok(RawResponse {
            status,
            ttfb,
            connect: self.connector.take_connect_time().unwrap_or(Duration::ZERO),
            bytes_sent,
            bytes_received: head_bytes.saturating_add(body.len() as u64),
            body,
        })
    }
}

impl TransportSession for HttpSession {
    async fn send(&mut self, item: &WorkloadItem) -> std::result::Result<RawResponse, TransportError> {
        self.exchange(item).await.map_err(|e| {
            tracing::debug!(vu = self.vu_id, item = %item.name, error = %e, "http exchange failed");
            TransportError::from(e)
        })
    }
}
