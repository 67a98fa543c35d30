use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use http::Uri;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use parking_lot::Mutex;
use tokio::time::Instant;
use tower::Service;

type Inner = HttpsConnector<HttpConnector>;

/// Wraps the HTTPS connector and remembers how long the most recent connect took.
///
/// A request that reuses a pooled connection never reaches the connector, so an empty slot
/// after a request means the connection was reused.
#[derive(Clone)]
pub(crate) struct TimedConnector {
    inner: Inner,
    last_connect: Arc<Mutex<Option<Duration>>>,
}

impl TimedConnector {
    pub(crate) fn new(connect_timeout: Option<Duration>) -> Self {
        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);
        http_connector.set_connect_timeout(connect_timeout);

        let inner = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        Self {
            inner,
            last_connect: Arc::default(),
        }
    }

    pub(crate) fn take_connect_time(&self) -> Option<Duration> {
        self.last_connect.lock().take()
    }
}

impl Service<Uri> for TimedConnector {
    type Response = <Inner as Service<Uri>>::Response;
    type Error = <Inner as Service<Uri>>::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        let started = Instant::now();
        let connecting = self.inner.call(dst);
        let slot = self.last_connect.clone();
        Box::pin(async move {
            let res = connecting.await;
            if res.is_ok() {
                *slot.lock() = Some(started.elapsed());
            }
            res
        })
    }
}
