use std::path::PathBuf;
use std::time::Duration;

use loadmix_core::{TransportError, TransportErrorKind};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("only http:// and https:// URLs are supported: {0}")]
    UnsupportedScheme(String),

    #[error("credential pool must not be empty")]
    NoCredentials,

    #[error("credential #{0} is not a valid header value")]
    InvalidCredential(usize),

    #[error("failed to read `{name}` from {path}: {source}")]
    MissingFile {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no content loaded for file `{0}`")]
    UnknownFile(String),

    #[error("http request build failed: {0}")]
    RequestBuild(#[from] http::Error),

    #[error("http request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("http request timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to read response body: {0}")]
    BodyRead(#[from] hyper::Error),
}

impl Error {
    #[must_use]
    pub fn transport_error_kind(&self) -> TransportErrorKind {
        match self {
            Self::InvalidUrl(_)
            | Self::UnsupportedScheme(_)
            | Self::NoCredentials
            | Self::InvalidCredential(_)
            | Self::RequestBuild(_) => TransportErrorKind::Request,
            Self::MissingFile { .. } | Self::UnknownFile(_) => TransportErrorKind::Payload,
            Self::Request(e) if e.is_connect() => {
                if is_tls_failure(e) {
                    TransportErrorKind::Tls
                } else {
                    TransportErrorKind::Connect
                }
            }
            Self::Request(_) => TransportErrorKind::Request,
            Self::Timeout(_) => TransportErrorKind::Timeout,
            Self::BodyRead(_) => TransportErrorKind::BodyRead,
        }
    }
}

impl From<Error> for TransportError {
    fn from(e: Error) -> Self {
        TransportError::new(e.transport_error_kind(), e.to_string())
    }
}

/// rustls handshake failures surface through the connector as `InvalidData` io errors.
fn is_tls_failure(e: &(dyn std::error::Error + 'static)) -> bool {
    let mut cur = e.source();
    while let Some(err) = cur {
        if let Some(io) = err.downcast_ref::<std::io::Error>()
            && io.kind() == std::io::ErrorKind::InvalidData
        {
            return true;
        }
        cur = err.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_and_missing_payloads_map_to_their_kinds() {
        let e = Error::Timeout(Duration::from_secs(1));
        assert_eq!(e.transport_error_kind(), TransportErrorKind::Timeout);

        let e: TransportError = Error::UnknownFile("a.txt".to_string()).into();
        assert_eq!(e.kind, TransportErrorKind::Payload);
        assert!(e.message.contains("a.txt"));
    }
}
