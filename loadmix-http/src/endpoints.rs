use http::{HeaderValue, Uri};

use super::{Error, Result};

/// The three target routes, derived from one base URL such as `https://host/api/v1`.
///
/// Uploads go to `{base}/files/?type=chat`, health checks to `{base}/files/`, and chat
/// completions to `{base without /v1}/chat/completions`.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub upload: Uri,
    pub chat: Uri,
    pub health: Uri,
    pub(crate) host: HeaderValue,
}

impl Endpoints {
    pub fn from_base_url(base_url: &str) -> Result<Self> {
        let invalid = || Error::InvalidUrl(base_url.to_string());

        let parsed = url::Url::parse(base_url).map_err(|_| invalid())?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(Error::UnsupportedScheme(base_url.to_string()));
        }
        let host = host_header_value(&parsed).ok_or_else(invalid)?;
        let host = HeaderValue::from_str(&host).map_err(|_| invalid())?;

        let base = base_url.trim_end_matches('/');
        let api_root = base.strip_suffix("/v1").unwrap_or(base);
        let uri = |s: String| s.parse::<Uri>().map_err(|_| invalid());

        Ok(Self {
            upload: uri(format!("{base}/files/?type=chat"))?,
            chat: uri(format!("{api_root}/chat/completions"))?,
            health: uri(format!("{base}/files/"))?,
            host,
        })
    }
}

fn host_header_value(parsed: &url::Url) -> Option<String> {
    let host = parsed.host_str()?;
    match parsed.port() {
        Some(port) => Some(format!("{host}:{port}")),
        None => Some(host.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints(base: &str) -> Endpoints {
        Endpoints::from_base_url(base).unwrap_or_else(|e| panic!("{base}: {e}"))
    }

    #[test]
    fn chat_route_drops_the_version_segment() {
        let e = endpoints("http://127.0.0.1:8080/api/v1");
        assert_eq!(
            e.upload.to_string(),
            "http://127.0.0.1:8080/api/v1/files/?type=chat"
        );
        assert_eq!(e.health.to_string(), "http://127.0.0.1:8080/api/v1/files/");
        assert_eq!(
            e.chat.to_string(),
            "http://127.0.0.1:8080/api/chat/completions"
        );
        assert_eq!(e.host, "127.0.0.1:8080");
    }

    #[test]
    fn trailing_slash_and_unversioned_bases_are_accepted() {
        let e = endpoints("https://chat.example.com/api/");
        assert_eq!(e.upload.to_string(), "https://chat.example.com/api/files/?type=chat");
        assert_eq!(e.chat.to_string(), "https://chat.example.com/api/chat/completions");
        assert_eq!(e.host, "chat.example.com");
    }

    #[test]
    fn non_http_schemes_are_rejected() {
        assert!(matches!(
            Endpoints::from_base_url("ftp://example.com/api/v1"),
            Err(Error::UnsupportedScheme(_))
        ));
        assert!(matches!(
            Endpoints::from_base_url("not a url"),
            Err(Error::InvalidUrl(_))
        ));
    }
}
