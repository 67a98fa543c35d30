use std::borrow::Cow;

/// Estimate bytes sent for an HTTP request.
///
/// This is a best-effort estimate of HTTP/1.1 framing: request line + headers + CRLF + body.
/// Callers set Host/Content-Length explicitly so the estimate matches what goes on the wire.
pub fn estimate_http1_request_bytes(
    method: &http::Method,
    uri: &http::Uri,
    headers: &http::HeaderMap,
    body_len: u64,
) -> u64 {
    let mut bytes = estimate_http1_request_line_bytes(method, uri);
    for (name, value) in headers.iter() {
        bytes = bytes.saturating_add(estimate_http1_header_bytes(
            name.as_str().as_bytes(),
            value.as_bytes(),
        ));
    }

    // End of headers.
    bytes = bytes.saturating_add(2);
    bytes.saturating_add(body_len)
}

fn estimate_http1_request_line_bytes(method: &http::Method, uri: &http::Uri) -> u64 {
    let method_len = method.as_str().len() as u64;
    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    let path_len = path.len() as u64;
    let version_len = "HTTP/1.1".len() as u64;

    // "METHOD SP path SP HTTP/1.1 CRLF"
    method_len
        .saturating_add(1)
        .saturating_add(path_len)
        .saturating_add(1)
        .saturating_add(version_len)
        .saturating_add(2)
}

pub fn estimate_http1_response_head_bytes(
    version: http::Version,
    status: http::StatusCode,
    headers: &http::HeaderMap,
) -> u64 {
    let mut bytes = estimate_http1_status_line_bytes(version, status);
    for (name, value) in headers.iter() {
        bytes = bytes.saturating_add(estimate_http1_header_bytes(
            name.as_str().as_bytes(),
            value.as_bytes(),
        ));
    }
    bytes.saturating_add(2)
}

fn estimate_http1_status_line_bytes(version: http::Version, status: http::StatusCode) -> u64 {
    let version_str: Cow<'static, str> = match version {
        http::Version::HTTP_10 => Cow::Borrowed("HTTP/1.0"),
        http::Version::HTTP_2 => Cow::Borrowed("HTTP/2"),
        http::Version::HTTP_3 => Cow::Borrowed("HTTP/3"),
        _ => Cow::Borrowed("HTTP/1.1"),
    };

    // "HTTP/1.1 SP 200 CRLF" (reason-phrase ignored)
    (version_str.len() as u64)
        .saturating_add(1)
        .saturating_add(status.as_str().len() as u64)
        .saturating_add(2)
}

fn estimate_http1_header_bytes(name: &[u8], value: &[u8]) -> u64 {
    // "name: value\r\n"
    (name.len() as u64)
        .saturating_add(2)
        .saturating_add(value.len() as u64)
        .saturating_add(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_estimate_counts_line_headers_and_body() {
        let uri: http::Uri = "http://localhost:8080/api/v1/files/"
            .parse()
            .unwrap_or_else(|e| panic!("uri: {e}"));
        let mut headers = http::HeaderMap::new();
        headers.insert(
            http::header::HOST,
            http::HeaderValue::from_static("localhost:8080"),
        );

        // "GET /api/v1/files/ HTTP/1.1\r\n" = 3+1+14+1+8+2
        // "host: localhost:8080\r\n" = 4+2+14+2
        // "\r\n" + 5 body bytes
        let got = estimate_http1_request_bytes(&http::Method::GET, &uri, &headers, 5);
        assert_eq!(got, 29 + 22 + 2 + 5);
    }

    #[test]
    fn response_head_estimate_ignores_reason_phrase() {
        let headers = http::HeaderMap::new();
        let got = estimate_http1_response_head_bytes(
            http::Version::HTTP_11,
            http::StatusCode::NOT_FOUND,
            &headers,
        );
        // "HTTP/1.1 404\r\n\r\n"
        assert_eq!(got, 8 + 1 + 3 + 2 + 2);
    }
}
