use bytes::{BufMut as _, Bytes, BytesMut};

/// Encodes a `multipart/form-data` body holding a single file field.
pub(crate) fn encode_file_field(
    boundary: &str,
    field: &str,
    file_name: &str,
    content_type: &str,
    data: &[u8],
) -> Bytes {
    let file_name = file_name.replace('"', "%22");
    let head = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
    );
    let tail = format!("\r\n--{boundary}--\r\n");

    let mut buf = BytesMut::with_capacity(head.len() + data.len() + tail.len());
    buf.put_slice(head.as_bytes());
    buf.put_slice(data);
    buf.put_slice(tail.as_bytes());
    buf.freeze()
}

pub(crate) fn content_type(boundary: &str) -> String {
    format!("multipart/form-data; boundary={boundary}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_frames_the_file_between_boundaries() {
        let body = encode_file_field("b1", "file", "Data \"Science\".pdf", "application/pdf", b"%PDF");
        let text = String::from_utf8_lossy(&body);

        assert!(text.starts_with("--b1\r\n"));
        assert!(text.contains("filename=\"Data %22Science%22.pdf\""));
        assert!(text.contains("Content-Type: application/pdf\r\n\r\n%PDF\r\n"));
        assert!(text.ends_with("\r\n--b1--\r\n"));
        assert_eq!(content_type("b1"), "multipart/form-data; boundary=b1");
    }
}
