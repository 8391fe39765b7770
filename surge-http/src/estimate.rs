use super::util::{has_header, host_header_value, parse_http_url};
use super::{HttpRequest, Result};

/// Estimated bytes an HTTP/1.1 request occupies on the wire.
///
/// Counts request line, headers, the blank line and the body. `Host` and `Content-Length` are
/// counted even when the caller did not set them, since the client always sends them.
pub fn estimate_http_request_bytes(req: &HttpRequest) -> Result<u64> {
    estimate_http_request_bytes_parts(&req.method, &req.url, &req.headers, req.body.len() as u64)
}

pub(super) fn estimate_http_request_bytes_parts(
    method: &http::Method,
    url: &str,
    headers: &[(String, String)],
    body_len: u64,
) -> Result<u64> {
    let parsed = parse_http_url(url)?;
    let mut bytes = request_line_bytes(method, &parsed);

    for (k, v) in headers {
        bytes = bytes.saturating_add(header_bytes(k.as_bytes(), v.as_bytes()));
    }

    if !has_header(headers, "host")
        && let Some(host) = host_header_value(&parsed)
    {
        bytes = bytes.saturating_add(header_bytes(b"host", host.as_bytes()));
    }

    if body_len != 0 && !has_header(headers, "content-length") {
        let v = body_len.to_string();
        bytes = bytes.saturating_add(header_bytes(b"content-length", v.as_bytes()));
    }

    Ok(bytes.saturating_add(2).saturating_add(body_len))
}

fn request_line_bytes(method: &http::Method, url: &url::Url) -> u64 {
    // Origin form: path plus `?query`.
    let target = url.path().len() + url.query().map_or(0, |q| q.len() + 1);

    // "METHOD SP target SP HTTP/1.1 CRLF"
    (method.as_str().len() as u64)
        .saturating_add(1)
        .saturating_add(target as u64)
        .saturating_add(1)
        .saturating_add("HTTP/1.1".len() as u64)
        .saturating_add(2)
}

pub(super) fn estimate_http1_response_head_bytes(
    version: http::Version,
    status: http::StatusCode,
    headers: &http::HeaderMap,
) -> u64 {
    let version_len = match version {
        http::Version::HTTP_2 | http::Version::HTTP_3 => "HTTP/2".len(),
        _ => "HTTP/1.1".len(),
    } as u64;

    // Reason phrase is ignored.
    let mut bytes = version_len
        .saturating_add(1)
        .saturating_add(status.as_str().len() as u64)
        .saturating_add(2);

    for (name, value) in headers {
        bytes = bytes.saturating_add(header_bytes(name.as_str().as_bytes(), value.as_bytes()));
    }
    bytes.saturating_add(2)
}

fn header_bytes(name: &[u8], value: &[u8]) -> u64 {
    // "name: value\r\n"
    (name.len() as u64)
        .saturating_add(2)
        .saturating_add(value.len() as u64)
        .saturating_add(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn reservation_post_estimate_counts_implicit_headers() {
        let body = Bytes::from_static(br#"{"userId":"user-1-0","amount":120.5}"#);
        let req = HttpRequest::post("http://reservas:8080/reservas", body.clone())
            .with_header("content-type", "application/json");

        let got = estimate_http_request_bytes(&req).unwrap_or_else(|e| panic!("{e}"));

        let expected = "POST /reservas HTTP/1.1\r\n".len()
            + "content-type: application/json\r\n".len()
            + "host: reservas:8080\r\n".len()
            + format!("content-length: {}\r\n", body.len()).len()
            + 2
            + body.len();
        assert_eq!(got, expected as u64);
    }

    #[test]
    fn query_is_part_of_the_request_line() {
        let req = HttpRequest::get("http://reservas/health?check=1");
        let got = estimate_http_request_bytes(&req).unwrap_or_else(|e| panic!("{e}"));
        let expected =
            "GET /health?check=1 HTTP/1.1\r\n".len() + "host: reservas\r\n".len() + 2;
        assert_eq!(got, expected as u64);
    }

    #[test]
    fn https_is_rejected() {
        let req = HttpRequest::post("https://reservas/reservas", Bytes::new());
        assert!(matches!(
            estimate_http_request_bytes(&req),
            Err(crate::Error::UnsupportedScheme { .. })
        ));
    }

    #[test]
    fn response_head_counts_status_line_and_headers() {
        let mut headers = http::HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
        let got = estimate_http1_response_head_bytes(
            http::Version::HTTP_11,
            http::StatusCode::ACCEPTED,
            &headers,
        );
        let expected = "HTTP/1.1 202\r\n".len() + "content-type: application/json\r\n".len() + 2;
        assert_eq!(got, expected as u64);
    }
}
