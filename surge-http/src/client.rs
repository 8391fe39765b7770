use bytes::Bytes;
use http_body_util::{BodyExt as _, Full};
use hyper::Request;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::collections::BTreeMap;
use std::time::Duration;

use super::estimate::{estimate_http_request_bytes_parts, estimate_http1_response_head_bytes};
use super::util::{has_header, host_header_value, parse_http_url};
use super::{Error, HttpRequest, HttpResponse, Result};

/// Pooled HTTP/1.1 client. Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client<HttpConnector, Full<Bytes>>,
}

impl Default for HttpClient {
    fn default() -> Self {
        // OS connect timeouts run to tens of seconds; an unreachable target should fail fast.
        Self::new(Some(Duration::from_secs(3)))
    }
}

impl HttpClient {
    #[must_use]
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(connect_timeout);
        connector.set_nodelay(true);

        let inner = Client::builder(TokioExecutor::new()).build(connector);
        Self { inner }
    }

    pub async fn request(&self, req: HttpRequest) -> Result<HttpResponse> {
        let parsed = parse_http_url(&req.url)?;
        let bytes_sent = estimate_http_request_bytes_parts(
            &req.method,
            &req.url,
            &req.headers,
            req.body.len() as u64,
        )?;

        let uri: hyper::Uri = parsed.as_str().parse().map_err(|e: http::uri::InvalidUri| {
            Error::InvalidUrl {
                url: req.url.clone(),
                reason: e.to_string(),
            }
        })?;

        let mut builder = Request::builder().method(req.method.clone()).uri(uri);

        // Implicit headers are made explicit so byte accounting matches what is sent.
        if !has_header(&req.headers, "host")
            && let Some(host) = host_header_value(&parsed)
        {
            builder = builder.header(http::header::HOST, host);
        }
        if !req.body.is_empty() && !has_header(&req.headers, "content-length") {
            builder = builder.header(http::header::CONTENT_LENGTH, req.body.len());
        }

        for (k, v) in &req.headers {
            let invalid = |reason: String| Error::InvalidHeader {
                name: k.clone(),
                reason,
            };
            let name = http::header::HeaderName::from_bytes(k.as_bytes())
                .map_err(|e| invalid(e.to_string()))?;
            let value =
                http::header::HeaderValue::from_str(v).map_err(|e| invalid(e.to_string()))?;
            builder = builder.header(name, value);
        }

        let request: Request<Full<Bytes>> = builder.body(Full::new(req.body))?;

        let exchange = async {
            let res = self
                .inner
                .request(request)
                .await
                .map_err(Error::from_client)?;
            let (parts, body) = res.into_parts();
            let body = body.collect().await?.to_bytes();
            Ok::<_, Error>((parts, body))
        };

        let (parts, body) = match req.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, exchange).await {
                Ok(res) => res?,
                Err(_) => return Err(Error::Timeout(timeout)),
            },
            None => exchange.await?,
        };

        let mut merged: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in &parts.headers {
            let v = String::from_utf8_lossy(value.as_bytes()).to_string();
            merged
                .entry(name.as_str().to_ascii_lowercase())
                .and_modify(|cur| {
                    if !cur.is_empty() {
                        cur.push_str(", ");
                    }
                    cur.push_str(&v);
                })
                .or_insert(v);
        }

        let head_bytes =
            estimate_http1_response_head_bytes(parts.version, parts.status, &parts.headers);
        let bytes_received = head_bytes.saturating_add(body.len() as u64);

        tracing::trace!(
            method = %req.method,
            url = %req.url,
            status = parts.status.as_u16(),
            bytes_sent,
            bytes_received,
            "http exchange complete"
        );

        Ok(HttpResponse {
            status: parts.status.as_u16(),
            body,
            headers: merged.into_iter().collect(),
            bytes_sent,
            bytes_received,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HttpTransportErrorKind;
    use std::time::Instant;

    #[tokio::test]
    async fn unreachable_host_fails_fast_with_connect_timeout() {
        let client = HttpClient::new(Some(Duration::from_millis(200)));
        let req = HttpRequest::get("http://192.0.2.1:81/");

        let started = Instant::now();
        let res = client.request(req).await;
        let elapsed = started.elapsed();

        assert!(res.is_err());
        assert!(
            elapsed < Duration::from_secs(2),
            "expected fast failure, elapsed={elapsed:?}"
        );
    }

    #[tokio::test]
    async fn refused_connection_is_a_transport_error() {
        // Bind then drop to get a local port with nothing listening.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .and_then(|l| l.local_addr())
            .map(|a| a.port())
            .unwrap_or_else(|e| panic!("{e}"));

        let client = HttpClient::default();
        let req = HttpRequest::post(format!("http://127.0.0.1:{port}/reservas"), Bytes::new())
            .with_timeout(Duration::from_secs(2));

        match client.request(req).await {
            Err(e) => assert_eq!(e.transport_error_kind(), HttpTransportErrorKind::Connect),
            Ok(res) => panic!("unexpected response: {}", res.status),
        }
    }

    #[tokio::test]
    async fn https_urls_are_rejected_before_connecting() {
        let client = HttpClient::default();
        let err = client
            .request(HttpRequest::get("https://localhost/"))
            .await
            .err()
            .unwrap_or_else(|| panic!("expected error"));
        assert_eq!(
            err.transport_error_kind(),
            HttpTransportErrorKind::UnsupportedScheme
        );
    }
}
