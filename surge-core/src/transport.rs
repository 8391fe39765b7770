use std::future::Future;

use surge_http::{HttpClient, HttpRequest};
use tokio::time::Instant;

use crate::observation::ResponseObservation;
use crate::request::RequestSpec;

/// Executes one request and reports what happened.
///
/// Never fails: connection errors and timeouts come back as error observations.
pub trait Transport: Send + Sync + 'static {
    fn execute(&self, req: RequestSpec) -> impl Future<Output = ResponseObservation> + Send;
}

impl Transport for HttpClient {
    async fn execute(&self, req: RequestSpec) -> ResponseObservation {
        let mut http_req = HttpRequest::new(req.method, req.url).with_timeout(req.timeout);
        http_req.headers = req.headers.into_iter().collect();
        http_req.body = req.body;

        let started = Instant::now();
        let res = self.request(http_req).await;
        let latency = started.elapsed();

        match res {
            Ok(res) => ResponseObservation::response(res.status, latency, res.body)
                .with_bytes(res.bytes_sent, res.bytes_received),
            Err(err) => {
                tracing::debug!(error = %err, "request failed");
                ResponseObservation::transport_error(
                    err.transport_error_kind(),
                    err.to_string(),
                    latency,
                )
            }
        }
    }
}
