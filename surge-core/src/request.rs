use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;

use crate::amount::Amount;
use crate::config::WorkloadConfig;

/// Identifies one iteration of one VU. Both indices are zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IterationContext {
    pub vu_index: u64,
    pub iteration_index: u64,
}

impl IterationContext {
    /// `<vu>-<iteration>` with a one-based VU number. Unique across a run.
    pub fn token(&self) -> String {
        format!("{}-{}", self.vu_index.saturating_add(1), self.iteration_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    pub method: http::Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
    pub timeout: Duration,
}

/// Turns an iteration into the request it sends.
///
/// Implementations must be pure: the same context always yields the same request.
pub trait RequestBuilder: Send + Sync + 'static {
    fn build(&self, ctx: IterationContext) -> RequestSpec;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReservationPayload<'a> {
    user_id: &'a str,
    amount: Amount,
}

/// `POST /reservas` with `{"userId": "<prefix>-<vu>-<iter>", "amount": <amount>}`.
#[derive(Debug, Clone)]
pub struct ReservationRequestBuilder {
    url: String,
    timeout: Duration,
    user_prefix: String,
    amount: Amount,
}

impl ReservationRequestBuilder {
    pub fn new(config: &WorkloadConfig) -> Self {
        Self {
            url: config.target.url.to_string(),
            timeout: config.target.timeout,
            user_prefix: config.payload.user_prefix.clone(),
            amount: config.payload.amount,
        }
    }

    pub fn user_id(&self, ctx: IterationContext) -> String {
        format!("{}-{}", self.user_prefix, ctx.token())
    }

    fn body(&self, user_id: &str) -> Bytes {
        let payload = ReservationPayload {
            user_id,
            amount: self.amount,
        };
        // Unreachable for this payload shape.
        match serde_json::to_vec(&payload) {
            Ok(v) => Bytes::from(v),
            Err(err) => {
                tracing::error!(error = %err, "failed to encode reservation payload");
                Bytes::new()
            }
        }
    }
}

impl RequestBuilder for ReservationRequestBuilder {
    fn build(&self, ctx: IterationContext) -> RequestSpec {
        let user_id = self.user_id(ctx);

        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());

        RequestSpec {
            method: http::Method::POST,
            url: self.url.clone(),
            headers,
            body: self.body(&user_id),
            timeout: self.timeout,
        }
    }
}
