use std::time::Duration;

use bytes::Bytes;
use surge_http::HttpTransportErrorKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Body(Bytes),
    Error {
        kind: HttpTransportErrorKind,
        message: String,
    },
}

/// What one executed request produced. Transport failures are observations too, with status 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseObservation {
    pub status: u16,
    pub latency: Duration,
    pub outcome: Outcome,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl ResponseObservation {
    pub fn response(status: u16, latency: Duration, body: Bytes) -> Self {
        Self {
            status,
            latency,
            outcome: Outcome::Body(body),
            bytes_sent: 0,
            bytes_received: 0,
        }
    }

    pub fn transport_error(
        kind: HttpTransportErrorKind,
        message: impl Into<String>,
        latency: Duration,
    ) -> Self {
        Self {
            status: 0,
            latency,
            outcome: Outcome::Error {
                kind,
                message: message.into(),
            },
            bytes_sent: 0,
            bytes_received: 0,
        }
    }

    #[must_use]
    pub fn with_bytes(mut self, sent: u64, received: u64) -> Self {
        self.bytes_sent = sent;
        self.bytes_received = received;
        self
    }

    pub fn body(&self) -> Option<&Bytes> {
        match &self.outcome {
            Outcome::Body(b) => Some(b),
            Outcome::Error { .. } => None,
        }
    }

    pub fn body_utf8(&self) -> Option<&str> {
        self.body().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn error_kind(&self) -> Option<HttpTransportErrorKind> {
        match &self.outcome {
            Outcome::Error { kind, .. } => Some(*kind),
            Outcome::Body(_) => None,
        }
    }

    pub fn is_transport_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error { .. })
    }

    /// Counted by `http_req_failed`: no response at all, or a status outside 200..=399.
    pub fn is_failed(&self) -> bool {
        self.is_transport_error() || !(200..=399).contains(&self.status)
    }
}
