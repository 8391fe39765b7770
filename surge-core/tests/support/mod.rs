#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use surge_core::{
    HttpTransportErrorKind, RequestSpec, ResponseObservation, RunConfig, ThresholdSet,
    ThresholdSpec, Transport, WorkloadConfig, WorkloadOptions, workload_from_options,
};

/// In-process transport with a fixed answer and a fixed (virtual) latency.
///
/// Clones share their call log.
#[derive(Debug, Clone)]
pub struct FakeTransport {
    latency: Duration,
    answer: Answer,
    calls: Arc<AtomicU64>,
    requests: Arc<Mutex<Vec<RequestSpec>>>,
}

#[derive(Debug, Clone)]
enum Answer {
    Status(u16, Bytes),
    Error(HttpTransportErrorKind),
}

impl FakeTransport {
    pub fn status(status: u16, latency: Duration) -> Self {
        Self::new(
            Answer::Status(status, Bytes::from_static(br#"{"status":"PENDING_PAYMENT"}"#)),
            latency,
        )
    }

    pub fn error(kind: HttpTransportErrorKind, latency: Duration) -> Self {
        Self::new(Answer::Error(kind), latency)
    }

    fn new(answer: Answer, latency: Duration) -> Self {
        Self {
            latency,
            answer,
            calls: Arc::default(),
            requests: Arc::default(),
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn requests(&self) -> Vec<RequestSpec> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Transport for FakeTransport {
    async fn execute(&self, req: RequestSpec) -> ResponseObservation {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(req);

        tokio::time::sleep(self.latency).await;

        match &self.answer {
            Answer::Status(status, body) => {
                ResponseObservation::response(*status, self.latency, body.clone())
            }
            Answer::Error(kind) => {
                ResponseObservation::transport_error(*kind, kind.to_string(), self.latency)
            }
        }
    }
}

pub fn options(base_url: &str) -> WorkloadOptions {
    WorkloadOptions {
        base_url: Some(base_url.to_string()),
        ..WorkloadOptions::default()
    }
}

pub fn thresholds(metric: &str, exprs: &[&str], abort_on_fail: bool) -> ThresholdSet {
    ThresholdSet {
        metric: metric.to_string(),
        thresholds: exprs
            .iter()
            .map(|e| ThresholdSpec {
                expression: (*e).to_string(),
                abort_on_fail,
            })
            .collect(),
    }
}

pub fn config(opts: WorkloadOptions) -> WorkloadConfig {
    workload_from_options(opts, RunConfig::default()).unwrap_or_else(|e| panic!("{e}"))
}
