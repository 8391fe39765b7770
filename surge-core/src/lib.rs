mod amount;
mod check;
mod error;
mod observation;
mod report;
mod request;
mod transport;

pub mod config;
pub mod metrics;
pub mod runner;
pub mod thresholds;

pub use amount::Amount;
pub use check::{Check, CheckResult, CheckSet};
pub use config::{
    CheckSpec, RunConfig, ThinkTime, ThresholdSet, ThresholdSpec, WorkloadConfig,
    WorkloadOptions, workload_from_options,
};
pub use error::{ConfigError, Error, Result};
pub use metrics::MetricsAggregator;
pub use observation::{Outcome, ResponseObservation};
pub use report::{CheckSummary, RunReport, StopReason};
pub use request::{IterationContext, RequestBuilder, RequestSpec, ReservationRequestBuilder};
pub use runner::{StopSignal, VuEvent, VuState, Workload};
pub use thresholds::{RunVerdict, Threshold, ThresholdEngine, ThresholdVerdict};
pub use transport::Transport;

pub use surge_http::{HttpClient, HttpTransportErrorKind};
pub use surge_metrics::{MetricKind, MetricSeriesSummary, MetricUnit, MetricValue};
