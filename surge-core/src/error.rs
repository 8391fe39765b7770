use std::time::Duration;

use surge_metrics::MetricKind;

pub type Result<T> = std::result::Result<T, Error>;

/// A workload that cannot run. Always raised before the first VU starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("`vus` must be a positive integer")]
    InvalidVus,

    #[error("`iterations` must be a positive integer")]
    InvalidIterations,

    #[error("`duration` must be a positive duration")]
    InvalidDuration,

    #[error("missing target base URL (set `target.baseUrl` or pass `--base-url`)")]
    MissingBaseUrl,

    #[error("invalid target URL `{url}`: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("invalid target path `{0}`: must start with `/`")]
    InvalidPath(String),

    #[error("`target.timeout` must be a positive duration")]
    InvalidTimeout,

    #[error("invalid amount `{value}`: {reason}")]
    InvalidAmount { value: String, reason: &'static str },

    #[error("`payload.userPrefix` must not be empty")]
    EmptyUserPrefix,

    #[error("invalid think time: min {min:?} is greater than max {max:?}")]
    InvalidThinkTime { min: Duration, max: Duration },

    #[error("invalid HTTP status code {0}")]
    InvalidStatus(u16),

    #[error("invalid check `{name}`: {reason}")]
    InvalidCheck { name: String, reason: String },

    #[error("duplicate check name `{0}`")]
    DuplicateCheck(String),

    #[error("invalid threshold `{expression}` on `{metric}`: {reason}")]
    InvalidThreshold {
        metric: String,
        expression: String,
        reason: String,
    },

    #[error("threshold references unknown metric `{0}`")]
    UnknownMetric(String),

    #[error("`{agg}` cannot be applied to {kind} metric `{metric}`")]
    AggregationMismatch {
        metric: String,
        agg: String,
        kind: MetricKind,
    },

    #[error("threshold `{expression}` uses a time unit but `{metric}` is not a duration metric")]
    UnitMismatch { metric: String, expression: String },

    #[error("`thresholdEvalInterval` must be a positive duration")]
    InvalidEvalInterval,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("metrics error: {0}")]
    Metrics(#[from] surge_metrics::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}
