pub mod agg;
pub mod key;
pub mod metrics;
pub mod registry;
pub mod tags;

pub use agg::Query;
pub use key::KeyId;
pub use metrics::{
    Distribution, HistogramSummary, MetricHandle, MetricKind, MetricSeriesSummary, MetricUnit,
    MetricValue, SeriesSnapshot,
};
pub use registry::{MetricDef, MetricId, Registry};
pub use tags::TagSet;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("metric `{name}` is already registered as {registered}, not {requested}")]
    KindMismatch {
        name: String,
        registered: MetricKind,
        requested: MetricKind,
    },

    #[error("too many metrics registered")]
    TooManyMetrics,
}

pub type Result<T> = std::result::Result<T, Error>;
