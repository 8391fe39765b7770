use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum MetricKind {
    Counter,
    Gauge,
    Rate,
    Histogram,
}

/// Unit of the raw values a metric records.
///
/// Durations are recorded in microseconds and reported in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum MetricUnit {
    Plain,
    Duration,
}

impl MetricUnit {
    #[must_use]
    pub fn report(self, raw: f64) -> f64 {
        match self {
            Self::Plain => raw,
            Self::Duration => raw / 1000.0,
        }
    }
}

// 1µs..1h with 3 significant digits: any quantile is within 0.1% of the true sample value.
const HISTOGRAM_HIGH: u64 = 3_600_000_000;
const HISTOGRAM_SIGFIG: u8 = 3;

pub(crate) fn new_histogram() -> Histogram<u64> {
    match Histogram::<u64>::new_with_bounds(1, HISTOGRAM_HIGH, HISTOGRAM_SIGFIG) {
        Ok(h) => h,
        Err(err) => panic!("failed to create histogram: {err}"),
    }
}

/// Streaming distribution: hdr histogram for quantiles, exact count and sum beside it.
#[derive(Debug, Clone)]
pub struct Distribution {
    hist: Histogram<u64>,
    sum: u64,
}

impl Default for Distribution {
    fn default() -> Self {
        Self {
            hist: new_histogram(),
            sum: 0,
        }
    }
}

impl Distribution {
    pub fn record(&mut self, value: u64) {
        self.hist.saturating_record(value);
        self.sum = self.sum.saturating_add(value);
    }

    pub fn merge(&mut self, other: &Distribution) {
        let _ = self.hist.add(&other.hist);
        self.sum = self.sum.saturating_add(other.sum);
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.hist.len()
    }

    #[must_use]
    pub fn sum(&self) -> u64 {
        self.sum
    }

    #[must_use]
    pub fn mean(&self) -> Option<f64> {
        let n = self.count();
        (n > 0).then(|| self.sum as f64 / n as f64)
    }

    #[must_use]
    pub fn min(&self) -> Option<u64> {
        (self.count() > 0).then(|| self.hist.min())
    }

    #[must_use]
    pub fn max(&self) -> Option<u64> {
        (self.count() > 0).then(|| self.hist.max())
    }

    /// `pct` in `(0, 100]`.
    #[must_use]
    pub fn percentile(&self, pct: f64) -> Option<u64> {
        (self.count() > 0).then(|| self.hist.value_at_percentile(pct))
    }

    #[must_use]
    pub fn stdev(&self) -> Option<f64> {
        (self.count() > 0).then(|| self.hist.stdev())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSummary {
    pub count: u64,
    pub sum: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub stdev: Option<f64>,
    pub p50: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
}

pub(crate) fn summarize_distribution(d: &Distribution, unit: MetricUnit) -> HistogramSummary {
    let scale = |v: u64| unit.report(v as f64);
    HistogramSummary {
        count: d.count(),
        sum: scale(d.sum()),
        min: d.min().map(scale),
        max: d.max().map(scale),
        mean: d.mean().map(|m| unit.report(m)),
        stdev: d.stdev().map(|s| unit.report(s)),
        p50: d.percentile(50.0).map(scale),
        p90: d.percentile(90.0).map(scale),
        p95: d.percentile(95.0).map(scale),
        p99: d.percentile(99.0).map(scale),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Counter(u64),
    Gauge(i64),
    Rate {
        total: u64,
        hits: u64,
        rate: Option<f64>,
    },
    Histogram(HistogramSummary),
}

#[derive(Debug, Clone)]
pub struct MetricSeriesSummary {
    pub name: String,
    pub kind: MetricKind,
    pub unit: MetricUnit,
    pub tags: Vec<(String, String)>,
    pub values: MetricValue,
}

/// Hit/total pair. Any snapshot, including one taken mid-run, satisfies `hits <= total`.
#[derive(Debug, Default)]
pub struct Rate {
    total: AtomicU64,
    hits: AtomicU64,
}

impl Rate {
    pub(crate) fn add(&self, hit: bool) {
        // `total` first; the release on `hits` publishes it to whoever acquires that hit.
        self.total.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.hits.fetch_add(1, Ordering::Release);
        }
    }

    /// Returns `(total, hits)`.
    #[must_use]
    pub fn load(&self) -> (u64, u64) {
        let hits = self.hits.load(Ordering::Acquire);
        let total = self.total.load(Ordering::Relaxed);
        (total, hits)
    }
}

#[derive(Debug)]
pub(crate) enum MetricStorage {
    Counter(Arc<AtomicU64>),
    Gauge(Arc<AtomicI64>),
    Rate(Arc<Rate>),
    Histogram(Arc<Mutex<Distribution>>),
}

impl MetricStorage {
    pub(crate) fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => Self::Counter(Arc::new(AtomicU64::new(0))),
            MetricKind::Gauge => Self::Gauge(Arc::new(AtomicI64::new(0))),
            MetricKind::Rate => Self::Rate(Arc::new(Rate::default())),
            MetricKind::Histogram => Self::Histogram(Arc::new(Mutex::new(Distribution::default()))),
        }
    }

    pub(crate) fn handle(&self) -> MetricHandle {
        match self {
            Self::Counter(a) => MetricHandle::Counter(a.clone()),
            Self::Gauge(a) => MetricHandle::Gauge(a.clone()),
            Self::Rate(a) => MetricHandle::Rate(a.clone()),
            Self::Histogram(a) => MetricHandle::Histogram(a.clone()),
        }
    }

    pub(crate) fn snapshot(&self) -> SeriesSnapshot {
        match self {
            Self::Counter(a) => SeriesSnapshot::Counter(a.load(Ordering::Relaxed)),
            Self::Gauge(a) => SeriesSnapshot::Gauge(a.load(Ordering::Relaxed)),
            Self::Rate(r) => {
                let (total, hits) = r.load();
                SeriesSnapshot::Rate { total, hits }
            }
            Self::Histogram(h) => SeriesSnapshot::Histogram(h.lock().clone()),
        }
    }
}

/// Point-in-time copy of one series, detached from the live registry.
#[derive(Debug, Clone)]
pub enum SeriesSnapshot {
    Counter(u64),
    Gauge(i64),
    Rate { total: u64, hits: u64 },
    Histogram(Distribution),
}

impl SeriesSnapshot {
    /// Number of observations that contributed to this series.
    #[must_use]
    pub fn samples(&self) -> u64 {
        match self {
            Self::Counter(v) => *v,
            Self::Gauge(_) => 1,
            Self::Rate { total, .. } => *total,
            Self::Histogram(d) => d.count(),
        }
    }

    pub(crate) fn into_value(self, unit: MetricUnit) -> MetricValue {
        match self {
            Self::Counter(v) => MetricValue::Counter(v),
            Self::Gauge(v) => MetricValue::Gauge(v),
            Self::Rate { total, hits } => MetricValue::Rate {
                total,
                hits,
                rate: (total > 0).then(|| hits as f64 / total as f64),
            },
            Self::Histogram(d) => MetricValue::Histogram(summarize_distribution(&d, unit)),
        }
    }
}

/// Writer side of one series. Every update is a single atomic op or one short lock.
#[derive(Debug, Clone)]
pub enum MetricHandle {
    Counter(Arc<AtomicU64>),
    Gauge(Arc<AtomicI64>),
    Rate(Arc<Rate>),
    Histogram(Arc<Mutex<Distribution>>),
}

impl MetricHandle {
    #[inline]
    pub fn increment(&self, value: u64) {
        if let Self::Counter(c) = self {
            c.fetch_add(value, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn set_gauge(&self, value: i64) {
        if let Self::Gauge(g) = self {
            g.store(value, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn add_gauge(&self, delta: i64) {
        if let Self::Gauge(g) = self {
            g.fetch_add(delta, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn add_rate(&self, hit: bool) {
        if let Self::Rate(r) = self {
            r.add(hit);
        }
    }

    #[inline]
    pub fn observe(&self, value: u64) {
        if let Self::Histogram(h) = self {
            h.lock().record(value);
        }
    }

    #[inline]
    pub fn observe_duration(&self, d: Duration) {
        let micros = u64::try_from(d.as_micros()).unwrap_or(u64::MAX);
        self.observe(micros.max(1));
    }

    #[must_use]
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) => MetricKind::Counter,
            Self::Gauge(_) => MetricKind::Gauge,
            Self::Rate(_) => MetricKind::Rate,
            Self::Histogram(_) => MetricKind::Histogram,
        }
    }
}
