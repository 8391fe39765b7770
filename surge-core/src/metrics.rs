use std::time::Duration;

use surge_metrics::{
    MetricHandle, MetricId, MetricKind, MetricSeriesSummary, MetricUnit, Registry, SeriesSnapshot,
    TagSet,
};

use crate::observation::ResponseObservation;
use crate::report::CheckSummary;

pub const HTTP_REQS: &str = "http_reqs";
pub const HTTP_REQ_DURATION: &str = "http_req_duration";
pub const HTTP_REQ_FAILED: &str = "http_req_failed";
pub const HTTP_REQ_ERRORS: &str = "http_req_errors";
pub const CHECKS: &str = "checks";
pub const ITERATIONS: &str = "iterations";
pub const ITERATION_DURATION: &str = "iteration_duration";
pub const DATA_SENT: &str = "data_sent";
pub const DATA_RECEIVED: &str = "data_received";
pub const VUS: &str = "vus";
pub const VUS_MAX: &str = "vus_max";

pub const TAG_STATUS: &str = "status";
pub const TAG_CHECK: &str = "check";
pub const TAG_ERROR_KIND: &str = "error_kind";

/// Every metric the engine records on its own, with its kind and unit.
pub const BUILTIN_METRICS: &[(&str, MetricKind, MetricUnit)] = &[
    (HTTP_REQS, MetricKind::Counter, MetricUnit::Plain),
    (HTTP_REQ_DURATION, MetricKind::Histogram, MetricUnit::Duration),
    (HTTP_REQ_FAILED, MetricKind::Rate, MetricUnit::Plain),
    (HTTP_REQ_ERRORS, MetricKind::Counter, MetricUnit::Plain),
    (CHECKS, MetricKind::Rate, MetricUnit::Plain),
    (ITERATIONS, MetricKind::Counter, MetricUnit::Plain),
    (ITERATION_DURATION, MetricKind::Histogram, MetricUnit::Duration),
    (DATA_SENT, MetricKind::Counter, MetricUnit::Plain),
    (DATA_RECEIVED, MetricKind::Counter, MetricUnit::Plain),
    (VUS, MetricKind::Gauge, MetricUnit::Plain),
    (VUS_MAX, MetricKind::Gauge, MetricUnit::Plain),
];

pub fn builtin_metric(name: &str) -> Option<(MetricKind, MetricUnit)> {
    BUILTIN_METRICS
        .iter()
        .find(|(n, ..)| *n == name)
        .map(|(_, kind, unit)| (*kind, *unit))
}

#[derive(Debug)]
struct Builtin {
    http_reqs_id: MetricId,
    http_req_duration_id: MetricId,
    http_req_errors_id: MetricId,
    checks_id: MetricId,

    http_reqs: MetricHandle,
    http_req_duration: MetricHandle,
    http_req_failed: MetricHandle,
    checks: MetricHandle,
    iterations: MetricHandle,
    iteration_duration: MetricHandle,
    data_sent: MetricHandle,
    data_received: MetricHandle,
    vus: MetricHandle,
    vus_max: MetricHandle,
}

/// Shared sink for every VU's observations. All methods take `&self` and are safe to call
/// concurrently; each update is one atomic operation or one short histogram lock.
#[derive(Debug)]
pub struct MetricsAggregator {
    registry: Registry,
    builtin: Builtin,
}

impl MetricsAggregator {
    pub fn new() -> surge_metrics::Result<Self> {
        let registry = Registry::default();
        for (name, kind, unit) in BUILTIN_METRICS {
            registry.register(name, *kind, *unit)?;
        }

        let id = |name: &str| -> surge_metrics::Result<MetricId> {
            registry.register(name, builtin_kind(name), builtin_unit(name))
        };
        let base = |name: &str| -> surge_metrics::Result<MetricHandle> {
            let id = id(name)?;
            registry
                .get_handle(id, TagSet::default())
                .ok_or(surge_metrics::Error::TooManyMetrics)
        };

        let builtin = Builtin {
            http_reqs_id: id(HTTP_REQS)?,
            http_req_duration_id: id(HTTP_REQ_DURATION)?,
            http_req_errors_id: id(HTTP_REQ_ERRORS)?,
            checks_id: id(CHECKS)?,

            http_reqs: base(HTTP_REQS)?,
            http_req_duration: base(HTTP_REQ_DURATION)?,
            http_req_failed: base(HTTP_REQ_FAILED)?,
            checks: base(CHECKS)?,
            iterations: base(ITERATIONS)?,
            iteration_duration: base(ITERATION_DURATION)?,
            data_sent: base(DATA_SENT)?,
            data_received: base(DATA_RECEIVED)?,
            vus: base(VUS)?,
            vus_max: base(VUS_MAX)?,
        };

        Ok(Self { registry, builtin })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Declares a custom metric so thresholds may reference it before it has samples.
    pub fn register(
        &self,
        name: &str,
        kind: MetricKind,
        unit: MetricUnit,
    ) -> surge_metrics::Result<MetricId> {
        self.registry.register(name, kind, unit)
    }

    fn handle(&self, name: &str, kind: MetricKind, unit: MetricUnit) -> Option<MetricHandle> {
        let id = match self.registry.register(name, kind, unit) {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(metric = name, error = %err, "dropping sample");
                return None;
            }
        };
        self.registry.get_handle(id, TagSet::default())
    }

    /// Records a numeric sample into histogram `metric`, created on first use.
    ///
    /// Duration metrics take milliseconds. Negative and non-finite samples are ignored.
    pub fn record(&self, metric: &str, value: f64) {
        if !value.is_finite() || value < 0.0 {
            tracing::warn!(metric, value, "ignoring invalid sample");
            return;
        }

        let unit = self
            .registry
            .lookup(metric)
            .map(|(_, def)| def.unit)
            .unwrap_or(MetricUnit::Plain);
        let raw = match unit {
            MetricUnit::Duration => (value * 1000.0).round() as u64,
            MetricUnit::Plain => value.round() as u64,
        };

        if let Some(h) = self.handle(metric, MetricKind::Histogram, unit) {
            h.observe(raw);
        }
    }

    pub fn record_duration(&self, metric: &str, d: Duration) {
        if let Some(h) = self.handle(metric, MetricKind::Histogram, MetricUnit::Duration) {
            h.observe_duration(d);
        }
    }

    /// Records one boolean sample into rate `metric`, created on first use.
    pub fn record_rate(&self, metric: &str, hit: bool) {
        if let Some(h) = self.handle(metric, MetricKind::Rate, MetricUnit::Plain) {
            h.add_rate(hit);
        }
    }

    pub fn add(&self, metric: &str, n: u64) {
        if let Some(h) = self.handle(metric, MetricKind::Counter, MetricUnit::Plain) {
            h.increment(n);
        }
    }

    fn tagged(&self, metric: MetricId, key: &str, value: &str) -> Option<MetricHandle> {
        self.registry
            .get_handle(metric, self.registry.resolve_tags(&[(key, value)]))
    }

    /// Records one executed request. Called exactly once per observation, whatever its outcome.
    pub fn record_observation(&self, obs: &ResponseObservation) {
        let b = &self.builtin;
        let status = obs.status.to_string();

        b.http_reqs.increment(1);
        if let Some(h) = self.tagged(b.http_reqs_id, TAG_STATUS, &status) {
            h.increment(1);
        }

        b.http_req_duration.observe_duration(obs.latency);
        if let Some(h) = self.tagged(b.http_req_duration_id, TAG_STATUS, &status) {
            h.observe_duration(obs.latency);
        }

        b.http_req_failed.add_rate(obs.is_failed());

        if let Some(kind) = obs.error_kind()
            && let Some(h) = self.tagged(b.http_req_errors_id, TAG_ERROR_KIND, &kind.to_string())
        {
            h.increment(1);
        }

        b.data_sent.increment(obs.bytes_sent);
        b.data_received.increment(obs.bytes_received);
    }

    pub fn record_check(&self, name: &str, passed: bool) {
        let b = &self.builtin;
        b.checks.add_rate(passed);
        if let Some(h) = self.tagged(b.checks_id, TAG_CHECK, name) {
            h.add_rate(passed);
        }
    }

    pub fn record_iteration(&self, elapsed: Duration) {
        self.builtin.iterations.increment(1);
        self.builtin.iteration_duration.observe_duration(elapsed);
    }

    pub fn vu_started(&self) {
        self.builtin.vus.add_gauge(1);
    }

    pub fn vu_stopped(&self) {
        self.builtin.vus.add_gauge(-1);
    }

    pub fn set_vus_max(&self, vus: u64) {
        self.builtin
            .vus_max
            .set_gauge(i64::try_from(vus).unwrap_or(i64::MAX));
    }

    /// Snapshot of the base series of `metric`, or of every series carrying `tags` merged.
    ///
    /// `None` when the metric is unknown or nothing has been recorded under those tags.
    pub fn series(&self, metric: &str, tags: &[(&str, &str)]) -> Option<SeriesSnapshot> {
        let (id, _) = self.registry.lookup(metric)?;
        if tags.is_empty() {
            return self.registry.series(id, &TagSet::default());
        }
        let tags = self.registry.find_tags(tags)?;
        self.registry.query(id).where_tags(&tags).merged()
    }

    /// Pass/fail counts per check name, in the order of `names`.
    pub fn check_summaries<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Vec<CheckSummary> {
        let check_k = self.registry.resolve_key(TAG_CHECK);
        let grouped = self
            .registry
            .query(self.builtin.checks_id)
            .where_has(check_k)
            .group_by([check_k])
            .sum_rate();

        names
            .into_iter()
            .map(|name| {
                let (total, passes) = self
                    .registry
                    .find_tags(&[(TAG_CHECK, name)])
                    .and_then(|tags| grouped.get(&tags).copied())
                    .unwrap_or((0, 0));
                CheckSummary {
                    name: name.to_string(),
                    passes,
                    fails: total.saturating_sub(passes),
                }
            })
            .collect()
    }

    pub fn summarize(&self) -> Vec<MetricSeriesSummary> {
        self.registry.summarize()
    }
}

fn builtin_kind(name: &str) -> MetricKind {
    builtin_metric(name).map_or(MetricKind::Counter, |(k, _)| k)
}

fn builtin_unit(name: &str) -> MetricUnit {
    builtin_metric(name).map_or(MetricUnit::Plain, |(_, u)| u)
}
