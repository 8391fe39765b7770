use serde::Serialize;
use std::io::Write as _;
use std::path::Path;
use std::time::UNIX_EPOCH;

use surge_core::{MetricValue, RunReport, WorkloadConfig};

use super::OutputFormatter;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _workload: &Path, _cfg: &WorkloadConfig) {}

    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()> {
        let line = build_summary_line(report);
        let mut out = std::io::stdout().lock();
        serde_json::to_writer(&mut out, &line)?;
        writeln!(out)?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub passed: bool,
    pub stop_reason: &'static str,
    pub started_at_ms: u64,
    pub duration_ms: f64,
    pub iterations: u64,
    pub vu_iterations: Vec<u64>,
    pub checks: Vec<JsonCheck>,
    pub metrics: Vec<JsonMetric>,
    pub thresholds: Vec<JsonThreshold>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonCheck {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonMetric {
    pub name: String,
    pub kind: String,
    pub unit: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<(String, String)>,
    pub values: JsonMetricValue,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum JsonMetricValue {
    Counter {
        count: u64,
    },
    Gauge {
        value: i64,
    },
    Rate {
        total: u64,
        hits: u64,
        rate: Option<f64>,
    },
    Histogram {
        count: u64,
        min: Option<f64>,
        max: Option<f64>,
        mean: Option<f64>,
        stdev: Option<f64>,
        p50: Option<f64>,
        p90: Option<f64>,
        p95: Option<f64>,
        p99: Option<f64>,
    },
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonThreshold {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub margin: Option<f64>,
    pub samples: u64,
    pub passed: bool,
    pub abort_on_fail: bool,
}

pub(crate) fn build_summary_line(report: &RunReport) -> JsonSummaryLine {
    let started_at_ms = report
        .started_at
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));

    JsonSummaryLine {
        kind: "summary",
        passed: report.passed(),
        stop_reason: report.stop_reason.into(),
        started_at_ms,
        duration_ms: report.duration.as_secs_f64() * 1000.0,
        iterations: report.iterations,
        vu_iterations: report.vu_iterations.clone(),
        checks: report
            .checks
            .iter()
            .map(|c| JsonCheck {
                name: c.name.clone(),
                passes: c.passes,
                fails: c.fails,
            })
            .collect(),
        metrics: report
            .metrics
            .iter()
            .map(|s| JsonMetric {
                name: s.name.clone(),
                kind: s.kind.to_string(),
                unit: s.unit.to_string(),
                tags: s.tags.clone(),
                values: match &s.values {
                    MetricValue::Counter(count) => JsonMetricValue::Counter { count: *count },
                    MetricValue::Gauge(value) => JsonMetricValue::Gauge { value: *value },
                    MetricValue::Rate { total, hits, rate } => JsonMetricValue::Rate {
                        total: *total,
                        hits: *hits,
                        rate: *rate,
                    },
                    MetricValue::Histogram(h) => JsonMetricValue::Histogram {
                        count: h.count,
                        min: h.min,
                        max: h.max,
                        mean: h.mean,
                        stdev: h.stdev,
                        p50: h.p50,
                        p90: h.p90,
                        p95: h.p95,
                        p99: h.p99,
                    },
                },
            })
            .collect(),
        thresholds: report
            .verdict
            .thresholds
            .iter()
            .map(|v| JsonThreshold {
                metric: v.metric.clone(),
                expression: v.expression.clone(),
                observed: v.observed,
                margin: v.margin,
                samples: v.samples,
                passed: v.passed,
                abort_on_fail: v.abort_on_fail,
            })
            .collect(),
    }
}
