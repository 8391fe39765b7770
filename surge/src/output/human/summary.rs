use std::fmt::Write as _;

use surge_core::metrics::{
    CHECKS, DATA_RECEIVED, DATA_SENT, HTTP_REQ_FAILED, HTTP_REQS, VUS, VUS_MAX,
};
use surge_core::{MetricSeriesSummary, MetricUnit, MetricValue, RunReport};

use super::format::*;

pub(crate) fn render(report: &RunReport) -> String {
    let mut out = String::new();

    out.push_str("summary\n");
    writeln!(out, "  stop_reason: {}", report.stop_reason).ok();
    writeln!(
        out,
        "  duration: {}",
        format_ms_opt(Some(report.duration.as_secs_f64() * 1000.0))
    )
    .ok();

    let per_vu_min = report.vu_iterations.iter().min().copied().unwrap_or(0);
    let per_vu_max = report.vu_iterations.iter().max().copied().unwrap_or(0);
    writeln!(
        out,
        "  iterations: {} (vus {}, per vu {per_vu_min}..{per_vu_max})",
        report.iterations,
        report.vu_iterations.len()
    )
    .ok();

    let requests = counter(report, HTTP_REQS);
    let failed = match report.metric(HTTP_REQ_FAILED).map(|m| &m.values) {
        Some(MetricValue::Rate { hits, .. }) => *hits,
        _ => 0,
    };
    let secs = report.duration.as_secs_f64().max(1e-9);
    writeln!(
        out,
        "  requests: {requests} (failed {failed}) rps={}",
        format_rate(requests as f64 / secs)
    )
    .ok();
    writeln!(
        out,
        "  data: recv {} sent {}",
        format_bytes(counter(report, DATA_RECEIVED)),
        format_bytes(counter(report, DATA_SENT))
    )
    .ok();

    render_checks(report, &mut out);
    render_metrics(&report.metrics, &mut out);
    render_thresholds(report, &mut out);

    out
}

fn counter(report: &RunReport, name: &str) -> u64 {
    match report.metric(name).map(|m| &m.values) {
        Some(MetricValue::Counter(v)) => *v,
        _ => 0,
    }
}

fn render_checks(report: &RunReport, out: &mut String) {
    if report.checks.is_empty() {
        return;
    }

    out.push_str("\nchecks\n");
    for c in &report.checks {
        let status = if c.fails > 0 { "FAIL" } else { "OK" };
        writeln!(
            out,
            "  {}: pass={} fail={} [{status}]",
            c.name, c.passes, c.fails
        )
        .ok();
    }
}

fn render_metrics(series: &[MetricSeriesSummary], out: &mut String) {
    // Per-check series are already listed under `checks`.
    let mut rows: Vec<&MetricSeriesSummary> = series
        .iter()
        .filter(|s| s.name != CHECKS || s.tags.is_empty())
        .collect();
    if rows.is_empty() {
        return;
    }
    rows.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.tags.cmp(&b.tags)));

    // `vus` correctly ends at 0; pair it with the configured pool size instead of printing
    // two gauges.
    let vus_max = rows.iter().find_map(|s| match (&s.name[..], &s.values) {
        (VUS_MAX, MetricValue::Gauge(v)) if s.tags.is_empty() => Some(*v),
        _ => None,
    });

    out.push_str("\nmetrics\n");

    for s in rows {
        let tags_s = format_tags_inline(&s.tags);

        if s.name == VUS_MAX && vus_max.is_some() {
            continue;
        }
        if let (VUS, MetricValue::Gauge(end), Some(max)) = (&s.name[..], &s.values, vus_max) {
            writeln!(out, "  {}{} = end={end} max={max}", s.name, tags_s).ok();
            continue;
        }

        match &s.values {
            MetricValue::Counter(v) => {
                writeln!(out, "  {}{} = {v}", s.name, tags_s).ok();
            }
            MetricValue::Gauge(v) => {
                writeln!(out, "  {}{} = {v}", s.name, tags_s).ok();
            }
            MetricValue::Rate { total, hits, rate } => match rate {
                Some(rate) => {
                    writeln!(
                        out,
                        "  {}{} = hits={hits} total={total} rate={rate:.3}",
                        s.name, tags_s
                    )
                    .ok();
                }
                None => {
                    writeln!(out, "  {}{} = hits={hits} total={total}", s.name, tags_s).ok();
                }
            },
            MetricValue::Histogram(h) => {
                let fmt = |v: Option<f64>| match s.unit {
                    MetricUnit::Duration => format_ms_opt(v),
                    MetricUnit::Plain => v.map_or_else(|| "-".to_string(), |v| format!("{v:.2}")),
                };
                writeln!(
                    out,
                    "  {}{} = p50={} p90={} p95={} p99={} mean={} max={} (n={})",
                    s.name,
                    tags_s,
                    fmt(h.p50),
                    fmt(h.p90),
                    fmt(h.p95),
                    fmt(h.p99),
                    fmt(h.mean),
                    fmt(h.max),
                    h.count
                )
                .ok();
            }
        }
    }
}

fn render_thresholds(report: &RunReport, out: &mut String) {
    if report.verdict.thresholds.is_empty() {
        return;
    }

    out.push_str("\nthresholds\n");
    for v in &report.verdict.thresholds {
        let mark = if v.passed { "✓" } else { "✗" };
        let observed = v
            .observed
            .map_or_else(|| "-".to_string(), |o| format!("{o:.3}"));
        let margin = v
            .margin
            .map_or_else(|| "-".to_string(), |m| format!("{m:+.3}"));
        writeln!(
            out,
            "  {mark} {}: {} observed={observed} margin={margin} (n={})",
            v.metric, v.expression, v.samples
        )
        .ok();
    }

    let verdict = if report.passed() { "PASS" } else { "FAIL" };
    writeln!(out, "\nresult: {verdict}").ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use surge_core::{
        CheckSummary, MetricKind, RunVerdict, StopReason, ThresholdVerdict,
    };

    fn series(name: &str, kind: MetricKind, values: MetricValue) -> MetricSeriesSummary {
        MetricSeriesSummary {
            name: name.to_string(),
            kind,
            unit: MetricUnit::Plain,
            tags: vec![],
            values,
        }
    }

    fn report(verdict: RunVerdict) -> RunReport {
        RunReport {
            started_at: SystemTime::now(),
            duration: Duration::from_secs(2),
            stop_reason: StopReason::IterationsComplete,
            iterations: 10,
            vu_iterations: vec![5, 5],
            checks: vec![CheckSummary {
                name: "status is 202".to_string(),
                passes: 8,
                fails: 2,
            }],
            metrics: vec![
                series(HTTP_REQS, MetricKind::Counter, MetricValue::Counter(10)),
                series(
                    HTTP_REQ_FAILED,
                    MetricKind::Rate,
                    MetricValue::Rate {
                        total: 10,
                        hits: 2,
                        rate: Some(0.2),
                    },
                ),
                series(DATA_SENT, MetricKind::Counter, MetricValue::Counter(2048)),
                series(VUS, MetricKind::Gauge, MetricValue::Gauge(0)),
                series(VUS_MAX, MetricKind::Gauge, MetricValue::Gauge(2)),
            ],
            verdict,
        }
    }

    #[test]
    fn render_includes_totals_and_checks() {
        let text = render(&report(RunVerdict {
            thresholds: vec![],
            passed: true,
        }));

        assert!(text.contains("stop_reason: iterations_complete"));
        assert!(text.contains("iterations: 10 (vus 2, per vu 5..5)"));
        assert!(text.contains("requests: 10 (failed 2) rps=5.0"));
        assert!(text.contains("data: recv 0B sent 2.00KiB"));
        assert!(text.contains("status is 202: pass=8 fail=2 [FAIL]"));
        assert!(text.contains("http_req_failed = hits=2 total=10 rate=0.200"));
        assert!(text.contains("vus = end=0 max=2"));
        assert!(!text.contains("vus_max"));
        assert!(!text.contains("thresholds"));
    }

    #[test]
    fn render_marks_each_threshold() {
        let text = render(&report(RunVerdict {
            thresholds: vec![
                ThresholdVerdict {
                    metric: HTTP_REQ_FAILED.to_string(),
                    expression: "rate<0.01".to_string(),
                    observed: Some(0.2),
                    samples: 10,
                    passed: false,
                    margin: Some(0.19),
                    abort_on_fail: false,
                },
                ThresholdVerdict {
                    metric: "http_req_duration".to_string(),
                    expression: "p(95)<500".to_string(),
                    observed: Some(12.0),
                    samples: 10,
                    passed: true,
                    margin: Some(-488.0),
                    abort_on_fail: false,
                },
            ],
            passed: false,
        }));

        assert!(text.contains("✗ http_req_failed: rate<0.01 observed=0.200 margin=+0.190"));
        assert!(text.contains("(n=10)"));
        assert!(text.contains("✓ http_req_duration: p(95)<500 observed=12.000 margin=-488.000"));
        assert!(text.contains("result: FAIL"));
    }
}
