use std::fmt;
use std::time::Duration;

use surge_metrics::{MetricKind, MetricUnit, SeriesSnapshot};

use crate::config::ThresholdSpec;
use crate::error::ConfigError;
use crate::metrics::MetricsAggregator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Ne,
}

impl ThresholdOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }

    fn compare(self, left: f64, right: f64) -> bool {
        match self {
            Self::Lt => left < right,
            Self::Lte => left <= right,
            Self::Gt => left > right,
            Self::Gte => left >= right,
            Self::Eq => left == right,
            Self::Ne => left != right,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdAgg {
    Avg,
    Min,
    Max,
    Med,
    Count,
    Rate,
    Sum,
    Value,
    /// Percentile in `(0, 100]`.
    P(f64),
}

impl fmt::Display for ThresholdAgg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Avg => f.write_str("avg"),
            Self::Min => f.write_str("min"),
            Self::Max => f.write_str("max"),
            Self::Med => f.write_str("med"),
            Self::Count => f.write_str("count"),
            Self::Rate => f.write_str("rate"),
            Self::Sum => f.write_str("sum"),
            Self::Value => f.write_str("value"),
            Self::P(p) => write!(f, "p({p})"),
        }
    }
}

impl ThresholdAgg {
    fn applies_to(self, kind: MetricKind) -> bool {
        match kind {
            MetricKind::Histogram => !matches!(self, Self::Rate | Self::Value),
            MetricKind::Counter => matches!(self, Self::Count | Self::Sum | Self::Rate),
            MetricKind::Rate => matches!(self, Self::Rate | Self::Count),
            MetricKind::Gauge => matches!(self, Self::Value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdExpr {
    pub agg: ThresholdAgg,
    pub op: ThresholdOp,
    /// Target, in milliseconds when `has_time_unit` is set.
    pub value: f64,
    pub has_time_unit: bool,
}

impl fmt::Display for ThresholdExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.agg, self.op.symbol(), self.value)
    }
}

pub fn parse_threshold_expr(raw: &str) -> Result<ThresholdExpr, String> {
    let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return Err("empty threshold".to_string());
    }

    let ops = [
        ("<=", ThresholdOp::Lte),
        (">=", ThresholdOp::Gte),
        ("==", ThresholdOp::Eq),
        ("!=", ThresholdOp::Ne),
        ("<", ThresholdOp::Lt),
        (">", ThresholdOp::Gt),
    ];
    let (op_pos, op_len, op) = ops
        .iter()
        .find_map(|(tok, op)| s.find(tok).map(|pos| (pos, tok.len(), *op)))
        .ok_or_else(|| "missing comparison operator".to_string())?;

    let (left, right_with_op) = s.split_at(op_pos);
    let right = &right_with_op[op_len..];
    if left.is_empty() || right.is_empty() {
        return Err("expected `<aggregation> <operator> <value>`".to_string());
    }

    let agg = match left.to_ascii_lowercase().as_str() {
        "avg" => ThresholdAgg::Avg,
        "min" => ThresholdAgg::Min,
        "max" => ThresholdAgg::Max,
        "med" => ThresholdAgg::Med,
        "count" => ThresholdAgg::Count,
        "rate" => ThresholdAgg::Rate,
        "sum" => ThresholdAgg::Sum,
        "value" => ThresholdAgg::Value,
        other => {
            let inner = other
                .strip_prefix("p(")
                .and_then(|v| v.strip_suffix(')'))
                .ok_or_else(|| format!("unknown aggregation `{left}`"))?;
            let p: f64 = inner
                .parse()
                .map_err(|_| format!("invalid percentile `{inner}`"))?;
            if !(p > 0.0 && p <= 100.0) {
                return Err(format!("percentile `{inner}` out of range (0, 100]"));
            }
            ThresholdAgg::P(p)
        }
    };

    // Durations are compared in milliseconds.
    let (number, to_ms): (&str, fn(f64) -> f64) = if let Some(n) = right.strip_suffix("ms") {
        (n, |v| v)
    } else if let Some(n) = right
        .strip_suffix("us")
        .or_else(|| right.strip_suffix("µs"))
    {
        (n, |v| v / 1000.0)
    } else if let Some(n) = right.strip_suffix('s') {
        (n, |v| v * 1000.0)
    } else {
        (right, |v| v)
    };
    let has_time_unit = number.len() != right.len();

    let value: f64 = number
        .parse()
        .map_err(|_| format!("invalid numeric value `{right}`"))?;
    if !value.is_finite() {
        return Err(format!("invalid numeric value `{right}`"));
    }

    Ok(ThresholdExpr {
        agg,
        op,
        value: to_ms(value),
        has_time_unit,
    })
}

/// Metric name with optional tag filter, e.g. `checks{check:status is 202}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSelector {
    pub name: String,
    pub tags: Vec<(String, String)>,
}

pub fn parse_metric_selector(raw: &str) -> Result<MetricSelector, String> {
    let raw = raw.trim();
    let Some((name, rest)) = raw.split_once('{') else {
        if raw.is_empty() {
            return Err("empty metric name".to_string());
        }
        return Ok(MetricSelector {
            name: raw.to_string(),
            tags: Vec::new(),
        });
    };

    let name = name.trim();
    let inner = rest
        .strip_suffix('}')
        .ok_or_else(|| format!("unterminated tag selector in `{raw}`"))?;
    if name.is_empty() {
        return Err("empty metric name".to_string());
    }

    let mut tags = Vec::new();
    for pair in inner.split(',').filter(|p| !p.trim().is_empty()) {
        let (k, v) = pair
            .split_once(':')
            .ok_or_else(|| format!("tag `{pair}` must be written as `key:value`"))?;
        let (k, v) = (k.trim(), v.trim());
        if k.is_empty() || v.is_empty() {
            return Err(format!("tag `{pair}` must be written as `key:value`"));
        }
        tags.push((k.to_string(), v.to_string()));
    }
    if tags.is_empty() {
        return Err(format!("empty tag selector in `{raw}`"));
    }

    Ok(MetricSelector {
        name: name.to_string(),
        tags,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    /// Metric key as written, tag selector included.
    pub metric: String,
    pub selector: MetricSelector,
    pub expression: String,
    pub expr: ThresholdExpr,
    pub abort_on_fail: bool,
}

impl Threshold {
    pub fn parse(metric: &str, spec: &ThresholdSpec) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidThreshold {
            metric: metric.to_string(),
            expression: spec.expression.clone(),
            reason,
        };

        let selector = parse_metric_selector(metric).map_err(invalid)?;
        let expr = parse_threshold_expr(&spec.expression).map_err(invalid)?;

        Ok(Self {
            metric: metric.to_string(),
            selector,
            expression: spec.expression.clone(),
            expr,
            abort_on_fail: spec.abort_on_fail,
        })
    }

    pub fn validate(&self, kind: MetricKind, unit: MetricUnit) -> Result<(), ConfigError> {
        if !self.expr.agg.applies_to(kind) {
            return Err(ConfigError::AggregationMismatch {
                metric: self.metric.clone(),
                agg: self.expr.agg.to_string(),
                kind,
            });
        }
        if self.expr.has_time_unit && unit != MetricUnit::Duration {
            return Err(ConfigError::UnitMismatch {
                metric: self.metric.clone(),
                expression: self.expression.clone(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdVerdict {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub samples: u64,
    pub passed: bool,
    /// `observed - target`; positive means above the target.
    pub margin: Option<f64>,
    pub abort_on_fail: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunVerdict {
    pub thresholds: Vec<ThresholdVerdict>,
    pub passed: bool,
}

impl RunVerdict {
    pub fn failed(&self) -> impl Iterator<Item = &ThresholdVerdict> {
        self.thresholds.iter().filter(|v| !v.passed)
    }
}

/// Evaluates thresholds against live metrics.
///
/// A threshold whose metric has no samples passes, unless `min_samples` is set, in which case
/// any threshold with fewer samples fails. Evaluation only reads: calling it twice against
/// unchanged metrics gives identical verdicts.
#[derive(Debug, Clone)]
pub struct ThresholdEngine {
    thresholds: Vec<Threshold>,
    min_samples: u64,
}

impl ThresholdEngine {
    pub fn new(
        thresholds: Vec<Threshold>,
        min_samples: u64,
        metrics: &MetricsAggregator,
    ) -> Result<Self, ConfigError> {
        for t in &thresholds {
            let (_, def) = metrics
                .registry()
                .lookup(&t.selector.name)
                .ok_or_else(|| ConfigError::UnknownMetric(t.selector.name.clone()))?;
            t.validate(def.kind, def.unit)?;
        }
        Ok(Self {
            thresholds,
            min_samples,
        })
    }

    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }

    pub fn has_abort_on_fail(&self) -> bool {
        self.thresholds.iter().any(|t| t.abort_on_fail)
    }

    pub fn evaluate(&self, metrics: &MetricsAggregator, elapsed: Duration) -> RunVerdict {
        let thresholds: Vec<ThresholdVerdict> = self
            .thresholds
            .iter()
            .map(|t| self.evaluate_one(t, metrics, elapsed))
            .collect();
        let passed = thresholds.iter().all(|v| v.passed);
        RunVerdict { thresholds, passed }
    }

    /// First `abortOnFail` threshold that is already failing on enough data.
    ///
    /// Thresholds below the sample minimum (or with no samples) never abort a run early.
    pub fn first_abort(
        &self,
        metrics: &MetricsAggregator,
        elapsed: Duration,
    ) -> Option<ThresholdVerdict> {
        self.thresholds
            .iter()
            .filter(|t| t.abort_on_fail)
            .map(|t| self.evaluate_one(t, metrics, elapsed))
            .find(|v| !v.passed && v.samples >= self.min_samples.max(1))
    }

    fn evaluate_one(
        &self,
        t: &Threshold,
        metrics: &MetricsAggregator,
        elapsed: Duration,
    ) -> ThresholdVerdict {
        let tags: Vec<(&str, &str)> = t
            .selector
            .tags
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let unit = metrics
            .registry()
            .lookup(&t.selector.name)
            .map_or(MetricUnit::Plain, |(_, def)| def.unit);

        let snapshot = metrics.series(&t.selector.name, &tags);
        let samples = snapshot.as_ref().map_or(0, SeriesSnapshot::samples);
        let observed = snapshot.and_then(|s| observe(&s, t.expr.agg, unit, elapsed));

        let passed = if samples < self.min_samples {
            false
        } else if samples == 0 {
            true
        } else {
            observed.is_some_and(|v| t.expr.op.compare(v, t.expr.value))
        };

        ThresholdVerdict {
            metric: t.metric.clone(),
            expression: t.expression.clone(),
            observed,
            samples,
            passed,
            margin: observed.map(|v| v - t.expr.value),
            abort_on_fail: t.abort_on_fail,
        }
    }
}

fn observe(
    snapshot: &SeriesSnapshot,
    agg: ThresholdAgg,
    unit: MetricUnit,
    elapsed: Duration,
) -> Option<f64> {
    let scale = |v: u64| unit.report(v as f64);

    match (snapshot, agg) {
        (SeriesSnapshot::Histogram(d), ThresholdAgg::Avg) => d.mean().map(|m| unit.report(m)),
        (SeriesSnapshot::Histogram(d), ThresholdAgg::Min) => d.min().map(scale),
        (SeriesSnapshot::Histogram(d), ThresholdAgg::Max) => d.max().map(scale),
        (SeriesSnapshot::Histogram(d), ThresholdAgg::Med) => d.percentile(50.0).map(scale),
        (SeriesSnapshot::Histogram(d), ThresholdAgg::P(p)) => d.percentile(p).map(scale),
        (SeriesSnapshot::Histogram(d), ThresholdAgg::Count) => Some(d.count() as f64),
        (SeriesSnapshot::Histogram(d), ThresholdAgg::Sum) => Some(scale(d.sum())),

        (SeriesSnapshot::Counter(v), ThresholdAgg::Count | ThresholdAgg::Sum) => Some(*v as f64),
        (SeriesSnapshot::Counter(v), ThresholdAgg::Rate) => {
            let secs = elapsed.as_secs_f64();
            (secs > 0.0).then(|| *v as f64 / secs)
        }

        (SeriesSnapshot::Rate { total, hits }, ThresholdAgg::Rate) => {
            (*total > 0).then(|| *hits as f64 / *total as f64)
        }
        (SeriesSnapshot::Rate { total, .. }, ThresholdAgg::Count) => Some(*total as f64),

        (SeriesSnapshot::Gauge(v), ThresholdAgg::Value) => Some(*v as f64),

        _ => None,
    }
}
