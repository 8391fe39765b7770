use std::time::Duration;

use rand::Rng;
use url::Url;

use crate::amount::Amount;
use crate::error::ConfigError;
use crate::metrics::builtin_metric;
use crate::thresholds::Threshold;

pub const DEFAULT_PATH: &str = "/reservas";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_USER_PREFIX: &str = "user";
pub const DEFAULT_AMOUNT: &str = "120.50";
pub const DEFAULT_EXPECT_STATUS: u16 = 202;
pub const DEFAULT_EVAL_INTERVAL: Duration = Duration::from_secs(1);

/// Pause between two iterations of the same VU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThinkTime {
    Fixed(Duration),
    /// Uniformly drawn from `min..=max` before every pause.
    Uniform { min: Duration, max: Duration },
}

impl Default for ThinkTime {
    fn default() -> Self {
        Self::Fixed(Duration::ZERO)
    }
}

impl ThinkTime {
    pub fn sample(&self, rng: &mut impl Rng) -> Duration {
        match *self {
            Self::Fixed(d) => d,
            Self::Uniform { min, max } if min >= max => min,
            Self::Uniform { min, max } => {
                let nanos = rng.random_range(min.as_nanos()..=max.as_nanos());
                Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
            }
        }
    }

    /// Longest pause this can produce.
    pub fn max(&self) -> Duration {
        match *self {
            Self::Fixed(d) => d,
            Self::Uniform { max, .. } => max,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckSpec {
    Status { name: String, status: u16 },
    BodyContains { name: String, needle: String },
    JsonField { name: String, path: String },
}

impl CheckSpec {
    pub fn name(&self) -> &str {
        match self {
            Self::Status { name, .. }
            | Self::BodyContains { name, .. }
            | Self::JsonField { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdSpec {
    pub expression: String,
    pub abort_on_fail: bool,
}

impl From<&str> for ThresholdSpec {
    fn from(expression: &str) -> Self {
        Self {
            expression: expression.to_string(),
            abort_on_fail: false,
        }
    }
}

/// Threshold expressions declared for one metric key, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdSet {
    pub metric: String,
    pub thresholds: Vec<ThresholdSpec>,
}

/// Workload settings as read from a workload file. Everything is optional.
#[derive(Debug, Clone, Default)]
pub struct WorkloadOptions {
    pub vus: Option<u64>,
    pub duration: Option<Duration>,
    pub iterations: Option<u64>,

    pub base_url: Option<String>,
    pub path: Option<String>,
    pub timeout: Option<Duration>,

    pub user_prefix: Option<String>,
    /// Decimal string, e.g. `"120.50"`.
    pub amount: Option<String>,

    pub think_time: Option<ThinkTime>,
    pub expect_status: Option<u16>,
    pub checks: Vec<CheckSpec>,

    pub thresholds: Vec<ThresholdSet>,
    pub threshold_min_samples: Option<u64>,
    pub threshold_eval_interval: Option<Duration>,
}

/// Command-line overrides. Each set field wins over the workload file.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    pub vus: Option<u64>,
    pub duration: Option<Duration>,
    pub iterations: Option<u64>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    pub url: Url,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadConfig {
    pub user_prefix: String,
    pub amount: Amount,
}

/// Validated, immutable description of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadConfig {
    pub vus: u64,
    pub duration: Option<Duration>,
    /// Per-VU iteration cap.
    pub iterations: Option<u64>,
    pub target: TargetConfig,
    pub payload: PayloadConfig,
    pub think_time: ThinkTime,
    pub expect_status: u16,
    pub checks: Vec<CheckSpec>,
    pub thresholds: Vec<Threshold>,
    pub threshold_min_samples: u64,
    pub threshold_eval_interval: Duration,
}

/// Resolves overrides (CLI flag, then workload file, then default) and validates the result.
pub fn workload_from_options(
    opts: WorkloadOptions,
    cfg: RunConfig,
) -> Result<WorkloadConfig, ConfigError> {
    let vus = cfg.vus.or(opts.vus).unwrap_or(1);
    if vus == 0 {
        return Err(ConfigError::InvalidVus);
    }

    let duration = cfg.duration.or(opts.duration);
    if duration.is_some_and(|d| d.is_zero()) {
        return Err(ConfigError::InvalidDuration);
    }

    // Without any bound each VU runs a single iteration.
    let iterations = cfg
        .iterations
        .or(opts.iterations)
        .or_else(|| duration.is_none().then_some(1));
    if iterations == Some(0) {
        return Err(ConfigError::InvalidIterations);
    }

    let base_url = cfg
        .base_url
        .or(opts.base_url)
        .filter(|u| !u.trim().is_empty())
        .ok_or(ConfigError::MissingBaseUrl)?;
    let path = opts.path.unwrap_or_else(|| DEFAULT_PATH.to_string());
    let url = target_url(&base_url, &path)?;

    let timeout = opts.timeout.unwrap_or(DEFAULT_TIMEOUT);
    if timeout.is_zero() {
        return Err(ConfigError::InvalidTimeout);
    }

    let user_prefix = opts
        .user_prefix
        .unwrap_or_else(|| DEFAULT_USER_PREFIX.to_string());
    if user_prefix.is_empty() {
        return Err(ConfigError::EmptyUserPrefix);
    }
    let amount: Amount = opts.amount.as_deref().unwrap_or(DEFAULT_AMOUNT).parse()?;

    let think_time = opts.think_time.unwrap_or_default();
    if let ThinkTime::Uniform { min, max } = think_time
        && min > max
    {
        return Err(ConfigError::InvalidThinkTime { min, max });
    }

    let expect_status = opts.expect_status.unwrap_or(DEFAULT_EXPECT_STATUS);
    if !(100..=599).contains(&expect_status) {
        return Err(ConfigError::InvalidStatus(expect_status));
    }

    let checks = if opts.checks.is_empty() {
        vec![CheckSpec::Status {
            name: format!("status is {expect_status}"),
            status: expect_status,
        }]
    } else {
        opts.checks
    };
    for check in &checks {
        validate_check(check)?;
    }

    let mut thresholds = Vec::new();
    for set in &opts.thresholds {
        for spec in &set.thresholds {
            let t = Threshold::parse(&set.metric, spec)?;
            let (kind, unit) = builtin_metric(&t.selector.name)
                .ok_or_else(|| ConfigError::UnknownMetric(t.selector.name.clone()))?;
            t.validate(kind, unit)?;
            thresholds.push(t);
        }
    }

    let threshold_eval_interval = opts
        .threshold_eval_interval
        .unwrap_or(DEFAULT_EVAL_INTERVAL);
    if threshold_eval_interval.is_zero() {
        return Err(ConfigError::InvalidEvalInterval);
    }

    Ok(WorkloadConfig {
        vus,
        duration,
        iterations,
        target: TargetConfig { url, timeout },
        payload: PayloadConfig {
            user_prefix,
            amount,
        },
        think_time,
        expect_status,
        checks,
        thresholds,
        threshold_min_samples: opts.threshold_min_samples.unwrap_or(0),
        threshold_eval_interval,
    })
}

fn target_url(base_url: &str, path: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidBaseUrl {
        url: base_url.to_string(),
        reason: reason.to_string(),
    };

    if !path.starts_with('/') {
        return Err(ConfigError::InvalidPath(path.to_string()));
    }

    let base = Url::parse(base_url.trim()).map_err(|e| invalid(&e.to_string()))?;
    if base.scheme() != "http" {
        return Err(invalid("only http:// targets are supported"));
    }
    if base.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host"));
    }
    if base.query().is_some() || base.fragment().is_some() {
        return Err(invalid("must not carry a query or fragment"));
    }

    // A base path such as `/api` is kept in front of the request path.
    let joined = format!("{}{}", base.as_str().trim_end_matches('/'), path);
    Url::parse(&joined).map_err(|e| invalid(&e.to_string()))
}

fn validate_check(check: &CheckSpec) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidCheck {
        name: check.name().to_string(),
        reason: reason.to_string(),
    };

    if check.name().trim().is_empty() {
        return Err(invalid("name must not be empty"));
    }
    match check {
        CheckSpec::Status { status, .. } if !(100..=599).contains(status) => {
            Err(invalid("status must be between 100 and 599"))
        }
        CheckSpec::BodyContains { needle, .. } if needle.is_empty() => {
            Err(invalid("`bodyContains` must not be empty"))
        }
        CheckSpec::JsonField { path, .. }
            if path.is_empty() || path.split('.').any(str::is_empty) =>
        {
            Err(invalid("`jsonField` must be a dotted path such as `reservation.id`"))
        }
        _ => Ok(()),
    }
}
