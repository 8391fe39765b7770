use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::Deserialize;
use surge_core::{CheckSpec, ThinkTime, ThresholdSet, ThresholdSpec, WorkloadOptions};

/// On-disk workload file. Every field is optional; CLI flags override what is set here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct WorkloadYaml {
    pub vus: Option<u64>,
    pub duration: Option<YamlDuration>,
    pub iterations: Option<u64>,

    #[serde(default)]
    pub target: TargetYaml,

    #[serde(default)]
    pub payload: PayloadYaml,

    pub think_time: Option<ThinkTimeYaml>,
    pub expect_status: Option<u16>,

    #[serde(default)]
    pub checks: Vec<CheckYaml>,

    /// Metric key (optionally with a tag selector) to one or more expressions. Keys keep
    /// their file order.
    #[serde(default)]
    pub thresholds: serde_yaml::Mapping,

    pub threshold_min_samples: Option<u64>,
    pub threshold_eval_interval: Option<YamlDuration>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct TargetYaml {
    pub base_url: Option<String>,
    pub path: Option<String>,
    pub timeout: Option<YamlDuration>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct PayloadYaml {
    pub user_prefix: Option<String>,
    pub amount: Option<YamlAmount>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ThinkTimeYaml {
    Fixed(YamlDuration),
    Uniform { min: YamlDuration, max: YamlDuration },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct CheckYaml {
    pub name: Option<String>,
    pub status: Option<u16>,
    pub body_contains: Option<String>,
    pub json_field: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ThresholdYaml {
    One(ThresholdEntryYaml),
    Many(Vec<ThresholdEntryYaml>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ThresholdEntryYaml {
    Expr(String),
    Object(ThresholdObjectYaml),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ThresholdObjectYaml {
    threshold: String,
    #[serde(default)]
    abort_on_fail: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    fn into_inner(self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a duration such as 300ms or 30s, or a number of seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(|v| YamlDuration(Duration::from_secs(v)))
                    .map_err(|_| E::custom("duration must not be negative"))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Duration::try_from_secs_f64(v)
                    .map(YamlDuration)
                    .map_err(|_| E::custom("duration must be a non-negative, finite number"))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let d = humantime::parse_duration(v.trim()).map_err(E::custom)?;
                Ok(YamlDuration(d))
            }
        }

        deserializer.deserialize_any(V)
    }
}

/// Amount as written in the file. Numbers and strings are both kept as decimal text so the
/// core parses them with its own fixed-point rules.
#[derive(Debug, Clone, Default)]
pub(crate) struct YamlAmount(String);

impl<'de> Deserialize<'de> for YamlAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = YamlAmount;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("amount as a number (e.g. 120.50) or a decimal string")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlAmount(v.to_string()))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlAmount(v.to_string()))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlAmount(v.to_string()))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlAmount(v.trim().to_string()))
            }
        }

        deserializer.deserialize_any(V)
    }
}

pub fn looks_like_yaml_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|s| s.to_str()).map(|s| s.to_ascii_lowercase()),
        Some(ext) if ext == "yml" || ext == "yaml"
    )
}

pub async fn load_workload_options(path: &Path) -> anyhow::Result<WorkloadOptions> {
    if !looks_like_yaml_path(path) {
        anyhow::bail!(
            "unsupported workload file `{}` (expected .yaml or .yml)",
            path.display()
        );
    }

    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read workload file: {}", path.display()))?;

    parse_workload_options(&bytes)
        .with_context(|| format!("failed to parse workload file: {}", path.display()))
}

pub(crate) fn parse_workload_options(bytes: &[u8]) -> anyhow::Result<WorkloadOptions> {
    let doc: WorkloadYaml = if bytes.iter().all(u8::is_ascii_whitespace) {
        WorkloadYaml::default()
    } else {
        serde_yaml::from_slice(bytes)?
    };
    doc.into_options()
}

impl WorkloadYaml {
    fn into_options(self) -> anyhow::Result<WorkloadOptions> {
        let checks = self
            .checks
            .into_iter()
            .enumerate()
            .map(|(idx, c)| c.into_spec(idx))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(WorkloadOptions {
            vus: self.vus,
            duration: self.duration.map(YamlDuration::into_inner),
            iterations: self.iterations,

            base_url: self.target.base_url,
            path: self.target.path,
            timeout: self.target.timeout.map(YamlDuration::into_inner),

            user_prefix: self.payload.user_prefix,
            amount: self.payload.amount.map(|a| a.0),

            think_time: self.think_time.map(|t| match t {
                ThinkTimeYaml::Fixed(d) => ThinkTime::Fixed(d.into_inner()),
                ThinkTimeYaml::Uniform { min, max } => ThinkTime::Uniform {
                    min: min.into_inner(),
                    max: max.into_inner(),
                },
            }),
            expect_status: self.expect_status,
            checks,

            thresholds: parse_thresholds_map(self.thresholds)?,
            threshold_min_samples: self.threshold_min_samples,
            threshold_eval_interval: self.threshold_eval_interval.map(YamlDuration::into_inner),
        })
    }
}

impl CheckYaml {
    fn into_spec(self, idx: usize) -> anyhow::Result<CheckSpec> {
        let label = self
            .name
            .clone()
            .unwrap_or_else(|| format!("checks[{idx}]"));

        match (self.status, self.body_contains, self.json_field) {
            (Some(status), None, None) => Ok(CheckSpec::Status {
                name: self.name.unwrap_or_else(|| format!("status is {status}")),
                status,
            }),
            (None, Some(needle), None) => Ok(CheckSpec::BodyContains {
                name: self
                    .name
                    .unwrap_or_else(|| format!("body contains {needle}")),
                needle,
            }),
            (None, None, Some(path)) => Ok(CheckSpec::JsonField {
                name: self.name.unwrap_or_else(|| format!("has {path}")),
                path,
            }),
            (None, None, None) => anyhow::bail!(
                "check `{label}` needs one of `status`, `bodyContains` or `jsonField`"
            ),
            _ => anyhow::bail!(
                "check `{label}` must set only one of `status`, `bodyContains` or `jsonField`"
            ),
        }
    }
}

fn parse_thresholds_map(raw: serde_yaml::Mapping) -> anyhow::Result<Vec<ThresholdSet>> {
    let mut out = Vec::with_capacity(raw.len());

    for (key, value) in raw {
        let serde_yaml::Value::String(metric) = key else {
            anyhow::bail!("threshold keys must be metric names, got {key:?}");
        };

        let parsed: ThresholdYaml = serde_yaml::from_value(value).map_err(|e| {
            anyhow::anyhow!(
                "invalid thresholds for `{metric}` \
                 (expected an expression, a list, or {{threshold, abortOnFail}}): {e}"
            )
        })?;

        let entries = match parsed {
            ThresholdYaml::One(e) => vec![e],
            ThresholdYaml::Many(v) => v,
        };
        if entries.is_empty() {
            anyhow::bail!("invalid thresholds for `{metric}`: empty list");
        }

        let thresholds = entries
            .into_iter()
            .map(|e| match e {
                ThresholdEntryYaml::Expr(expression) => ThresholdSpec {
                    expression,
                    abort_on_fail: false,
                },
                ThresholdEntryYaml::Object(o) => ThresholdSpec {
                    expression: o.threshold,
                    abort_on_fail: o.abort_on_fail,
                },
            })
            .collect();

        out.push(ThresholdSet { metric, thresholds });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> WorkloadOptions {
        parse_workload_options(yaml.as_bytes()).unwrap_or_else(|e| panic!("{e:#}"))
    }

    #[test]
    fn looks_like_yaml_path_checks_extension() {
        assert!(looks_like_yaml_path(Path::new("a.yml")));
        assert!(looks_like_yaml_path(Path::new("a.YAML")));
        assert!(!looks_like_yaml_path(Path::new("a.lua")));
        assert!(!looks_like_yaml_path(Path::new("workload")));
    }

    #[test]
    fn parses_the_full_document() {
        let opts = parse(
            r#"
vus: 10
duration: 30s
target:
  baseUrl: http://reservas:8080
  path: /reservas
  timeout: 2.5
payload:
  userPrefix: load
  amount: 120.50
thinkTime: 300ms
expectStatus: 202
checks:
  - status: 202
  - name: has id
    jsonField: reservationId
  - bodyContains: PENDING_PAYMENT
thresholds:
  http_req_failed: rate<0.01
  http_req_duration:
    - p(95)<500
    - threshold: p(99)<1s
      abortOnFail: true
  "checks{check:has id}": ["rate>0.99"]
thresholdMinSamples: 5
thresholdEvalInterval: 2s
"#,
        );

        assert_eq!(opts.vus, Some(10));
        assert_eq!(opts.duration, Some(Duration::from_secs(30)));
        assert_eq!(opts.iterations, None);
        assert_eq!(opts.base_url.as_deref(), Some("http://reservas:8080"));
        assert_eq!(opts.timeout, Some(Duration::from_millis(2500)));
        assert_eq!(opts.user_prefix.as_deref(), Some("load"));
        assert_eq!(opts.amount.as_deref(), Some("120.5"));
        assert_eq!(
            opts.think_time,
            Some(ThinkTime::Fixed(Duration::from_millis(300)))
        );
        assert_eq!(
            opts.checks,
            vec![
                CheckSpec::Status {
                    name: "status is 202".to_string(),
                    status: 202
                },
                CheckSpec::JsonField {
                    name: "has id".to_string(),
                    path: "reservationId".to_string()
                },
                CheckSpec::BodyContains {
                    name: "body contains PENDING_PAYMENT".to_string(),
                    needle: "PENDING_PAYMENT".to_string()
                },
            ]
        );

        let metrics: Vec<&str> = opts.thresholds.iter().map(|t| t.metric.as_str()).collect();
        assert_eq!(
            metrics,
            vec!["http_req_failed", "http_req_duration", "checks{check:has id}"]
        );
        let duration = &opts.thresholds[1].thresholds;
        assert_eq!(duration.len(), 2);
        assert!(!duration[0].abort_on_fail);
        assert_eq!(duration[1].expression, "p(99)<1s");
        assert!(duration[1].abort_on_fail);

        assert_eq!(opts.threshold_min_samples, Some(5));
        assert_eq!(opts.threshold_eval_interval, Some(Duration::from_secs(2)));
    }

    #[test]
    fn think_time_accepts_a_range_and_amount_accepts_a_string() {
        let opts = parse(
            r#"
thinkTime:
  min: 100ms
  max: 1s
payload:
  amount: "99.99"
"#,
        );
        assert_eq!(
            opts.think_time,
            Some(ThinkTime::Uniform {
                min: Duration::from_millis(100),
                max: Duration::from_secs(1)
            })
        );
        assert_eq!(opts.amount.as_deref(), Some("99.99"));
    }

    #[test]
    fn empty_document_is_all_defaults() {
        let opts = parse("");
        assert!(opts.vus.is_none() && opts.base_url.is_none() && opts.thresholds.is_empty());
    }

    #[test]
    fn rejects_unknown_fields_and_ambiguous_checks() {
        for yaml in [
            "vu: 3",
            "target:\n  baseURL: http://x",
            "checks:\n  - name: two\n    status: 202\n    bodyContains: x",
            "checks:\n  - name: none",
            "thresholds:\n  http_req_failed: []",
            "thresholds:\n  http_req_failed:\n    threshold: rate<0.01\n    abort: true",
            "duration: -5",
        ] {
            assert!(parse_workload_options(yaml.as_bytes()).is_err(), "accepted {yaml:?}");
        }
    }
}
