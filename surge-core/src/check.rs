use std::any::Any;
use std::cell::Cell;
use std::collections::HashSet;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};

use serde_json::Value;

use crate::config::CheckSpec;
use crate::error::ConfigError;
use crate::metrics::MetricsAggregator;
use crate::observation::ResponseObservation;

type Predicate = dyn Fn(&ResponseObservation) -> Result<bool, String> + Send + Sync;

/// Named assertion over a response.
#[derive(Clone)]
pub struct Check {
    name: Arc<str>,
    predicate: Arc<Predicate>,
    /// Set after the first panic has been logged at `warn`; later ones go to `debug`.
    panic_logged: Arc<AtomicBool>,
}

thread_local! {
    static IN_CHECK: Cell<bool> = const { Cell::new(false) };
}

static QUIET_HOOK: Once = Once::new();

/// Chains a panic hook that stays silent for panics raised inside a check predicate, so a
/// broken predicate does not print a backtrace per iteration per VU. Other panics still reach
/// the previous hook.
fn install_quiet_hook() {
    QUIET_HOOK.call_once(|| {
        let prev = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if !IN_CHECK.with(Cell::get) {
                prev(info);
            }
        }));
    });
}

struct InCheckGuard;

impl InCheckGuard {
    fn enter() -> Self {
        IN_CHECK.with(|c| c.set(true));
        Self
    }
}

impl Drop for InCheckGuard {
    fn drop(&mut self) {
        IN_CHECK.with(|c| c.set(false));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Check").field("name", &self.name).finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: Arc<str>,
    pub passed: bool,
}

impl Check {
    pub fn new<F>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(&ResponseObservation) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(move |obs| Ok(f(obs))),
            panic_logged: Arc::default(),
        }
    }

    /// A predicate that may fail; an `Err` counts as a failed check.
    pub fn fallible<F, E>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(&ResponseObservation) -> Result<bool, E> + Send + Sync + 'static,
        E: fmt::Display,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(move |obs| f(obs).map_err(|e| e.to_string())),
            panic_logged: Arc::default(),
        }
    }

    pub fn status_is(name: impl Into<Arc<str>>, status: u16) -> Self {
        Self::new(name, move |obs| obs.status == status)
    }

    pub fn body_contains(name: impl Into<Arc<str>>, needle: impl Into<String>) -> Self {
        let needle = needle.into();
        Self::new(name, move |obs| {
            obs.body_utf8().is_some_and(|b| b.contains(needle.as_str()))
        })
    }

    /// Passes when the body is JSON and the dotted `path` (e.g. `reservation.id`, `items.0`)
    /// resolves to a non-null value.
    pub fn json_field(name: impl Into<Arc<str>>, path: impl Into<String>) -> Self {
        let path = path.into();
        Self::fallible(name, move |obs| {
            let body = obs
                .body()
                .ok_or_else(|| "no response body".to_string())?;
            let value: Value = serde_json::from_slice(body).map_err(|e| e.to_string())?;
            Ok::<bool, String>(lookup_path(&value, &path).is_some_and(|v| !v.is_null()))
        })
    }

    pub fn from_spec(spec: &CheckSpec) -> Self {
        match spec {
            CheckSpec::Status { name, status } => Self::status_is(name.as_str(), *status),
            CheckSpec::BodyContains { name, needle } => {
                Self::body_contains(name.as_str(), needle.clone())
            }
            CheckSpec::JsonField { name, path } => Self::json_field(name.as_str(), path.clone()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the predicate. Panics and errors inside it are failed checks.
    pub fn evaluate(&self, obs: &ResponseObservation) -> CheckResult {
        install_quiet_hook();
        let outcome = {
            let _guard = InCheckGuard::enter();
            catch_unwind(AssertUnwindSafe(|| (self.predicate)(obs)))
        };

        let passed = match outcome {
            Ok(Ok(passed)) => passed,
            Ok(Err(err)) => {
                tracing::debug!(check = %self.name, error = %err, "check errored");
                false
            }
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                if self.panic_logged.swap(true, Ordering::Relaxed) {
                    tracing::debug!(check = %self.name, panic = msg, "check panicked");
                } else {
                    tracing::warn!(
                        check = %self.name,
                        panic = msg,
                        "check panicked, counting it as failed (repeats logged at debug)"
                    );
                }
                false
            }
        };

        CheckResult {
            name: self.name.clone(),
            passed,
        }
    }
}

fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |cur, seg| match cur {
        Value::Object(map) => map.get(seg),
        Value::Array(items) => seg.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Ordered, uniquely named checks.
#[derive(Debug, Clone, Default)]
pub struct CheckSet {
    checks: Vec<Check>,
}

impl CheckSet {
    pub fn new(checks: Vec<Check>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for c in &checks {
            if c.name.is_empty() {
                return Err(ConfigError::InvalidCheck {
                    name: String::new(),
                    reason: "name must not be empty".to_string(),
                });
            }
            if !seen.insert(c.name.clone()) {
                return Err(ConfigError::DuplicateCheck(c.name.to_string()));
            }
        }
        Ok(Self { checks })
    }

    pub fn from_specs(specs: &[CheckSpec]) -> Result<Self, ConfigError> {
        Self::new(specs.iter().map(Check::from_spec).collect())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.checks.iter().map(Check::name)
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Every check runs, in declaration order, whatever the earlier ones returned.
    pub fn evaluate(&self, obs: &ResponseObservation) -> Vec<CheckResult> {
        self.checks.iter().map(|c| c.evaluate(obs)).collect()
    }

    pub fn evaluate_and_record(
        &self,
        obs: &ResponseObservation,
        metrics: &MetricsAggregator,
    ) -> Vec<CheckResult> {
        let results = self.evaluate(obs);
        for r in &results {
            metrics.record_check(&r.name, r.passed);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Duration;
    use surge_http::HttpTransportErrorKind;

    fn accepted(body: &str) -> ResponseObservation {
        ResponseObservation::response(202, Duration::from_millis(3), Bytes::from(body.to_string()))
    }

    #[test]
    fn evaluates_all_checks_in_order_without_short_circuit() {
        let set = CheckSet::new(vec![
            Check::status_is("status is 500", 500),
            Check::status_is("status is 202", 202),
            Check::body_contains("pending", "PENDING_PAYMENT"),
        ])
        .unwrap_or_else(|e| panic!("{e}"));

        let results = set.evaluate(&accepted(r#"{"status":"PENDING_PAYMENT"}"#));
        let got: Vec<(&str, bool)> = results.iter().map(|r| (&*r.name, r.passed)).collect();
        assert_eq!(
            got,
            vec![("status is 500", false), ("status is 202", true), ("pending", true)]
        );
    }

    #[test]
    fn panicking_and_erroring_predicates_fail_only_themselves() {
        let set = CheckSet::new(vec![
            Check::new("boom", |_| panic!("predicate bug")),
            Check::fallible("err", |_| Err::<bool, _>("nope")),
            Check::status_is("status is 202", 202),
        ])
        .unwrap_or_else(|e| panic!("{e}"));

        let results = set.evaluate(&accepted("{}"));
        assert_eq!(
            results.iter().map(|r| r.passed).collect::<Vec<_>>(),
            vec![false, false, true]
        );
    }

    #[test]
    fn repeated_panics_are_reported_once_and_leave_the_thread_clean() {
        let check = Check::new("boom", |_| panic!("predicate bug"));
        let clone = check.clone();
        let obs = accepted("{}");

        assert!(!check.evaluate(&obs).passed);
        assert!(check.panic_logged.load(Ordering::Relaxed));
        // Clones share the flag, so every VU reports a broken predicate only once.
        assert!(clone.panic_logged.load(Ordering::Relaxed));
        assert!(!clone.evaluate(&obs).passed);
        assert!(!IN_CHECK.with(Cell::get));

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(payload.as_ref()), "owned message");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }

    #[test]
    fn json_field_follows_dotted_paths() {
        let obs = accepted(r#"{"reservationId":"abc","items":[{"id":1}],"gone":null}"#);
        assert!(Check::json_field("id", "reservationId").evaluate(&obs).passed);
        assert!(Check::json_field("item", "items.0.id").evaluate(&obs).passed);
        assert!(!Check::json_field("null", "gone").evaluate(&obs).passed);
        assert!(!Check::json_field("missing", "nope.deeper").evaluate(&obs).passed);

        let err = ResponseObservation::transport_error(
            HttpTransportErrorKind::Timeout,
            "timed out",
            Duration::from_secs(1),
        );
        assert!(!Check::json_field("id", "reservationId").evaluate(&err).passed);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = CheckSet::new(vec![
            Check::status_is("status is 202", 202),
            Check::status_is("status is 202", 201),
        ]);
        assert!(matches!(err, Err(ConfigError::DuplicateCheck(_))));
    }
}
