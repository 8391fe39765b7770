use std::time::{Duration, SystemTime};

use surge_metrics::MetricSeriesSummary;

use crate::thresholds::RunVerdict;

/// Why the VUs stopped. The first reason raised wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum StopReason {
    IterationsComplete,
    DurationElapsed,
    Cancelled,
    ThresholdAbort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSummary {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

impl CheckSummary {
    pub fn total(&self) -> u64 {
        self.passes.saturating_add(self.fails)
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub started_at: SystemTime,
    pub duration: Duration,
    pub stop_reason: StopReason,
    /// Completed iterations across all VUs.
    pub iterations: u64,
    /// Completed iterations per VU, indexed by VU.
    pub vu_iterations: Vec<u64>,
    pub checks: Vec<CheckSummary>,
    pub metrics: Vec<MetricSeriesSummary>,
    pub verdict: RunVerdict,
}

impl RunReport {
    /// The run's pass/fail signal: every threshold held.
    pub fn passed(&self) -> bool {
        self.verdict.passed
    }

    pub fn checks_failed(&self) -> u64 {
        self.checks.iter().map(|c| c.fails).sum()
    }

    pub fn metric(&self, name: &str) -> Option<&MetricSeriesSummary> {
        self.metrics
            .iter()
            .find(|m| m.name == name && m.tags.is_empty())
    }
}
