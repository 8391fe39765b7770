use std::sync::Arc;
use std::time::SystemTime;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::check::CheckSet;
use crate::config::WorkloadConfig;
use crate::error::Result;
use crate::metrics::MetricsAggregator;
use crate::report::{RunReport, StopReason};
use crate::request::{RequestBuilder, ReservationRequestBuilder};
use crate::thresholds::{Threshold, ThresholdEngine};
use crate::transport::Transport;

use super::signal::StopSignal;
use super::vu::Vu;

/// A validated workload ready to run against a transport.
///
/// Grab [`Workload::stop_signal`] before calling [`Workload::run`] to cancel from outside.
pub struct Workload<T, B = ReservationRequestBuilder> {
    config: WorkloadConfig,
    transport: Arc<T>,
    builder: Arc<B>,
    checks: Arc<CheckSet>,
    metrics: Arc<MetricsAggregator>,
    thresholds: Arc<ThresholdEngine>,
    stop: Arc<StopSignal>,
}

impl<T: Transport> Workload<T> {
    pub fn new(config: WorkloadConfig, transport: T) -> Result<Self> {
        let builder = ReservationRequestBuilder::new(&config);
        Self::with_builder(config, transport, builder)
    }
}

impl<T: Transport, B: RequestBuilder> Workload<T, B> {
    pub fn with_builder(config: WorkloadConfig, transport: T, builder: B) -> Result<Self> {
        let metrics = MetricsAggregator::new()?;
        let checks = CheckSet::from_specs(&config.checks)?;
        let thresholds = ThresholdEngine::new(
            config.thresholds.clone(),
            config.threshold_min_samples,
            &metrics,
        )?;

        Ok(Self {
            config,
            transport: Arc::new(transport),
            builder: Arc::new(builder),
            checks: Arc::new(checks),
            metrics: Arc::new(metrics),
            thresholds: Arc::new(thresholds),
            stop: Arc::new(StopSignal::new()),
        })
    }

    /// Replaces the configured checks.
    #[must_use]
    pub fn with_checks(mut self, checks: CheckSet) -> Self {
        self.checks = Arc::new(checks);
        self
    }

    /// Replaces the configured thresholds. Metrics they reference must already be registered
    /// (see [`MetricsAggregator::register`]).
    pub fn with_thresholds(mut self, thresholds: Vec<Threshold>) -> Result<Self> {
        self.thresholds = Arc::new(ThresholdEngine::new(
            thresholds,
            self.config.threshold_min_samples,
            &self.metrics,
        )?);
        Ok(self)
    }

    pub fn config(&self) -> &WorkloadConfig {
        &self.config
    }

    pub fn stop_signal(&self) -> Arc<StopSignal> {
        self.stop.clone()
    }

    pub fn metrics(&self) -> &Arc<MetricsAggregator> {
        &self.metrics
    }

    /// Runs every VU to completion and evaluates the thresholds once more at the end.
    ///
    /// Failed requests and failed checks never make this return an error; they only show up
    /// in the report and the verdict.
    pub async fn run(self) -> Result<RunReport> {
        let started_at = SystemTime::now();
        let started = Instant::now();
        let vus = self.config.vus;

        self.metrics.set_vus_max(vus);
        tracing::info!(
            vus,
            duration = ?self.config.duration,
            iterations = ?self.config.iterations,
            target = %self.config.target.url,
            thresholds = self.thresholds.len(),
            "run starting"
        );

        let handles: Vec<JoinHandle<u64>> = (0..vus)
            .map(|index| {
                let vu = Vu {
                    index,
                    iterations: self.config.iterations,
                    think_time: self.config.think_time,
                    transport: self.transport.clone(),
                    builder: self.builder.clone(),
                    checks: self.checks.clone(),
                    metrics: self.metrics.clone(),
                    stop: self.stop.clone(),
                };
                tokio::spawn(vu.run())
            })
            .collect();

        let timer = self.config.duration.map(|duration| {
            let stop = self.stop.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(duration) => {
                        if stop.stop(StopReason::DurationElapsed) {
                            tracing::info!(?duration, "duration elapsed");
                        }
                    }
                    _ = stop.wait() => {}
                }
            })
        });

        let watcher = self
            .thresholds
            .has_abort_on_fail()
            .then(|| self.spawn_abort_watcher(started));

        let mut vu_iterations = Vec::with_capacity(handles.len());
        let mut join_err = None;
        for handle in handles {
            match handle.await {
                Ok(n) => vu_iterations.push(n),
                Err(err) => {
                    tracing::error!(error = %err, "vu task failed");
                    self.stop.stop(StopReason::Cancelled);
                    vu_iterations.push(0);
                    join_err.get_or_insert(err);
                }
            }
        }

        // No-op when something else stopped the run first.
        self.stop.stop(StopReason::IterationsComplete);
        for task in timer.into_iter().chain(watcher) {
            task.await?;
        }
        if let Some(err) = join_err {
            return Err(err.into());
        }

        let duration = started.elapsed();
        let stop_reason = self.stop.reason().unwrap_or(StopReason::IterationsComplete);
        let verdict = self.thresholds.evaluate(&self.metrics, duration);
        let iterations = vu_iterations.iter().sum();

        for v in verdict.failed() {
            tracing::info!(
                metric = %v.metric,
                expression = %v.expression,
                observed = ?v.observed,
                samples = v.samples,
                "threshold failed"
            );
        }
        tracing::info!(
            %stop_reason,
            iterations,
            elapsed = ?duration,
            passed = verdict.passed,
            "run finished"
        );

        Ok(RunReport {
            started_at,
            duration,
            stop_reason,
            iterations,
            vu_iterations,
            checks: self.metrics.check_summaries(self.checks.names()),
            metrics: self.metrics.summarize(),
            verdict,
        })
    }

    fn spawn_abort_watcher(&self, started: Instant) -> JoinHandle<()> {
        let stop = self.stop.clone();
        let metrics = self.metrics.clone();
        let thresholds = self.thresholds.clone();
        let period = self.config.threshold_eval_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(started + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop.wait() => return,
                    _ = interval.tick() => {}
                }

                if let Some(v) = thresholds.first_abort(&metrics, started.elapsed()) {
                    if stop.stop(StopReason::ThresholdAbort) {
                        tracing::info!(
                            metric = %v.metric,
                            expression = %v.expression,
                            observed = ?v.observed,
                            "threshold crossed, aborting run"
                        );
                    }
                    return;
                }
            }
        })
    }
}
