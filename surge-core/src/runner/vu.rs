use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::time::Instant;

use crate::check::CheckSet;
use crate::config::ThinkTime;
use crate::metrics::MetricsAggregator;
use crate::request::{IterationContext, RequestBuilder};
use crate::transport::Transport;

use super::signal::StopSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum VuState {
    Idle,
    Running,
    Sleeping,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VuEvent {
    Start,
    Think,
    Wake,
    Stop,
}

impl VuState {
    /// Applies `event`. Events that make no sense in the current state leave it unchanged;
    /// `Stopped` is terminal.
    #[must_use]
    pub fn on(self, event: VuEvent) -> Self {
        match (self, event) {
            (Self::Stopped, _) => Self::Stopped,
            (_, VuEvent::Stop) => Self::Stopped,
            (Self::Idle, VuEvent::Start) => Self::Running,
            (Self::Running, VuEvent::Think) => Self::Sleeping,
            (Self::Sleeping, VuEvent::Wake) => Self::Running,
            (state, _) => state,
        }
    }
}

/// One virtual user: runs iterations back to back until the stop signal or its cap.
pub(super) struct Vu<T, B> {
    pub index: u64,
    pub iterations: Option<u64>,
    pub think_time: ThinkTime,
    pub transport: Arc<T>,
    pub builder: Arc<B>,
    pub checks: Arc<CheckSet>,
    pub metrics: Arc<MetricsAggregator>,
    pub stop: Arc<StopSignal>,
}

impl<T: Transport, B: RequestBuilder> Vu<T, B> {
    /// Returns the number of completed iterations.
    ///
    /// An iteration that has started always finishes: the stop signal is only observed
    /// between iterations and while thinking, so in-flight requests are drained.
    pub async fn run(self) -> u64 {
        let mut rng = StdRng::from_os_rng();
        let mut completed: u64 = 0;

        let mut state = VuState::Idle.on(VuEvent::Start);
        self.metrics.vu_started();
        tracing::trace!(vu = self.index, %state, "vu started");

        loop {
            if self.stop.is_stopped() || self.cap_reached(completed) {
                break;
            }

            self.iterate(completed).await;
            completed = completed.saturating_add(1);

            if self.cap_reached(completed) {
                break;
            }

            let pause = self.think_time.sample(&mut rng);
            if pause.is_zero() {
                // Let timers and other VUs make progress between back-to-back iterations.
                tokio::task::yield_now().await;
                continue;
            }

            state = state.on(VuEvent::Think);
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = self.stop.wait() => {}
            }
            state = state.on(VuEvent::Wake);
        }

        state = state.on(VuEvent::Stop);
        self.metrics.vu_stopped();
        tracing::trace!(vu = self.index, %state, completed, "vu stopped");
        completed
    }

    fn cap_reached(&self, completed: u64) -> bool {
        self.iterations.is_some_and(|cap| completed >= cap)
    }

    async fn iterate(&self, iteration_index: u64) {
        let ctx = IterationContext {
            vu_index: self.index,
            iteration_index,
        };
        let started = Instant::now();

        let req = self.builder.build(ctx);
        let obs = self.transport.execute(req).await;

        if let Some(kind) = obs.error_kind() {
            tracing::debug!(
                vu = self.index,
                iteration = iteration_index,
                error_kind = %kind,
                "request failed"
            );
        }

        self.checks.evaluate_and_record(&obs, &self.metrics);
        self.metrics.record_observation(&obs);
        self.metrics.record_iteration(started.elapsed());
    }
}
