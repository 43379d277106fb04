//! Wall-clock aligned flush scheduling.
//!
//! The scheduler waits once for the next instant whose epoch seconds are a
//! multiple of the interval, then drives a monotonic periodic timer. Each tick
//! starts one flush unless the previous flush is still running, in which case
//! the tick is skipped. Forwarding runs detached from the flush so a slow
//! central server never holds up the next window.

use crate::pipeline::FlushPipeline;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use sysfuse_common::types::CombinedSnapshot;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    AligningToWindow,
    Ticking,
    ShuttingDown,
}

pub struct WindowScheduler {
    interval: Duration,
    pipeline: Arc<FlushPipeline>,
    state: watch::Sender<SchedulerState>,
}

impl WindowScheduler {
    pub fn new(interval: Duration, pipeline: Arc<FlushPipeline>) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            interval,
            pipeline,
            state,
        }
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: SchedulerState) {
        tracing::debug!(?state, "Scheduler state");
        self.state.send_replace(state);
    }

    /// Runs until `shutdown` turns `true` (or its sender is dropped).
    ///
    /// On shutdown no further ticks are armed; an in-flight flush and any
    /// pending forwards are awaited before returning.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        self.set_state(SchedulerState::AligningToWindow);
        let delay = delay_until_aligned(Utc::now(), self.interval);
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            delay_ms = delay.as_millis() as u64,
            "Aligning to window boundary"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_requested(&mut shutdown) => {
                self.set_state(SchedulerState::ShuttingDown);
                tracing::info!("Scheduler stopped before first window");
                return;
            }
        }

        self.set_state(SchedulerState::Ticking);
        let mut tick = tokio::time::interval(self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut flushes: JoinSet<Arc<CombinedSnapshot>> = JoinSet::new();
        let mut forwards: JoinSet<()> = JoinSet::new();
        let mut windows: u64 = 0;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    reap_finished(&mut flushes, |done| self.spawn_forward(done, &mut forwards));
                    if !flushes.is_empty() {
                        tracing::warn!(
                            interval_secs = self.interval.as_secs(),
                            "Previous flush still running, skipping this tick"
                        );
                        continue;
                    }
                    windows += 1;
                    let pipeline = self.pipeline.clone();
                    flushes.spawn(async move { pipeline.collect_and_persist().await });
                }
                Some(done) = flushes.join_next() => {
                    self.spawn_forward(done, &mut forwards);
                }
                Some(done) = forwards.join_next() => {
                    log_join_error(done, "Forward task panicked");
                }
                _ = shutdown_requested(&mut shutdown) => break,
            }
        }

        self.set_state(SchedulerState::ShuttingDown);
        tracing::info!(
            windows,
            in_flight = flushes.len(),
            pending_forwards = forwards.len(),
            "Shutdown requested, finishing in-flight work"
        );

        while let Some(done) = flushes.join_next().await {
            self.spawn_forward(done, &mut forwards);
        }
        while let Some(done) = forwards.join_next().await {
            log_join_error(done, "Forward task panicked");
        }
        tracing::info!("Scheduler stopped");
    }

    fn spawn_forward(
        &self,
        done: Result<Arc<CombinedSnapshot>, JoinError>,
        forwards: &mut JoinSet<()>,
    ) {
        match done {
            Ok(snapshot) => {
                let pipeline = self.pipeline.clone();
                forwards.spawn(async move { pipeline.forward(&snapshot).await });
            }
            Err(e) => tracing::error!(error = %e, "Flush task panicked, window lost"),
        }
    }
}

/// Collects tasks that already finished but were not yet joined.
fn reap_finished<T: 'static>(set: &mut JoinSet<T>, mut on_done: impl FnMut(Result<T, JoinError>)) {
    while let Some(done) = set.try_join_next() {
        on_done(done);
    }
}

fn log_join_error(done: Result<(), JoinError>, message: &str) {
    if let Err(e) = done {
        tracing::error!(error = %e, "{message}");
    }
}

/// Resolves once `true` is published or the sender goes away.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Time from `now` until the next instant whose epoch milliseconds are a
/// multiple of `interval`. Zero when `now` is exactly on a boundary.
pub fn delay_until_aligned(now: DateTime<Utc>, interval: Duration) -> Duration {
    let period_ms = i64::try_from(interval.as_millis()).unwrap_or(i64::MAX).max(1);
    let into_window = now.timestamp_millis().rem_euclid(period_ms);
    if into_window == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis((period_ms - into_window) as u64)
    }
}
