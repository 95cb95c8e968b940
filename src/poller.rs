//! The balance poller.
//!
//! `BalanceRefresher::refresh_once` is a single fetch-then-render pass.
//! `BalancePoller` drives it from a fixed-period timer whose first tick is
//! one full period after start. Every tick spawns an independent refresh:
//! overlapping refreshes are not serialised, and whichever response lands
//! last owns the display.
//!
//! Failures never touch the display. What happens to the error is decided
//! by the configured [`FailurePolicy`].

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{AppConfig, FailurePolicy};
use crate::display::{DisplayError, DisplayTarget, Document};
use crate::source::{BalanceSource, RefreshError};
use crate::types::{PollerStats, RefreshOutcome};

/// Capacity of the failure broadcast channel. Slow subscribers lag.
const FAILURE_CHANNEL_CAPACITY: usize = 16;

// ---------------------------------------------------------------------------
// Single refresh
// ---------------------------------------------------------------------------

/// One source, one target.
#[derive(Clone)]
pub struct BalanceRefresher {
    source: Arc<dyn BalanceSource>,
    target: Arc<dyn DisplayTarget>,
}

impl BalanceRefresher {
    pub fn new(source: Arc<dyn BalanceSource>, target: Arc<dyn DisplayTarget>) -> Self {
        Self { source, target }
    }

    /// Fetch the balance once and, on success, overwrite the target's text.
    pub async fn refresh_once(&self) -> Result<RefreshOutcome, RefreshError> {
        let balance = self.source.fetch_balance().await?;
        let text = balance.display_text();
        self.target.set_text(&text);

        Ok(RefreshOutcome {
            balance,
            text,
            fetched_at: Utc::now(),
        })
    }

    pub fn target(&self) -> &Arc<dyn DisplayTarget> {
        &self.target
    }
}

// ---------------------------------------------------------------------------
// Scheduled poller
// ---------------------------------------------------------------------------

/// A refresh failure as delivered to subscribers under `FailurePolicy::Surface`.
#[derive(Debug, Clone)]
pub struct RefreshFailure {
    pub error: RefreshError,
    pub at: DateTime<Utc>,
}

pub struct BalancePoller {
    refresher: BalanceRefresher,
    interval: Duration,
    policy: FailurePolicy,
}

impl BalancePoller {
    pub fn new(
        source: Arc<dyn BalanceSource>,
        target: Arc<dyn DisplayTarget>,
        interval: Duration,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            refresher: BalanceRefresher::new(source, target),
            interval,
            policy,
        }
    }

    /// Build a poller that renders into the document element named by
    /// `display.target_id`. The element must already exist.
    pub fn for_document(
        source: Arc<dyn BalanceSource>,
        document: &Document,
        cfg: &AppConfig,
    ) -> Result<Self, DisplayError> {
        let target = document.require(&cfg.display.target_id)?;
        Ok(Self::new(
            source,
            Arc::new(target),
            cfg.poller.interval(),
            cfg.poller.failure_policy,
        ))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Start the schedule. The first refresh fires one interval from now.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> PollerHandle {
        let (stop_tx, stop_rx) = oneshot::channel();
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);
        let stats = Arc::new(Mutex::new(PollerStats::default()));
        let first_tick = Instant::now() + self.interval;

        info!(
            interval_secs = self.interval.as_secs_f64(),
            policy = ?self.policy,
            element = self.refresher.target().id(),
            source = self.refresher.source.name(),
            "Balance poller started"
        );

        let task = tokio::spawn(run_schedule(
            self,
            first_tick,
            Arc::clone(&stats),
            failures.clone(),
            stop_rx,
        ));

        PollerHandle {
            stop_tx: Some(stop_tx),
            task: Some(task),
            stats,
            failures,
        }
    }
}

async fn run_schedule(
    poller: BalancePoller,
    first_tick: Instant,
    stats: Arc<Mutex<PollerStats>>,
    failures: broadcast::Sender<RefreshFailure>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval_at(first_tick, poller.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                lock(&stats).attempts += 1;
                in_flight.spawn(refresh_and_record(
                    poller.refresher.clone(),
                    poller.policy,
                    Arc::clone(&stats),
                    failures.clone(),
                ));
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = joined {
                    if e.is_panic() {
                        error!(error = %e, "Refresh task panicked");
                    }
                }
            }
            // Fires on an explicit stop and when the handle is dropped.
            _ = &mut stop_rx => break,
        }
    }

    let aborted = in_flight.len();
    in_flight.shutdown().await;
    let summary = lock(&stats).to_string();
    info!(aborted, stats = %summary, "Balance poller stopped");
}

async fn refresh_and_record(
    refresher: BalanceRefresher,
    policy: FailurePolicy,
    stats: Arc<Mutex<PollerStats>>,
    failures: broadcast::Sender<RefreshFailure>,
) {
    let span = info_span!(
        "refresh",
        request_id = %Uuid::new_v4(),
        source = refresher.source.name()
    );

    async move {
        match refresher.refresh_once().await {
            Ok(outcome) => {
                debug!(coins = %outcome.text, "Balance displayed");
                lock(&stats).record_success(&outcome);
            }
            Err(e) => {
                lock(&stats).record_failure(&e.to_string());
                apply_policy(policy, e, &failures);
            }
        }
    }
    .instrument(span)
    .await
}

fn apply_policy(
    policy: FailurePolicy,
    error: RefreshError,
    failures: &broadcast::Sender<RefreshFailure>,
) {
    match policy {
        FailurePolicy::Ignore => {}
        FailurePolicy::Log => {
            warn!(kind = error.kind(), error = %error, "Balance refresh failed, keeping stale value");
        }
        FailurePolicy::Surface => {
            warn!(kind = error.kind(), error = %error, "Balance refresh failed, keeping stale value");
            // No subscribers is fine.
            let _ = failures.send(RefreshFailure {
                error,
                at: Utc::now(),
            });
        }
    }
}

fn lock(stats: &Mutex<PollerStats>) -> std::sync::MutexGuard<'_, PollerStats> {
    stats.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Lifecycle handle for a running poller.
///
/// Dropping the handle stops the schedule as well; call [`stop`](Self::stop)
/// to wait until in-flight refreshes have been aborted.
pub struct PollerHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    stats: Arc<Mutex<PollerStats>>,
    failures: broadcast::Sender<RefreshFailure>,
}

impl PollerHandle {
    /// Snapshot of the running counters.
    pub fn stats(&self) -> PollerStats {
        lock(&self.stats).clone()
    }

    /// Subscribe to refresh failures. Only receives anything under
    /// `FailurePolicy::Surface`.
    pub fn failures(&self) -> broadcast::Receiver<RefreshFailure> {
        self.failures.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the schedule and abort in-flight refreshes. No display write
    /// happens after this returns.
    pub async fn stop(mut self) -> PollerStats {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "Poller task ended abnormally");
            }
        }
        self.stats()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
