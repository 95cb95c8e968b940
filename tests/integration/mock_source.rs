//! Scripted balance source for schedule and ordering tests.
//!
//! Provides a deterministic `BalanceSource` whose responses and response
//! delays are queued up front. Every call records the (virtual) time it
//! was made, so tests running on a paused clock can assert exactly when
//! the poller fired.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use coinpoll::config::FailurePolicy;
use coinpoll::display::{DisplayTarget, TextElement};
use coinpoll::poller::{BalancePoller, BalanceRefresher};
use coinpoll::source::{BalanceSource, RefreshError};
use coinpoll::types::Balance;

struct Step {
    delay: Duration,
    result: Result<Balance, RefreshError>,
}

/// A balance source that replays queued steps, then a fixed fallback.
pub struct ScriptedSource {
    origin: Instant,
    steps: Mutex<VecDeque<Step>>,
    fallback: Result<Balance, RefreshError>,
    calls: Mutex<Vec<Duration>>,
}

impl ScriptedSource {
    pub fn new(fallback: Result<Balance, RefreshError>) -> Self {
        Self {
            origin: Instant::now(),
            steps: Mutex::new(VecDeque::new()),
            fallback,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a response that arrives `delay` after the call.
    pub fn then(self, delay: Duration, result: Result<Balance, RefreshError>) -> Self {
        self.steps.lock().unwrap().push_back(Step { delay, result });
        self
    }

    /// Offsets from construction at which `fetch_balance` was called.
    pub fn call_offsets(&self) -> Vec<Duration> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BalanceSource for ScriptedSource {
    async fn fetch_balance(&self) -> Result<Balance, RefreshError> {
        self.calls.lock().unwrap().push(self.origin.elapsed());
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step { delay, result }) => {
                tokio::time::sleep(delay).await;
                result
            }
            None => self.fallback.clone(),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn coins(n: i64) -> Result<Balance, RefreshError> {
    Ok(Balance::from(n))
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

fn poller_for(source: Arc<ScriptedSource>, el: &TextElement) -> BalancePoller {
    BalancePoller::new(source, Arc::new(el.clone()), secs(30), FailurePolicy::Log)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_fires_at_30_60_90_and_not_before() {
    let source = Arc::new(ScriptedSource::new(coins(42)));
    let el = TextElement::new("coin-count", "");
    let handle = poller_for(Arc::clone(&source), &el).start();

    tokio::time::sleep(Duration::from_millis(29_999)).await;
    assert!(source.call_offsets().is_empty());

    tokio::time::sleep(Duration::from_millis(65_001)).await;
    assert_eq!(source.call_offsets(), vec![secs(30), secs(60), secs(90)]);
    assert_eq!(el.text(), "42");

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_refreshes_last_arrival_wins() {
    let source = Arc::new(
        ScriptedSource::new(coins(0))
            .then(secs(10), coins(1))
            .then(secs(1), coins(2)),
    );
    let el = TextElement::new("coin-count", "");
    let refresher = BalanceRefresher::new(source, Arc::new(el.clone()));

    let (first, second) = tokio::join!(refresher.refresh_once(), refresher.refresh_once());
    assert_eq!(first.unwrap().text, "1");
    assert_eq!(second.unwrap().text, "2");

    // Issued first, resolved last.
    assert_eq!(el.text(), "1");
}

#[tokio::test(start_paused = true)]
async fn test_in_order_arrival_keeps_latest_request() {
    let source = Arc::new(
        ScriptedSource::new(coins(0))
            .then(secs(1), coins(1))
            .then(secs(10), coins(2)),
    );
    let el = TextElement::new("coin-count", "");
    let refresher = BalanceRefresher::new(source, Arc::new(el.clone()));

    let _ = tokio::join!(refresher.refresh_once(), refresher.refresh_once());
    assert_eq!(el.text(), "2");
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_slow_response_overwrites_newer_one() {
    // Tick at 30s resolves at 75s; tick at 60s resolves at 65s.
    let source = Arc::new(
        ScriptedSource::new(coins(300))
            .then(secs(45), coins(100))
            .then(secs(5), coins(200)),
    );
    let el = TextElement::new("coin-count", "");
    let handle = poller_for(Arc::clone(&source), &el).start();

    tokio::time::sleep(secs(66)).await;
    assert_eq!(el.text(), "200");
    assert_eq!(handle.stats().pending(), 1);

    tokio::time::sleep(secs(14)).await;
    assert_eq!(el.text(), "100");

    let stats = handle.stop().await;
    assert_eq!(stats.attempts, 2);
    assert_eq!(stats.successes, 2);
}

#[tokio::test(start_paused = true)]
async fn test_failure_leaves_display_untouched() {
    let source = Arc::new(
        ScriptedSource::new(Err(RefreshError::Network("connection refused".into())))
            .then(Duration::ZERO, coins(42))
            .then(
                Duration::ZERO,
                Err(RefreshError::Status {
                    status: 500,
                    body: "Internal Server Error".into(),
                }),
            ),
    );
    let el = TextElement::new("coin-count", "");
    let handle = poller_for(Arc::clone(&source), &el).start();

    tokio::time::sleep(secs(31)).await;
    assert_eq!(el.text(), "42");

    tokio::time::sleep(secs(60)).await;
    assert_eq!(el.text(), "42");

    let stats = handle.stop().await;
    assert_eq!(stats.attempts, 3);
    assert_eq!(stats.successes, 1);
    assert_eq!(stats.failures, 2);
    assert_eq!(stats.last_text.as_deref(), Some("42"));
}

#[tokio::test(start_paused = true)]
async fn test_stop_ends_schedule() {
    let source = Arc::new(ScriptedSource::new(coins(5)));
    let el = TextElement::new("coin-count", "");
    let handle = poller_for(Arc::clone(&source), &el).start();

    tokio::time::sleep(secs(61)).await;
    assert!(handle.is_running());
    handle.stop().await;

    tokio::time::sleep(secs(300)).await;
    assert_eq!(source.call_offsets().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stop_aborts_in_flight_refresh() {
    let source = Arc::new(ScriptedSource::new(coins(0)).then(secs(45), coins(99)));
    let el = TextElement::new("coin-count", "7");
    let handle = poller_for(Arc::clone(&source), &el).start();

    tokio::time::sleep(secs(40)).await;
    let stats = handle.stop().await;
    assert_eq!(stats.pending(), 1);

    tokio::time::sleep(secs(60)).await;
    assert_eq!(el.text(), "7");
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handle_stops_schedule() {
    let source = Arc::new(ScriptedSource::new(coins(5)));
    let el = TextElement::new("coin-count", "");
    let handle = poller_for(Arc::clone(&source), &el).start();

    tokio::time::sleep(secs(31)).await;
    drop(handle);

    tokio::time::sleep(secs(120)).await;
    assert_eq!(source.call_offsets().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_scripted_source_records_calls() {
    let source = ScriptedSource::new(coins(1)).then(secs(2), coins(2));
    assert_eq!(source.fetch_balance().await.unwrap().display_text(), "2");
    assert_eq!(source.fetch_balance().await.unwrap().display_text(), "1");
    assert_eq!(source.call_offsets(), vec![Duration::ZERO, secs(2)]);
    assert_eq!(source.name(), "scripted");
}
