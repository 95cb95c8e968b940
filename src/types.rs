//! Shared types for the balance poller.
//!
//! The server owns the balance; everything here is a transient view of
//! the most recent fetch and is never persisted.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;

// ---------------------------------------------------------------------------
// Balance
// ---------------------------------------------------------------------------

/// The user's coin balance as reported by the server.
///
/// Rendered the way a browser renders a JSON number as text: integers
/// verbatim, whole-valued floats without a fractional part (`1.0` → `1`,
/// `0.0` → `0`), and exponent notation outside `[1e-6, 1e21)`
/// (`1e23` → `1e+23`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Balance(serde_json::Number);

/// Magnitudes at or above this switch to exponent notation.
const EXPONENT_ABOVE: f64 = 1e21;
/// Non-zero magnitudes below this switch to exponent notation.
const EXPONENT_BELOW: f64 = 1e-6;

impl Balance {
    pub fn new(value: serde_json::Number) -> Self {
        Self(value)
    }

    /// Text written into the display target.
    pub fn display_text(&self) -> String {
        if self.0.is_i64() || self.0.is_u64() {
            return self.0.to_string();
        }
        match self.0.as_f64() {
            Some(v) => format_float(v),
            None => self.0.to_string(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.0.as_i64()
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.0.as_f64()
    }
}

fn format_float(v: f64) -> String {
    // Also folds -0.0 into "0".
    if v == 0.0 {
        return "0".to_string();
    }
    let magnitude = v.abs();
    if magnitude >= EXPONENT_ABOVE || magnitude < EXPONENT_BELOW {
        let text = format!("{v:e}");
        match text.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
            _ => text,
        }
    } else {
        // `Display` for f64 drops the fraction of whole values.
        format!("{v}")
    }
}

impl From<i64> for Balance {
    fn from(v: i64) -> Self {
        Self(v.into())
    }
}

impl From<u64> for Balance {
    fn from(v: u64) -> Self {
        Self(v.into())
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_text())
    }
}

// ---------------------------------------------------------------------------
// Refresh results
// ---------------------------------------------------------------------------

/// What a successful refresh wrote to the display.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshOutcome {
    pub balance: Balance,
    /// The exact text written into the display target.
    pub text: String,
    pub fetched_at: DateTime<Utc>,
}

/// Running counters kept by the poller. Observational only.
#[derive(Debug, Clone, Default)]
pub struct PollerStats {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub last_text: Option<String>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl PollerStats {
    pub(crate) fn record_success(&mut self, outcome: &RefreshOutcome) {
        self.successes += 1;
        self.last_text = Some(outcome.text.clone());
        self.last_success_at = Some(outcome.fetched_at);
    }

    pub(crate) fn record_failure(&mut self, error: &str) {
        self.failures += 1;
        self.last_error = Some(error.to_string());
    }

    /// Attempts that have not finished yet (still in flight or aborted).
    pub fn pending(&self) -> u64 {
        self.attempts.saturating_sub(self.successes + self.failures)
    }
}

impl fmt::Display for PollerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempts={} ok={} failed={} last={}",
            self.attempts,
            self.successes,
            self.failures,
            self.last_text.as_deref().unwrap_or("-"),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
