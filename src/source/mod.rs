//! Balance sources.
//!
//! Defines the `BalanceSource` trait and the `RefreshError` taxonomy.
//! The production implementation is the HTTP client in [`http`]; tests
//! substitute scripted or mocked sources.

pub mod http;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::Balance;

/// Why a single refresh failed. The display is never touched on any of these.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RefreshError {
    /// Transport failure: connection refused, DNS, timeout, reset.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-2xx status.
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The body was not JSON, or `coins` was missing or not a number.
    #[error("malformed balance response: {0}")]
    Malformed(String),
}

impl RefreshError {
    /// Short machine-friendly label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RefreshError::Network(_) => "network",
            RefreshError::Status { .. } => "status",
            RefreshError::Malformed(_) => "malformed",
        }
    }
}

/// Anything that can report the current user's balance.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// Fetch the current balance once. No retries.
    async fn fetch_balance(&self) -> Result<Balance, RefreshError>;

    /// Source name for logging.
    fn name(&self) -> &str;
}
