//! HTTP balance source.
//!
//! `GET {base_url}/api/user_coins` → `{ "coins": <number> }`.
//! Auth: the server uses a cookie session; when configured, the `session`
//! cookie is forwarded as-is. Without it the server redirects to its login
//! page, which surfaces here as a malformed body.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, COOKIE};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{BalanceSource, RefreshError};
use crate::config::EndpointConfig;
use crate::types::Balance;

const SOURCE_NAME: &str = "http";

/// Longest error body kept in a `RefreshError::Status`.
const MAX_ERROR_BODY: usize = 200;

/// Shape of the endpoint's JSON body. Extra fields are ignored.
#[derive(Debug, Deserialize)]
struct CoinsResponse {
    coins: Balance,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct HttpBalanceClient {
    http: Client,
    url: String,
    session: Option<SecretString>,
}

impl HttpBalanceClient {
    /// Build a client from endpoint config, resolving the session cookie
    /// from the environment.
    pub fn new(cfg: &EndpointConfig) -> Result<Self> {
        Self::with_session(cfg, cfg.session_cookie())
    }

    /// Build a client with an explicit session cookie.
    pub fn with_session(cfg: &EndpointConfig, session: Option<SecretString>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .user_agent(cfg.user_agent.as_str())
            .build()
            .context("Failed to build HTTP client for balance endpoint")?;

        Ok(Self {
            http,
            url: cfg.url(),
            session,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    fn truncate(body: &str) -> String {
        match body.char_indices().nth(MAX_ERROR_BODY) {
            Some((idx, _)) => format!("{}…", &body[..idx]),
            None => body.to_string(),
        }
    }
}

#[async_trait]
impl BalanceSource for HttpBalanceClient {
    async fn fetch_balance(&self) -> Result<Balance, RefreshError> {
        debug!(url = %self.url, "Fetching balance");

        let mut req = self.http.get(&self.url).header(ACCEPT, "application/json");
        if let Some(session) = &self.session {
            req = req.header(COOKIE, format!("session={}", session.expose_secret()));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| RefreshError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RefreshError::Status {
                status: status.as_u16(),
                body: Self::truncate(&body),
            });
        }

        // `coins` must be present and numeric; `0` is a valid balance.
        let parsed: CoinsResponse = resp.json().await.map_err(|e| {
            if e.is_decode() {
                RefreshError::Malformed(e.to_string())
            } else {
                RefreshError::Network(e.to_string())
            }
        })?;

        Ok(parsed.coins)
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
