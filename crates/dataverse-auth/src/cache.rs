//! Process-wide access token cache
//!
//! Holds at most one token. Reads take the `RwLock` briefly; a cache miss
//! takes the refresh `Mutex` so that concurrent callers share a single token
//! request instead of each issuing their own.

use std::time::{Duration, Instant};

use common::Secret;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::constants::{REFRESH_MARGIN, token_endpoint};
use crate::error::{Error, Result};
use crate::token::{ClientCredentials, request_token};

struct CachedToken {
    value: Secret<String>,
    expires_at: Instant,
}

impl CachedToken {
    /// Usable while `now < expires_at - margin`.
    fn is_fresh(&self, now: Instant, margin: Duration) -> bool {
        now + margin < self.expires_at
    }
}

/// Snapshot of the cache for health reporting. Never carries the token.
#[derive(Debug, Clone, Serialize)]
pub struct TokenStatus {
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_secs: Option<u64>,
}

/// Client-credentials token cache.
pub struct TokenCache {
    http: reqwest::Client,
    token_url: String,
    credentials: ClientCredentials,
    margin: Duration,
    cached: RwLock<Option<CachedToken>>,
    refresh: Mutex<()>,
}

impl TokenCache {
    pub fn new(http: reqwest::Client, authority_host: &str, credentials: ClientCredentials) -> Self {
        let token_url = token_endpoint(authority_host, &credentials.tenant_id);
        Self {
            http,
            token_url,
            credentials,
            margin: REFRESH_MARGIN,
            cached: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    /// Return the cached token, or acquire a new one if it is missing or
    /// within the refresh margin of expiry.
    ///
    /// A failed acquisition leaves the cache untouched and is not retried.
    pub async fn get_access_token(&self) -> Result<String> {
        if let Some(token) = self.fresh_token().await {
            return Ok(token);
        }

        let _refresh = self.refresh.lock().await;

        // Another caller may have refreshed while we waited for the lock
        if let Some(token) = self.fresh_token().await {
            debug!("reusing token refreshed by a concurrent caller");
            return Ok(token);
        }

        let response = match request_token(&self.http, &self.token_url, &self.credentials).await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "access token acquisition failed");
                return Err(e);
            }
        };

        let Some(expires_at) = Instant::now().checked_add(Duration::from_secs(response.expires_in))
        else {
            warn!(expires_in = response.expires_in, "token lifetime out of range");
            return Err(Error::InvalidResponse(format!(
                "expires_in {} is out of range",
                response.expires_in
            )));
        };
        let value = response.access_token;
        *self.cached.write().await = Some(CachedToken {
            value: Secret::new(value.clone()),
            expires_at,
        });

        info!(expires_in_secs = response.expires_in, "acquired Dataverse access token");
        Ok(value)
    }

    pub async fn status(&self) -> TokenStatus {
        let cached = self.cached.read().await;
        match cached.as_ref() {
            Some(token) => TokenStatus {
                cached: true,
                expires_in_secs: Some(
                    token
                        .expires_at
                        .saturating_duration_since(Instant::now())
                        .as_secs(),
                ),
            },
            None => TokenStatus {
                cached: false,
                expires_in_secs: None,
            },
        }
    }

    async fn fresh_token(&self) -> Option<String> {
        let cached = self.cached.read().await;
        cached
            .as_ref()
            .filter(|t| t.is_fresh(Instant::now(), self.margin))
            .map(|t| t.value.expose().clone())
    }
}
