//! Client-credentials authentication for the Dataverse Web API
//!
//! Acquires app-only access tokens from the Microsoft identity platform and
//! keeps exactly one of them cached per process. Request-issuing code depends
//! on the [`AccessTokenSource`] trait rather than on the cache itself, so the
//! cache is constructed once in `main` and injected wherever tokens are needed.
//!
//! Flow:
//! 1. `main` builds [`ClientCredentials`] from config and wraps them in a [`TokenCache`]
//! 2. Each outbound Dataverse call asks the source for a bearer token
//! 3. The cache returns the stored token until it is within [`REFRESH_MARGIN`] of expiry
//! 4. On a miss, one caller runs [`token::request_token`]; the others wait and reuse its result

pub mod cache;
pub mod constants;
pub mod error;
pub mod token;

pub use cache::{TokenCache, TokenStatus};
pub use constants::*;
pub use error::{Error, Result};
pub use token::{ClientCredentials, TokenResponse, request_token};

use std::future::Future;
use std::pin::Pin;

/// Anything that can hand out a bearer token for the Dataverse Web API.
///
/// Uses `Pin<Box<dyn Future>>` so it can be held as `Arc<dyn AccessTokenSource>`.
pub trait AccessTokenSource: Send + Sync {
    fn access_token(&self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>>;
}

impl AccessTokenSource for TokenCache {
    fn access_token(&self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        Box::pin(self.get_access_token())
    }
}
