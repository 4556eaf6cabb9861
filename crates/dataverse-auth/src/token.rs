//! Client-credentials token request
//!
//! One POST to the tenant's v2.0 token endpoint with a form-encoded body.
//! The identity platform reports failures as `{error, error_description}`;
//! both are folded into the returned error message when present.

use common::Secret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::resource_scope;
use crate::error::{Error, Result};

/// App registration credentials plus the scope being requested.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub scope: String,
}

impl ClientCredentials {
    /// Credentials scoped to a Dataverse environment (`{base_url}/.default`).
    pub fn for_resource(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: Secret<String>,
        resource_url: &str,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret,
            scope: resource_scope(resource_url),
        }
    }
}

/// Successful token endpoint response.
///
/// `expires_in` is a delta in seconds from the response time.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

/// Request an app-only access token.
pub async fn request_token(
    client: &reqwest::Client,
    token_url: &str,
    credentials: &ClientCredentials,
) -> Result<TokenResponse> {
    debug!(
        tenant_id = %credentials.tenant_id,
        client_id = %credentials.client_id,
        scope = %credentials.scope,
        "requesting client-credentials token"
    );

    let response = client
        .post(token_url)
        .form(&[
            ("grant_type", "client_credentials"),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.expose().as_str()),
            ("scope", credentials.scope.as_str()),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::TokenRequest(describe_failure(status, &body)));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::InvalidResponse(e.to_string()))
}

fn describe_failure(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<TokenErrorBody>(body) {
        let detail = [parsed.error, parsed.error_description]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if !detail.trim().is_empty() {
            return format!("{status}: {}", detail.trim());
        }
    }
    format!("token endpoint returned {status}: {body}")
}
