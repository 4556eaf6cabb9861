//! Request forwarder
//!
//! Every call fetches a token first, then sends the fixed OData headers.
//! Responses are unwrapped by status and content type:
//! - 204 is `NoContent`
//! - non-2xx is `Error::Upstream` carrying the remote message
//! - JSON bodies are parsed, anything else is a bare success marker

use std::sync::Arc;

use dataverse_auth::AccessTokenSource;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::{Error, Result};
use crate::odata::{ACCEPT_JSON, CONTENT_TYPE_JSON, ODATA_VERSION, PREFER_ALL_ANNOTATIONS};
use crate::pager::DEFAULT_MAX_PAGES;

/// Unwrapped success response.
#[derive(Debug, Clone, PartialEq)]
pub enum ODataResponse {
    /// 2xx with a JSON body.
    Json(Value),
    /// 204, no body.
    NoContent,
    /// 2xx with a non-JSON body (binary or empty).
    Accepted,
}

impl ODataResponse {
    pub fn into_json(self) -> Option<Value> {
        match self {
            ODataResponse::Json(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Client for one Dataverse environment.
pub struct DataverseClient {
    http: reqwest::Client,
    api_root: String,
    tokens: Arc<dyn AccessTokenSource>,
    pub(crate) max_pages: usize,
}

impl DataverseClient {
    /// `base_url` is the environment root (`https://<org>.crm.dynamics.com`);
    /// calls go to `{base_url}/api/data/{api_version}/{path}`.
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        api_version: &str,
        tokens: Arc<dyn AccessTokenSource>,
    ) -> Self {
        Self {
            http,
            api_root: format!(
                "{}/api/data/{}/",
                base_url.trim_end_matches('/'),
                api_version.trim_matches('/')
            ),
            tokens,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// `{base_url}/api/data/{api_version}/`, with trailing slash.
    pub fn api_root(&self) -> &str {
        &self.api_root
    }

    fn url(&self, relative_path: &str) -> String {
        format!("{}{}", self.api_root, relative_path.trim_start_matches('/'))
    }

    /// Forward one call to the data API.
    #[instrument(skip_all, fields(method = %method, path = %relative_path))]
    pub async fn request(
        &self,
        method: Method,
        relative_path: &str,
        body: Option<&Value>,
    ) -> Result<ODataResponse> {
        let token = self.tokens.access_token().await?;

        let mut request = self
            .http
            .request(method, self.url(relative_path))
            .headers(odata_headers(&token)?);
        if let Some(body) = body {
            request = request
                .header(header::CONTENT_TYPE, CONTENT_TYPE_JSON)
                .json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            debug!("no content");
            return Ok(ODataResponse::NoContent);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = upstream_message(status, &body);
            warn!(status = status.as_u16(), error = %message, "Dataverse returned an error");
            return Err(Error::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let is_json = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/json"));
        if !is_json {
            return Ok(ODataResponse::Accepted);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(format!("reading response body: {e}")))?;
        serde_json::from_slice(&bytes)
            .map(ODataResponse::Json)
            .map_err(|e| Error::MalformedResponse(format!("invalid JSON body: {e}")))
    }

    /// GET that must return a JSON body.
    pub async fn get_json(&self, relative_path: &str) -> Result<Value> {
        match self.request(Method::GET, relative_path, None).await? {
            ODataResponse::Json(v) => Ok(v),
            other => Err(Error::MalformedResponse(format!(
                "expected a JSON body, got {other:?}"
            ))),
        }
    }

    pub async fn patch(&self, relative_path: &str, body: &Value) -> Result<ODataResponse> {
        self.request(Method::PATCH, relative_path, Some(body)).await
    }

    pub async fn post(&self, relative_path: &str, body: &Value) -> Result<ODataResponse> {
        self.request(Method::POST, relative_path, Some(body)).await
    }
}

fn odata_headers(token: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|e| Error::Authentication(format!("token is not a valid header value: {e}")))?;
    headers.insert(header::AUTHORIZATION, bearer);
    headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT_JSON));
    headers.insert(
        HeaderName::from_static("odata-version"),
        HeaderValue::from_static(ODATA_VERSION),
    );
    headers.insert(
        HeaderName::from_static("odata-maxversion"),
        HeaderValue::from_static(ODATA_VERSION),
    );
    headers.insert(
        HeaderName::from_static("prefer"),
        HeaderValue::from_static(PREFER_ALL_ANNOTATIONS),
    );
    Ok(headers)
}

/// Remote `error.message` when present, else the status line.
fn upstream_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| status.to_string())
}
