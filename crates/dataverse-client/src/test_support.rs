//! Mock Dataverse environment for forwarder and pager tests

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use dataverse_auth::AccessTokenSource;
use serde_json::json;
use tokio::net::TcpListener;

pub(crate) struct StaticToken(pub &'static str);

impl AccessTokenSource for StaticToken {
    fn access_token(
        &self,
    ) -> Pin<Box<dyn Future<Output = dataverse_auth::Result<String>> + Send + '_>> {
        let token = self.0.to_string();
        Box::pin(async move { Ok(token) })
    }
}

pub(crate) struct FailingToken;

impl AccessTokenSource for FailingToken {
    fn access_token(
        &self,
    ) -> Pin<Box<dyn Future<Output = dataverse_auth::Result<String>> + Send + '_>> {
        Box::pin(async {
            Err(dataverse_auth::Error::TokenRequest(
                "401 Unauthorized: invalid_client".into(),
            ))
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Recorded {
    pub method: String,
    pub path_and_query: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

#[derive(Clone)]
struct MockState {
    url: String,
    page_sizes: Vec<usize>,
    requests: Arc<AtomicUsize>,
    last: Arc<Mutex<Option<Recorded>>>,
}

pub(crate) struct MockUpstream {
    pub url: String,
    pub requests: Arc<AtomicUsize>,
    last: Arc<Mutex<Option<Recorded>>>,
}

impl MockUpstream {
    pub fn last_request(&self) -> Option<Recorded> {
        self.last.lock().unwrap().clone()
    }
}

/// Start a mock environment. `items` serves `page_sizes.len()` linked pages
/// whose elements carry consecutive `id`s starting at 0.
pub(crate) async fn start_upstream(page_sizes: Vec<usize>) -> MockUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let state = MockState {
        url: url.clone(),
        page_sizes,
        requests: Arc::new(AtomicUsize::new(0)),
        last: Arc::new(Mutex::new(None)),
    };
    let upstream = MockUpstream {
        url,
        requests: state.requests.clone(),
        last: state.last.clone(),
    };

    let app = axum::Router::new().fallback(handle).with_state(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    upstream
}

async fn handle(State(state): State<MockState>, request: Request<Body>) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);

    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.to_string())
        .unwrap_or_default();
    let query = request.uri().query().unwrap_or("").to_string();
    let headers = request
        .headers()
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
        .collect();
    let body = axum::body::to_bytes(request.into_body(), 1024 * 1024)
        .await
        .unwrap();
    *state.last.lock().unwrap() = Some(Recorded {
        method,
        path_and_query,
        headers,
        body: String::from_utf8_lossy(&body).to_string(),
    });

    let resource = path.strip_prefix("/api/data/v9.2/").unwrap_or(&path);
    match resource {
        "echo" => axum::Json(json!({ "ok": true })).into_response(),
        "nocontent" => StatusCode::NO_CONTENT.into_response(),
        "badfield" => (
            StatusCode::BAD_REQUEST,
            axum::Json(json!({ "error": { "code": "0x80060888", "message": "Invalid field" } })),
        )
            .into_response(),
        "boom" => (StatusCode::INTERNAL_SERVER_ERROR, "kaboom").into_response(),
        "binary" => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            vec![0u8, 1, 2, 3],
        )
            .into_response(),
        "broken" => (
            [(header::CONTENT_TYPE, "application/json; odata.metadata=minimal")],
            "{not json",
        )
            .into_response(),
        "foreign" => axum::Json(json!({
            "value": [{ "id": 0 }],
            "@odata.nextLink": "https://evil.example.com/api/data/v9.2/items?page=2",
        }))
        .into_response(),
        "novalue" => axum::Json(json!({ "count": 3 })).into_response(),
        "items" => items_page(&state, &query),
        _ => (
            StatusCode::NOT_FOUND,
            axum::Json(json!({ "error": { "message": format!("Resource not found for the segment '{resource}'.") } })),
        )
            .into_response(),
    }
}

fn items_page(state: &MockState, query: &str) -> Response {
    let page: usize = query
        .split('&')
        .find_map(|kv| kv.strip_prefix("page="))
        .and_then(|n| n.parse().ok())
        .unwrap_or(1);
    let Some(&size) = state.page_sizes.get(page - 1) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let start: usize = state.page_sizes[..page - 1].iter().sum();
    let value: Vec<_> = (start..start + size).map(|id| json!({ "id": id })).collect();

    let mut body = json!({ "value": value });
    if page < state.page_sizes.len() {
        body["@odata.nextLink"] = json!(format!("{}/api/data/v9.2/items?page={}", state.url, page + 1));
    }
    axum::Json(body).into_response()
}
