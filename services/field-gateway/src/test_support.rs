//! Mock identity platform and Dataverse environment for service tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::Json;
use axum::extract::{Query, State};
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::Secret;
use dataverse_auth::{AccessTokenSource, ClientCredentials, TokenCache};
use dataverse_client::DataverseClient;
use serde_json::json;
use tokio::net::TcpListener;

use crate::field_service::FieldService;

pub const TENANT: &str = "contoso-tenant";
pub const CONTRACTOR_ID: &str = "3f2c8e10-5b7a-4c1d-9e0f-112233445566";
pub const WORK_ORDER_ID: &str = "6a1b3c2d-0000-4e5f-8a9b-1c2d3e4f5a6b";
pub const MISSING_ID: &str = "00000000-0000-0000-0000-000000000000";
pub const PHOTO_ID: &str = "9d8c7b6a-1111-4222-8333-444455556666";
/// A note whose attachment body is empty.
pub const EMPTY_NOTE_ID: &str = "9d8c7b6a-1111-4222-8333-000000000000";
/// Notes with attachments that are not raster images.
pub const HTML_NOTE_ID: &str = "9d8c7b6a-1111-4222-8333-0000000000aa";
pub const SVG_NOTE_ID: &str = "9d8c7b6a-1111-4222-8333-0000000000bb";
pub const PHOTO_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nnot-really-a-png";

const API_PREFIX: &str = "/api/data/v9.2/";

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    /// Decoded query parameters.
    pub query: HashMap<String, String>,
    pub body: String,
}

#[derive(Clone)]
struct MockState {
    url: String,
    token_calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

pub struct MockDataverse {
    pub url: String,
    state: MockState,
}

impl MockDataverse {
    pub fn token_calls(&self) -> usize {
        self.state.token_calls.load(Ordering::SeqCst)
    }

    /// Data API requests, oldest first. Token requests are not included.
    pub fn data_requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Option<Recorded> {
        self.state.requests.lock().unwrap().last().cloned()
    }
}

/// Start a server answering both the token endpoint and the data API.
pub async fn start_dataverse() -> MockDataverse {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let state = MockState {
        url: url.clone(),
        token_calls: Arc::new(AtomicUsize::new(0)),
        requests: Arc::new(Mutex::new(Vec::new())),
    };

    let app = axum::Router::new()
        .route(
            "/{tenant}/oauth2/v2.0/token",
            axum::routing::post(|State(state): State<MockState>| async move {
                let n = state.token_calls.fetch_add(1, Ordering::SeqCst) + 1;
                Json(json!({
                    "token_type": "Bearer",
                    "expires_in": 3599,
                    "access_token": format!("at_{n}"),
                }))
            }),
        )
        .fallback(data_api)
        .with_state(state.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockDataverse { url, state }
}

pub fn token_cache(mock: &MockDataverse) -> Arc<TokenCache> {
    let credentials = ClientCredentials::for_resource(
        TENANT,
        "app-client-id",
        Secret::new("app-secret".to_string()),
        &mock.url,
    );
    Arc::new(TokenCache::new(reqwest::Client::new(), &mock.url, credentials))
}

pub fn client_for(mock: &MockDataverse, tokens: Arc<TokenCache>) -> DataverseClient {
    let tokens: Arc<dyn AccessTokenSource> = tokens;
    DataverseClient::new(reqwest::Client::new(), &mock.url, "v9.2", tokens)
}

pub fn field_service(mock: &MockDataverse, allow_writes: bool, max_pages: usize) -> FieldService {
    let client = client_for(mock, token_cache(mock)).with_max_pages(max_pages);
    FieldService::new(client, allow_writes)
}

fn not_found(message: String) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": { "code": "0x80040217", "message": message } })),
    )
        .into_response()
}

fn booking(page: usize, index: usize) -> serde_json::Value {
    json!({
        "bookableresourcebookingid": format!("booking-{page}-{index}"),
        "name": format!("Visit {page}.{index}"),
        "starttime": "2026-03-16T08:00:00Z",
        "endtime": "2026-03-16T10:00:00Z",
        "_bookingstatus_value": "c33410b9-1abe-4631-b4e9-6e4a1113af34",
        "_bookingstatus_value@OData.Community.Display.V1.FormattedValue": "Scheduled",
        "msdyn_workorder": {
            "msdyn_workorderid": WORK_ORDER_ID,
            "msdyn_name": "WO-00042",
            "msdyn_systemstatus": 690970001,
            "msdyn_workordersummary": "Pump leaking at flange",
        },
    })
}

async fn data_api(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    body: String,
) -> Response {
    let Some(resource) = uri.path().strip_prefix(API_PREFIX) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let query = Query::<HashMap<String, String>>::try_from_uri(&uri)
        .map(|q| q.0)
        .unwrap_or_default();
    state.requests.lock().unwrap().push(Recorded {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: query.clone(),
        body,
    });

    let work_order_key = format!("msdyn_workorders({WORK_ORDER_ID})");
    let photo_key = format!("annotations({PHOTO_ID})");
    let empty_note_key = format!("annotations({EMPTY_NOTE_ID})");
    let html_note_key = format!("annotations({HTML_NOTE_ID})");
    let svg_note_key = format!("annotations({SVG_NOTE_ID})");

    match (method, resource) {
        (Method::GET, "bookableresources") => Json(json!({
            "value": [{
                "bookableresourceid": CONTRACTOR_ID,
                "name": "Dana Reyes",
                "msdyn_primaryemail": "dana@contoso.com",
            }]
        }))
        .into_response(),

        // Endless collection: every page links to the next
        (Method::GET, "bookableresourcebookings") => {
            let page: usize = query
                .get("$skiptoken")
                .and_then(|t| t.parse().ok())
                .unwrap_or(0);
            Json(json!({
                "value": [booking(page, 0), booking(page, 1)],
                "@odata.nextLink": format!(
                    "{}{API_PREFIX}bookableresourcebookings?$skiptoken={}",
                    state.url,
                    page + 1
                ),
            }))
            .into_response()
        }

        (Method::GET, r) if r == work_order_key => Json(json!({
            "msdyn_workorderid": WORK_ORDER_ID,
            "msdyn_name": "WO-00042",
            "msdyn_systemstatus": 690970002,
            "msdyn_systemstatus@OData.Community.Display.V1.FormattedValue": "In Progress",
            "msdyn_workordersummary": "Pump leaking at flange",
            "msdyn_instructions": "Gate code 4411",
            "msdyn_serviceaccount": {
                "accountid": "5e6f7a8b-2222-4333-8444-555566667777",
                "name": "Fabrikam Plant 3",
                "address1_composite": "1 Industrial Way\r\nRedmond, WA 98052",
                "telephone1": "+1 425 555 0100",
            },
            "msdyn_primaryincidenttype": { "msdyn_name": "Pump leak" },
            "msdyn_msdyn_workorder_bookableresourcebooking_WorkOrder": [booking(0, 0)],
        }))
        .into_response(),

        (Method::GET, r) if r.starts_with("msdyn_workorders(") => {
            let id = r.trim_start_matches("msdyn_workorders(").trim_end_matches(')');
            not_found(format!("msdyn_workorder With Id = {id} Does Not Exist"))
        }

        (Method::PATCH, r) if r.starts_with("msdyn_workorders(") => {
            StatusCode::NO_CONTENT.into_response()
        }

        (Method::POST, "annotations") => (
            StatusCode::NO_CONTENT,
            [(
                "OData-EntityId",
                format!("{}{API_PREFIX}annotations({PHOTO_ID})", state.url),
            )],
        )
            .into_response(),

        (Method::GET, "annotations") => Json(json!({
            "value": [{
                "annotationid": PHOTO_ID,
                "subject": "Photo: leak.png",
                "filename": "leak.png",
                "mimetype": "image/png",
                "filesize": PHOTO_BYTES.len(),
                "createdon": "2026-03-14T09:12:00Z",
            }]
        }))
        .into_response(),

        (Method::GET, r) if r == photo_key => Json(json!({
            "annotationid": PHOTO_ID,
            "filename": "leak.png",
            "mimetype": "image/png",
            "documentbody": STANDARD.encode(PHOTO_BYTES),
        }))
        .into_response(),

        (Method::GET, r) if r == empty_note_key => Json(json!({
            "annotationid": EMPTY_NOTE_ID,
            "filename": null,
            "mimetype": null,
            "documentbody": null,
        }))
        .into_response(),

        (Method::GET, r) if r == html_note_key => Json(json!({
            "annotationid": HTML_NOTE_ID,
            "filename": "page.html",
            "mimetype": "text/html",
            "documentbody": STANDARD.encode("<script>alert(1)</script>"),
        }))
        .into_response(),

        (Method::GET, r) if r == svg_note_key => Json(json!({
            "annotationid": SVG_NOTE_ID,
            "filename": "drawing.svg",
            "mimetype": "image/svg+xml",
            "documentbody": STANDARD.encode("<svg onload=\"alert(1)\"/>"),
        }))
        .into_response(),

        _ => not_found(format!("Resource not found for the segment '{resource}'.")),
    }
}
