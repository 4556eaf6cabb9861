//! Field Service HTTP API
//!
//! Endpoints:
//! - GET   /api/contractors?email=..|name=..        : contractor lookup
//! - GET   /api/contractors/{id}/bookings?view=..   : bookings (all, upcoming, past)
//! - GET   /api/workorders/{id}                     : work order with related records
//! - PATCH /api/workorders/{id}                     : update status, summary, instructions
//! - POST  /api/workorders/{id}/photos?filename=..  : attach a photo (raw image body)
//! - GET   /api/workorders/{id}/photos              : list photo metadata
//! - GET   /api/photos/{id}                         : photo bytes
//! - GET   /api/status-options                      : work order status values

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::error::{ApiError, Result};
use crate::field_service::{
    BookingView, ContractorQuery, FieldService, PhotoUpload, WorkOrderUpdate, status_options,
};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<FieldService>,
    pub max_upload_bytes: usize,
}

/// Build the `/api` router.
pub fn build_api_router(state: ApiState) -> Router {
    let max_upload_bytes = state.max_upload_bytes;
    Router::new()
        .route("/api/contractors", get(find_contractors))
        .route("/api/contractors/{id}/bookings", get(list_bookings))
        .route(
            "/api/workorders/{id}",
            get(get_work_order).patch(update_work_order),
        )
        .route(
            "/api/workorders/{id}/photos",
            get(list_photos).post(upload_photo),
        )
        .route("/api/photos/{id}", get(get_photo))
        .route("/api/status-options", get(list_status_options))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        ApiError::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

#[derive(Deserialize)]
struct ContractorParams {
    email: Option<String>,
    name: Option<String>,
}

/// GET /api/contractors: look a contractor up by exact email or partial name.
async fn find_contractors(
    State(state): State<ApiState>,
    params: std::result::Result<Query<ContractorParams>, QueryRejection>,
) -> Result<Response> {
    let Query(params) = params?;
    let query = ContractorQuery::from_params(params.email.as_deref(), params.name.as_deref())?;
    let contractors = state.service.find_contractors(&query).await?;
    Ok(Json(json!({ "count": contractors.len(), "contractors": contractors })).into_response())
}

#[derive(Deserialize)]
struct BookingParams {
    view: Option<String>,
}

/// GET /api/contractors/{id}/bookings: every booking for a bookable resource.
///
/// The listing is capped by the pager; `truncated` is set when more existed.
async fn list_bookings(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    params: std::result::Result<Query<BookingParams>, QueryRejection>,
) -> Result<Response> {
    let Query(params) = params?;
    let view: BookingView = params.view.as_deref().unwrap_or_default().parse()?;
    let bookings = state
        .service
        .list_bookings(&id, view, chrono::Utc::now())
        .await?;
    Ok(Json(bookings).into_response())
}

/// GET /api/workorders/{id}
async fn get_work_order(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let work_order = state.service.get_work_order(&id).await?;
    Ok(Json(work_order).into_response())
}

/// PATCH /api/workorders/{id}: body `{status?, summary?, instructions?}`.
async fn update_work_order(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: std::result::Result<Json<WorkOrderUpdate>, JsonRejection>,
) -> Result<Response> {
    // 403 takes precedence over body errors
    if !state.service.writes_enabled() {
        return Err(ApiError::WritesDisabled);
    }
    let Json(update) = body?;
    state.service.update_work_order(&id, &update).await?;
    Ok(Json(json!({ "success": true })).into_response())
}

#[derive(Deserialize)]
struct UploadParams {
    filename: Option<String>,
}

/// POST /api/workorders/{id}/photos: raw image body, `Content-Type: image/*`.
async fn upload_photo(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    params: std::result::Result<Query<UploadParams>, QueryRejection>,
    headers: HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Response> {
    if !state.service.writes_enabled() {
        return Err(ApiError::WritesDisabled);
    }
    let Query(params) = params?;
    let photo = PhotoUpload {
        filename: params.filename,
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        bytes: body?.to_vec(),
    };
    let uploaded = state
        .service
        .upload_photo(&id, photo, chrono::Utc::now())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "photo": uploaded })),
    )
        .into_response())
}

/// GET /api/workorders/{id}/photos: metadata only, newest first.
async fn list_photos(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let photos = state.service.list_photos(&id).await?;
    Ok(Json(photos).into_response())
}

/// GET /api/photos/{id}: attachment bytes with their stored media type.
///
/// Only raster image attachments are served; other notes read as 404.
async fn get_photo(State(state): State<ApiState>, Path(id): Path<String>) -> Result<Response> {
    let photo = state.service.get_photo(&id).await?;

    let mut response = photo.bytes.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&photo.mime_type)
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );
    if let Ok(disposition) =
        HeaderValue::from_str(&format!("inline; filename=\"{}\"", photo.filename.replace('"', "")))
    {
        headers.insert(header::CONTENT_DISPOSITION, disposition);
    }
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("private, max-age=300"));
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    Ok(response)
}

/// GET /api/status-options
async fn list_status_options() -> Json<serde_json::Value> {
    Json(json!({ "options": status_options() }))
}
