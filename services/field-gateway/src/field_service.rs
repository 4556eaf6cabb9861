//! Field Service operations
//!
//! Builds OData queries from [`SCHEMA`], forwards them through the
//! [`DataverseClient`], and maps the returned records onto the gateway's
//! JSON shapes. Caller input is validated here, before any outbound call.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use dataverse_client::odata::{FORMATTED_VALUE, normalize_guid, quote_literal};
use dataverse_client::{DataverseClient, Error as DataverseError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{info, instrument, warn};

use crate::error::{ApiError, Result};
use crate::schema::{SCHEMA, WorkOrderStatus};

/// Upper bound on contractor lookup results.
const CONTRACTOR_LOOKUP_LIMIT: usize = 25;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractorQuery {
    Email(String),
    Name(String),
}

impl ContractorQuery {
    /// Exactly one of `email` or `name`, non-blank.
    pub fn from_params(email: Option<&str>, name: Option<&str>) -> Result<Self> {
        let email = email.map(str::trim).filter(|s| !s.is_empty());
        let name = name.map(str::trim).filter(|s| !s.is_empty());
        match (email, name) {
            (Some(email), None) => Ok(ContractorQuery::Email(email.to_string())),
            (None, Some(name)) => Ok(ContractorQuery::Name(name.to_string())),
            (Some(_), Some(_)) => Err(ApiError::validation("provide either email or name, not both")),
            (None, None) => Err(ApiError::validation("email or name is required")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingView {
    #[default]
    All,
    /// Not yet finished (includes bookings in progress).
    Upcoming,
    /// Already finished, most recent first.
    Past,
}

impl fmt::Display for BookingView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BookingView::All => "all",
            BookingView::Upcoming => "upcoming",
            BookingView::Past => "past",
        })
    }
}

impl FromStr for BookingView {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(BookingView::All),
            "upcoming" => Ok(BookingView::Upcoming),
            "past" => Ok(BookingView::Past),
            other => Err(ApiError::validation(format!(
                "unknown view '{other}', expected all, upcoming or past"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contractor {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkOrderRef {
    pub id: String,
    pub number: Option<String>,
    pub status: Option<WorkOrderStatus>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Booking {
    pub id: String,
    pub name: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    /// Booking status display label.
    pub status: Option<String>,
    pub work_order: Option<WorkOrderRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingList {
    pub view: BookingView,
    pub count: usize,
    /// More bookings existed than the page cap allowed.
    pub truncated: bool,
    pub bookings: Vec<Booking>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceAccount {
    pub id: String,
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkOrder {
    pub id: String,
    pub number: Option<String>,
    pub status: Option<WorkOrderStatus>,
    pub status_label: Option<String>,
    pub summary: Option<String>,
    pub instructions: Option<String>,
    pub service_account: Option<ServiceAccount>,
    pub incident_type: Option<String>,
    pub bookings: Vec<Booking>,
}

/// PATCH body accepted from callers. At least one field must be present.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkOrderUpdate {
    pub status: Option<String>,
    pub summary: Option<String>,
    pub instructions: Option<String>,
}

impl WorkOrderUpdate {
    /// Translate into Dataverse column names.
    pub fn to_patch_body(&self) -> Result<Value> {
        let wo = &SCHEMA.work_order;
        let mut body = Map::new();
        if let Some(status) = &self.status {
            let status: WorkOrderStatus = status.parse().map_err(ApiError::validation)?;
            body.insert(wo.system_status.into(), json!(status.code()));
        }
        if let Some(summary) = &self.summary {
            body.insert(wo.summary.into(), json!(summary));
        }
        if let Some(instructions) = &self.instructions {
            body.insert(wo.instructions.into(), json!(instructions));
        }
        if body.is_empty() {
            return Err(ApiError::validation(
                "nothing to update, provide status, summary or instructions",
            ));
        }
        Ok(Value::Object(body))
    }
}

/// Raw photo as received from the caller.
#[derive(Debug)]
pub struct PhotoUpload {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhotoUploaded {
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhotoSummary {
    pub id: String,
    pub filename: Option<String>,
    pub subject: Option<String>,
    pub mime_type: Option<String>,
    pub size_bytes: Option<u64>,
    pub created_on: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhotoList {
    pub count: usize,
    pub truncated: bool,
    pub photos: Vec<PhotoSummary>,
}

/// Decoded attachment.
#[derive(Debug, Clone)]
pub struct Photo {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusOption {
    pub value: WorkOrderStatus,
    pub code: i64,
    pub label: &'static str,
}

pub fn status_options() -> Vec<StatusOption> {
    WorkOrderStatus::ALL
        .into_iter()
        .map(|status| StatusOption {
            value: status,
            code: status.code(),
            label: status.label(),
        })
        .collect()
}

pub struct FieldService {
    dataverse: DataverseClient,
    allow_writes: bool,
}

impl FieldService {
    pub fn new(dataverse: DataverseClient, allow_writes: bool) -> Self {
        Self {
            dataverse,
            allow_writes,
        }
    }

    pub fn writes_enabled(&self) -> bool {
        self.allow_writes
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.allow_writes {
            Ok(())
        } else {
            Err(ApiError::WritesDisabled)
        }
    }

    #[instrument(skip_all)]
    pub async fn find_contractors(&self, query: &ContractorQuery) -> Result<Vec<Contractor>> {
        let paged = self
            .dataverse
            .request_all_pages(&contractor_query(query))
            .await?;
        Ok(paged.value.iter().map(parse_contractor).collect())
    }

    #[instrument(skip(self, view, now), fields(view = %view))]
    pub async fn list_bookings(
        &self,
        resource_id: &str,
        view: BookingView,
        now: DateTime<Utc>,
    ) -> Result<BookingList> {
        let resource_id = normalize_guid(resource_id)?;
        let paged = self
            .dataverse
            .request_all_pages(&bookings_query(&resource_id, view, now))
            .await?;
        if paged.truncated {
            warn!(resource_id = %resource_id, pages = paged.pages, "booking list truncated");
        }
        let bookings: Vec<Booking> = paged.value.iter().map(parse_booking).collect();
        Ok(BookingList {
            view,
            count: bookings.len(),
            truncated: paged.truncated,
            bookings,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_work_order(&self, id: &str) -> Result<WorkOrder> {
        let id = normalize_guid(id)?;
        let record = self.dataverse.get_json(&work_order_query(&id)).await?;
        Ok(parse_work_order(&record))
    }

    #[instrument(skip(self, update))]
    pub async fn update_work_order(&self, id: &str, update: &WorkOrderUpdate) -> Result<()> {
        self.ensure_writable()?;
        let id = normalize_guid(id)?;
        let body = update.to_patch_body()?;
        self.dataverse
            .patch(&format!("{}({id})", SCHEMA.work_order.entity_set), &body)
            .await?;
        info!(work_order_id = %id, fields = ?body.as_object().map(|m| m.keys().collect::<Vec<_>>()), "work order updated");
        Ok(())
    }

    #[instrument(skip(self, photo, now), fields(size = photo.bytes.len()))]
    pub async fn upload_photo(
        &self,
        work_order_id: &str,
        photo: PhotoUpload,
        now: DateTime<Utc>,
    ) -> Result<PhotoUploaded> {
        self.ensure_writable()?;
        let work_order_id = normalize_guid(work_order_id)?;
        let mime_type = image_mime_type(photo.content_type.as_deref())?;
        if photo.bytes.is_empty() {
            return Err(ApiError::validation("photo body is empty"));
        }
        let filename = match photo.filename.as_deref().and_then(sanitize_filename) {
            Some(name) => name,
            None => default_photo_filename(&mime_type, now),
        };

        let body = annotation_body(&work_order_id, &filename, &mime_type, &photo.bytes);
        self.dataverse
            .post(SCHEMA.annotation.entity_set, &body)
            .await?;

        info!(work_order_id = %work_order_id, filename = %filename, "photo attached");
        Ok(PhotoUploaded {
            filename,
            mime_type,
            size_bytes: photo.bytes.len(),
        })
    }

    #[instrument(skip(self))]
    pub async fn list_photos(&self, work_order_id: &str) -> Result<PhotoList> {
        let work_order_id = normalize_guid(work_order_id)?;
        let paged = self
            .dataverse
            .request_all_pages(&photos_query(&work_order_id))
            .await?;
        let photos: Vec<PhotoSummary> = paged.value.iter().map(parse_photo_summary).collect();
        Ok(PhotoList {
            count: photos.len(),
            truncated: paged.truncated,
            photos,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_photo(&self, annotation_id: &str) -> Result<Photo> {
        let annotation_id = normalize_guid(annotation_id)?;
        let an = &SCHEMA.annotation;
        let record = self
            .dataverse
            .get_json(&format!(
                "{}({annotation_id})?$select={},{},{}",
                an.entity_set, an.filename, an.mime_type, an.document_body
            ))
            .await?;

        let Some(encoded) = text(&record, an.document_body).filter(|b| !b.is_empty()) else {
            return Err(ApiError::NotFound(format!(
                "note {annotation_id} has no attachment"
            )));
        };
        let bytes = STANDARD.decode(encoded.as_bytes()).map_err(|e| {
            DataverseError::MalformedResponse(format!("attachment is not valid base64: {e}"))
        })?;

        // Only raster images are served back
        let Some(mime_type) = text(&record, an.mime_type)
            .map(|m| base_mime(&m))
            .filter(|m| is_raster_image(m))
        else {
            return Err(ApiError::NotFound(format!(
                "note {annotation_id} has no image attachment"
            )));
        };

        Ok(Photo {
            filename: text(&record, an.filename).unwrap_or_else(|| format!("{annotation_id}.bin")),
            mime_type,
            bytes,
        })
    }
}

fn contractor_query(query: &ContractorQuery) -> String {
    let c = &SCHEMA.contractor;
    let filter = match query {
        ContractorQuery::Email(email) => format!("{} eq {}", c.email, quote_literal(email)),
        ContractorQuery::Name(name) => format!("contains({},{})", c.name, quote_literal(name)),
    };
    format!(
        "{}?$select={},{},{}&$filter={filter}&$orderby={} asc&$top={CONTRACTOR_LOOKUP_LIMIT}",
        c.entity_set, c.id, c.name, c.email, c.name
    )
}

fn booking_select() -> String {
    let b = &SCHEMA.booking;
    [b.id, b.name, b.start, b.end, b.status_lookup].join(",")
}

fn work_order_ref_select() -> String {
    let wo = &SCHEMA.work_order;
    [wo.id, wo.number, wo.system_status, wo.summary].join(",")
}

fn bookings_query(resource_id: &str, view: BookingView, now: DateTime<Utc>) -> String {
    let b = &SCHEMA.booking;
    let now = now.format("%Y-%m-%dT%H:%M:%SZ");
    let mut filter = format!("{} eq {resource_id}", b.resource_lookup);
    match view {
        BookingView::All => {}
        BookingView::Upcoming => filter.push_str(&format!(" and {} ge {now}", b.end)),
        BookingView::Past => filter.push_str(&format!(" and {} lt {now}", b.end)),
    }
    let order = if view == BookingView::Past { "desc" } else { "asc" };
    format!(
        "{}?$select={}&$expand={}($select={})&$filter={filter}&$orderby={} {order}",
        b.entity_set,
        booking_select(),
        b.work_order_nav,
        work_order_ref_select(),
        b.start
    )
}

fn work_order_query(id: &str) -> String {
    let wo = &SCHEMA.work_order;
    let acct = &SCHEMA.account;
    format!(
        "{}({id})?$select={},{},{},{},{}&$expand={}($select={},{},{},{}),{}($select={}),{}($select={};$orderby={} asc)",
        wo.entity_set,
        wo.id,
        wo.number,
        wo.system_status,
        wo.summary,
        wo.instructions,
        wo.service_account_nav,
        acct.id,
        acct.name,
        acct.address,
        acct.phone,
        wo.incident_type_nav,
        wo.incident_type_name,
        wo.bookings_nav,
        booking_select(),
        SCHEMA.booking.start,
    )
}

fn photos_query(work_order_id: &str) -> String {
    let an = &SCHEMA.annotation;
    format!(
        "{}?$select={},{},{},{},{},{}&$filter={} eq {work_order_id} and {} eq true and startswith({},'image/')&$orderby={} desc",
        an.entity_set,
        an.id,
        an.subject,
        an.filename,
        an.mime_type,
        an.file_size,
        an.created_on,
        an.regarding_lookup,
        an.is_document,
        an.mime_type,
        an.created_on,
    )
}

fn annotation_body(work_order_id: &str, filename: &str, mime_type: &str, bytes: &[u8]) -> Value {
    let an = &SCHEMA.annotation;
    let mut body = Map::new();
    body.insert(an.subject.into(), json!(format!("Photo: {filename}")));
    body.insert(an.filename.into(), json!(filename));
    body.insert(an.mime_type.into(), json!(mime_type));
    body.insert(an.document_body.into(), json!(STANDARD.encode(bytes)));
    body.insert(an.is_document.into(), json!(true));
    body.insert(
        an.regarding_work_order_bind.into(),
        json!(format!("/{}({work_order_id})", SCHEMA.work_order.entity_set)),
    );
    Value::Object(body)
}

/// `image/*` media type without parameters, lowercased.
/// Media type without parameters, lowercased.
fn base_mime(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// `image/*` other than SVG, which can carry script.
fn is_raster_image(mime: &str) -> bool {
    mime.strip_prefix("image/")
        .is_some_and(|subtype| !subtype.is_empty() && !subtype.starts_with("svg"))
}

fn image_mime_type(content_type: Option<&str>) -> Result<String> {
    let mime = content_type.map(base_mime).unwrap_or_default();
    if is_raster_image(&mime) {
        Ok(mime)
    } else if mime.is_empty() {
        Err(ApiError::validation("photo upload requires an image Content-Type"))
    } else {
        Err(ApiError::validation(format!(
            "photo must be an image, got Content-Type '{mime}'"
        )))
    }
}

/// Last path component, with quotes and control characters dropped.
fn sanitize_filename(raw: &str) -> Option<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control() && *c != '"')
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        None
    } else {
        Some(cleaned.to_string())
    }
}

fn default_photo_filename(mime_type: &str, now: DateTime<Utc>) -> String {
    let ext = match mime_type.trim_start_matches("image/") {
        "jpeg" | "pjpeg" => "jpg",
        "svg+xml" => "svg",
        other => other,
    };
    format!("photo-{}.{ext}", now.format("%Y%m%d-%H%M%S"))
}

fn text(record: &Value, field: &str) -> Option<String> {
    record.get(field).and_then(Value::as_str).map(str::to_string)
}

fn formatted(record: &Value, field: &str) -> Option<String> {
    text(record, &format!("{field}{FORMATTED_VALUE}"))
}

/// Navigation property, when expanded and non-null.
fn expanded<'a>(record: &'a Value, nav: &str) -> Option<&'a Value> {
    record.get(nav).filter(|v| v.is_object())
}

fn parse_contractor(record: &Value) -> Contractor {
    let c = &SCHEMA.contractor;
    Contractor {
        id: text(record, c.id).unwrap_or_default(),
        name: text(record, c.name),
        email: text(record, c.email),
    }
}

fn parse_work_order_ref(record: &Value) -> WorkOrderRef {
    let wo = &SCHEMA.work_order;
    WorkOrderRef {
        id: text(record, wo.id).unwrap_or_default(),
        number: text(record, wo.number),
        status: record
            .get(wo.system_status)
            .and_then(Value::as_i64)
            .and_then(WorkOrderStatus::from_code),
        summary: text(record, wo.summary),
    }
}

fn parse_booking(record: &Value) -> Booking {
    let b = &SCHEMA.booking;
    Booking {
        id: text(record, b.id).unwrap_or_default(),
        name: text(record, b.name),
        start: text(record, b.start),
        end: text(record, b.end),
        status: formatted(record, b.status_lookup),
        work_order: expanded(record, b.work_order_nav).map(parse_work_order_ref),
    }
}

fn parse_service_account(record: &Value) -> ServiceAccount {
    let acct = &SCHEMA.account;
    ServiceAccount {
        id: text(record, acct.id).unwrap_or_default(),
        name: text(record, acct.name),
        address: text(record, acct.address),
        phone: text(record, acct.phone),
    }
}

fn parse_work_order(record: &Value) -> WorkOrder {
    let wo = &SCHEMA.work_order;
    let head = parse_work_order_ref(record);
    let status_label = formatted(record, wo.system_status)
        .or_else(|| head.status.map(|s| s.label().to_string()));
    let bookings = record
        .get(wo.bookings_nav)
        .and_then(Value::as_array)
        .map(|items| items.iter().map(parse_booking).collect())
        .unwrap_or_default();

    WorkOrder {
        id: head.id,
        number: head.number,
        status: head.status,
        status_label,
        summary: head.summary,
        instructions: text(record, wo.instructions),
        service_account: expanded(record, wo.service_account_nav).map(parse_service_account),
        incident_type: expanded(record, wo.incident_type_nav)
            .and_then(|it| text(it, wo.incident_type_name)),
        bookings,
    }
}

fn parse_photo_summary(record: &Value) -> PhotoSummary {
    let an = &SCHEMA.annotation;
    PhotoSummary {
        id: text(record, an.id).unwrap_or_default(),
        filename: text(record, an.filename),
        subject: text(record, an.subject),
        mime_type: text(record, an.mime_type),
        size_bytes: record.get(an.file_size).and_then(Value::as_u64),
        created_on: text(record, an.created_on),
    }
}
