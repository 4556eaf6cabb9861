//! Dataverse Web API (OData v4) access
//!
//! [`DataverseClient::request`] forwards one call with a bearer token and the
//! fixed OData headers, unwrapping the response envelope into an
//! [`ODataResponse`]. [`DataverseClient::request_all_pages`] follows
//! `@odata.nextLink` cursors and flattens the `value` arrays, stopping at a
//! page cap. Neither retries; every failure is returned to the caller.

pub mod client;
pub mod error;
pub mod odata;
pub mod pager;

#[cfg(test)]
mod test_support;

pub use client::{DataverseClient, ODataResponse};
pub use error::{Error, Result};
pub use pager::{DEFAULT_MAX_PAGES, Paged};
pub use reqwest::Method;
