//! OData protocol constants and literal helpers

use crate::error::{Error, Result};

pub const ODATA_VERSION: &str = "4.0";
pub const ACCEPT_JSON: &str = "application/json";
pub const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";
pub const PREFER_ALL_ANNOTATIONS: &str = "odata.include-annotations=\"*\"";

/// Continuation cursor key in a collection envelope.
pub const NEXT_LINK: &str = "@odata.nextLink";
/// Collection payload key.
pub const VALUE: &str = "value";

/// Suffix Dataverse appends to a property for its display label.
pub const FORMATTED_VALUE: &str = "@OData.Community.Display.V1.FormattedValue";

/// Quote a string as an OData literal for use inside `$filter`.
///
/// Single quotes are doubled. Characters that would end or split the query
/// string are percent-encoded.
pub fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\'' => out.push_str("''"),
            '%' => out.push_str("%25"),
            '&' => out.push_str("%26"),
            '#' => out.push_str("%23"),
            '+' => out.push_str("%2B"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Normalize a record id for use in a key segment like `accounts(<id>)`.
///
/// Accepts braced or bare GUIDs with surrounding whitespace; returns the
/// lowercase hyphenated form.
pub fn normalize_guid(value: &str) -> Result<String> {
    let trimmed = value.trim();
    let bare = trimmed
        .strip_prefix('{')
        .and_then(|v| v.strip_suffix('}'))
        .unwrap_or(trimmed);
    uuid::Uuid::parse_str(bare)
        .map(|id| id.as_hyphenated().to_string())
        .map_err(|_| Error::Validation(format!("'{trimmed}' is not a valid record id")))
}

/// Turn an absolute continuation link into a path relative to `api_root`.
///
/// Links already relative are returned unchanged. Absolute links outside
/// `api_root` are refused so the bearer token never leaves the environment.
pub fn relative_link<'a>(link: &'a str, api_root: &str) -> Result<&'a str> {
    if let Some(rest) = link.strip_prefix(api_root) {
        return Ok(rest);
    }
    if link.starts_with("http://") || link.starts_with("https://") {
        return Err(Error::MalformedResponse(format!(
            "continuation link outside the configured environment: {link}"
        )));
    }
    Ok(link)
}
