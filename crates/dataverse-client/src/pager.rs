//! Collection pager
//!
//! Follows `@odata.nextLink` and concatenates each page's `value` array in
//! the order pages are returned. Stops after `max_pages` even when a link
//! remains; that case is reported through [`Paged::truncated`], not as an error.

use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::client::DataverseClient;
use crate::error::{Error, Result};
use crate::odata::{NEXT_LINK, VALUE, relative_link};

/// Page cap applied when none is configured.
pub const DEFAULT_MAX_PAGES: usize = 10;

/// Flattened result of a paged query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Paged {
    pub value: Vec<Value>,
    /// Pages fetched (and requests issued).
    pub pages: usize,
    /// The cap was hit while a continuation link was still present.
    pub truncated: bool,
}

impl DataverseClient {
    /// Fetch every page of a collection query, up to the page cap.
    #[instrument(skip_all, fields(path = %relative_path))]
    pub async fn request_all_pages(&self, relative_path: &str) -> Result<Paged> {
        let mut paged = Paged::default();
        let mut next = Some(relative_path.to_string());

        while let Some(path) = next.take() {
            if paged.pages >= self.max_pages {
                paged.truncated = true;
                warn!(
                    pages = paged.pages,
                    items = paged.value.len(),
                    "page cap reached, remaining results dropped"
                );
                break;
            }

            let page = self.get_json(&path).await?;
            paged.pages += 1;

            let Value::Object(mut envelope) = page else {
                return Err(Error::MalformedResponse(
                    "collection response is not an object".into(),
                ));
            };
            match envelope.remove(VALUE) {
                Some(Value::Array(items)) => paged.value.extend(items),
                _ => {
                    return Err(Error::MalformedResponse(format!(
                        "collection response has no '{VALUE}' array"
                    )));
                }
            }

            if let Some(link) = envelope.get(NEXT_LINK).and_then(Value::as_str) {
                next = Some(relative_link(link, self.api_root())?.to_string());
            }
        }

        debug!(
            pages = paged.pages,
            items = paged.value.len(),
            truncated = paged.truncated,
            "collection fetched"
        );
        Ok(paged)
    }
}
