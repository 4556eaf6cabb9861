//! Shared types for the Dataverse field-service gateway workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
