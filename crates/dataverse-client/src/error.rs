//! Error taxonomy for Dataverse calls

/// Failures surfaced to the caller. None are retried.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The token request was rejected or could not be made.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Non-2xx from the data API. `message` is the remote `error.message`
    /// when the body carried one, otherwise the status line.
    #[error("{message}")]
    Upstream { status: u16, message: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Caller input rejected before any outbound call.
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("HTTP request failed: {0}")]
    Transport(String),
}

impl From<dataverse_auth::Error> for Error {
    fn from(e: dataverse_auth::Error) -> Self {
        Error::Authentication(e.to_string())
    }
}

/// Result alias for Dataverse operations.
pub type Result<T> = std::result::Result<T, Error>;
