//! Data-client errors.

use crate::schema::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The payload failed its entity contract; nothing was sent.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The data API rejected the request's credentials.
    #[error("unauthorized: status {status}")]
    Unauthorized { status: u16, body: String },

    /// The HTTP request failed before a response arrived.
    #[error("data API request failed: {0}")]
    Request(String),

    /// The data API returned a non-success status.
    #[error("data API response error: status {status}")]
    Response { status: u16, body: String },

    /// The response body did not have the expected shape.
    #[error("data API response parse failed: {0}")]
    Parse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl ClientError {
    /// Stable machine-readable code.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "E_VALIDATION",
            Self::Unauthorized { .. } => "E_UNAUTHORIZED",
            Self::Request(_) => "E_REQUEST",
            Self::Response { .. } => "E_RESPONSE",
            Self::Parse(_) => "E_PARSE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    /// Whether retrying the same request may succeed.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Response { status: 429 | 500..=599, .. })
    }
}
