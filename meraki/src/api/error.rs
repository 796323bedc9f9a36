use serde::Deserialize;
use thiserror::Error;

/// Body of a Meraki error response: `{"errors": ["..."]}`
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorResponse {
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Error)]
#[error("API error details: errors={errors:?}")]
pub struct ApiErrorDetails {
    pub errors: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error (HTTP {status}): {message}")]
    ApiError {
        status: u16,
        message: String,
        #[source]
        details: Option<Box<ApiErrorDetails>>,
    },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Authentication failed")]
    AuthError,

    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    #[error("Too many requests, rate limited")]
    RateLimited,

    #[error("Service unavailable, retry later")]
    ServiceUnavailable,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// HTTP status behind the error, when the API answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::ApiError { status, .. } => Some(*status),
            ApiError::AuthError => Some(401),
            ApiError::RateLimited => Some(429),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}
