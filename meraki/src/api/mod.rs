//! Meraki Dashboard REST API client

mod client;
mod error;
mod throttle;

pub use client::{Client, RetryConfig, DEFAULT_BASE_URL};
pub use error::{ApiError, ApiErrorDetails};
pub use throttle::{RequestStats, RequestThrottle};

/// Query string builder; values are percent-encoded
#[derive(Debug, Clone, Default)]
pub struct ApiQueryParams {
    params: Vec<(String, String)>,
}

impl ApiQueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<K: Into<String>, V: ToString>(mut self, key: K, value: V) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    pub fn add_optional<K: Into<String>, V: ToString>(mut self, key: K, value: Option<V>) -> Self {
        if let Some(v) = value {
            self.params.push((key.into(), v.to_string()));
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn to_query_string(&self) -> String {
        if self.params.is_empty() {
            String::new()
        } else {
            format!(
                "?{}",
                self.params
                    .iter()
                    .map(|(k, v)| format!(
                        "{}={}",
                        urlencoding::encode(k),
                        urlencoding::encode(v)
                    ))
                    .collect::<Vec<_>>()
                    .join("&")
            )
        }
    }
}
