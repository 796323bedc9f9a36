use reqwest::header::{AUTHORIZATION, RETRY_AFTER, USER_AGENT};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::error::{ApiError, ApiErrorDetails, ApiErrorResponse};
use super::throttle::{RequestStats, RequestThrottle};
use super::ApiQueryParams;

pub const DEFAULT_BASE_URL: &str = "https://api.meraki.com";
const API_PREFIX: &str = "/api/v1";
const CLIENT_USER_AGENT: &str = concat!("terraform-provider-meraki/", env!("CARGO_PKG_VERSION"));

/// Meraki Dashboard API client
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http_client: reqwest::Client,
    base_url: String,
    auth_header: String,
    retry_config: RetryConfig,
    throttle: RequestThrottle,
    debug: AtomicBool,
}

#[derive(Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub timeout_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 10000,
            timeout_seconds: 30,
        }
    }
}

impl Client {
    /// Create a new API client with default configuration
    pub fn new(base_url: &str, api_key: &str, requests_per_second: u32) -> Result<Self, ApiError> {
        Self::with_config(base_url, api_key, requests_per_second, RetryConfig::default())
    }

    /// Create a new API client with custom retry configuration
    pub fn with_config(
        base_url: &str,
        api_key: &str,
        requests_per_second: u32,
        retry_config: RetryConfig,
    ) -> Result<Self, ApiError> {
        let parsed = url::Url::parse(base_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ApiError::InvalidUrl(format!(
                "{}: scheme must be http or https",
                base_url
            )));
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(retry_config.timeout_seconds))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        // accept both "https://api.meraki.com" and "https://api.meraki.com/api/v1"
        let base_url = base_url.trim_end_matches('/');
        let base_url = base_url.strip_suffix(API_PREFIX).unwrap_or(base_url);

        Ok(Self {
            inner: Arc::new(ClientInner {
                http_client,
                base_url: format!("{}{}", base_url, API_PREFIX),
                auth_header: format!("Bearer {}", api_key),
                retry_config,
                throttle: RequestThrottle::new(requests_per_second),
                debug: AtomicBool::new(false),
            }),
        })
    }

    /// Log request and response bodies
    pub fn set_debug(&self, enabled: bool) {
        self.inner.debug.store(enabled, Ordering::Relaxed);
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub async fn stats(&self) -> RequestStats {
        self.inner.throttle.stats().await
    }

    /// Execute a GET request with retry logic
    pub async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.execute_with_retry("GET", path, |url| {
            self.authorized(self.inner.http_client.get(url))
        })
        .await
    }

    /// Execute a GET request with query parameters
    pub async fn get_with_query(
        &self,
        path: &str,
        params: &ApiQueryParams,
    ) -> Result<Value, ApiError> {
        let full_path = format!("{}{}", path, params.to_query_string());
        self.get(&full_path).await
    }

    /// Execute a POST request with retry logic
    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.log_body("POST", path, body);
        self.execute_with_retry("POST", path, |url| {
            self.authorized(self.inner.http_client.post(url)).json(body)
        })
        .await
    }

    /// Execute a PUT request with retry logic
    pub async fn put(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.log_body("PUT", path, body);
        self.execute_with_retry("PUT", path, |url| {
            self.authorized(self.inner.http_client.put(url)).json(body)
        })
        .await
    }

    /// Execute a DELETE request with retry logic
    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.execute_with_retry("DELETE", path, |url| {
            self.authorized(self.inner.http_client.delete(url))
        })
        .await
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header(AUTHORIZATION, &self.inner.auth_header)
            .header(USER_AGENT, CLIENT_USER_AGENT)
    }

    fn log_body(&self, method: &str, path: &str, body: &Value) {
        if self.inner.debug.load(Ordering::Relaxed) {
            tracing::debug!("{} {} request body: {}", method, path, body);
        }
    }

    /// Execute request with retry logic. Retries 429 (honouring
    /// Retry-After), 5xx and connection failures with exponential backoff.
    async fn execute_with_retry<F>(
        &self,
        method: &str,
        path: &str,
        request_fn: F,
    ) -> Result<Value, ApiError>
    where
        F: Fn(&str) -> reqwest::RequestBuilder,
    {
        let url = format!("{}{}", self.inner.base_url, path);
        let retry_config = &self.inner.retry_config;
        let mut attempt = 0;
        let mut last_error = None;
        let mut retry_after_ms = None;

        while attempt <= retry_config.max_retries {
            if attempt > 0 {
                let backoff = retry_after_ms
                    .take()
                    .unwrap_or_else(|| {
                        retry_config.initial_backoff_ms * 2_u64.pow(attempt - 1)
                    })
                    .min(retry_config.max_backoff_ms);
                tracing::warn!(
                    "Retrying {} {} after {}ms (attempt {})",
                    method,
                    path,
                    backoff,
                    attempt
                );
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            self.inner.throttle.acquire().await;
            tracing::debug!("{} request to: {}", method, url);

            match request_fn(&url).send().await {
                Ok(response) => {
                    let status = response.status();
                    tracing::debug!("Response status: {}", status);

                    if status.is_success() {
                        self.inner.throttle.record_request(true).await;
                        return self.parse_success_response(response).await;
                    }

                    self.inner.throttle.record_request(false).await;

                    if status == reqwest::StatusCode::UNAUTHORIZED {
                        return Err(ApiError::AuthError);
                    }

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        retry_after_ms = response
                            .headers()
                            .get(RETRY_AFTER)
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.trim().parse::<u64>().ok())
                            .map(|secs| secs.saturating_mul(1000));
                        last_error = Some(ApiError::RateLimited);
                    } else if status.is_server_error() {
                        last_error = Some(ApiError::ServiceUnavailable);
                    } else {
                        return self.handle_error_response(response).await;
                    }
                }
                Err(e) => {
                    self.inner.throttle.record_request(false).await;

                    if e.is_timeout() {
                        last_error = Some(ApiError::Timeout(retry_config.timeout_seconds));
                    } else if e.is_connect() {
                        last_error = Some(ApiError::ServiceUnavailable);
                    } else {
                        return Err(ApiError::RequestError(e));
                    }
                }
            }

            attempt += 1;
        }

        Err(last_error.unwrap_or(ApiError::ServiceUnavailable))
    }

    /// Parse successful response; empty bodies (204, DELETE) are null
    async fn parse_success_response(&self, response: reqwest::Response) -> Result<Value, ApiError> {
        let text = response.text().await?;
        if self.inner.debug.load(Ordering::Relaxed) {
            tracing::debug!("API response body: {}", text);
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text).map_err(|e| {
            tracing::error!("Failed to deserialize response: {}, body: {}", e, text);
            ApiError::ParseError(format!("Failed to parse response: {}", e))
        })
    }

    /// Handle error response
    async fn handle_error_response<T>(&self, response: reqwest::Response) -> Result<T, ApiError> {
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        let details = serde_json::from_str::<ApiErrorResponse>(&text)
            .ok()
            .filter(|parsed| !parsed.errors.is_empty())
            .map(|parsed| {
                Box::new(ApiErrorDetails {
                    errors: parsed.errors,
                })
            });

        let message = match &details {
            Some(details) => details.errors.join("; "),
            None => text,
        };

        Err(ApiError::ApiError {
            status,
            message,
            details,
        })
    }
}
