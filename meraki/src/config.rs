//! Provider configuration
//!
//! Each setting is taken from the provider block first, then from its
//! environment variable, then from the built-in default.

use crate::api::DEFAULT_BASE_URL;
use tfplug::types::Diagnostic;
use tfplug::DynamicValue;

pub const API_KEY_ENV: &str = "MERAKI_DASHBOARD_API_KEY";
pub const BASE_URL_ENV: &str = "MERAKI_BASE_URL";
pub const DEBUG_ENV: &str = "MERAKI_DEBUG";
pub const REQUESTS_PER_SECOND_ENV: &str = "MERAKI_REQUESTS_PER_SECOND";

pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 10;

#[derive(Clone, PartialEq)]
pub struct ProviderConfig {
    pub api_key: String,
    pub base_url: String,
    pub debug: bool,
    pub requests_per_second: u32,
}

// keeps the API key out of logs
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("debug", &self.debug)
            .field("requests_per_second", &self.requests_per_second)
            .finish()
    }
}

impl ProviderConfig {
    pub fn resolve(config: &DynamicValue) -> Result<Self, Vec<Diagnostic>> {
        let mut diagnostics = Vec::new();

        let api_key = config
            .value
            .get("meraki_dashboard_api_key")
            .and_then(|v| v.as_string())
            .filter(|s| !s.is_empty())
            .cloned()
            .or_else(|| env_value(API_KEY_ENV));
        if api_key.is_none() {
            diagnostics.push(Diagnostic::error(
                "meraki_dashboard_api_key is required (set in provider config or MERAKI_DASHBOARD_API_KEY env var)",
                "The Dashboard API key authenticates every request",
            ));
        }

        let base_url = config
            .value
            .get("meraki_base_url")
            .and_then(|v| v.as_string())
            .filter(|s| !s.is_empty())
            .cloned()
            .or_else(|| env_value(BASE_URL_ENV))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let debug = match config.value.get("meraki_debug").and_then(|v| v.as_bool()) {
            Some(debug) => debug,
            None => match env_value(DEBUG_ENV) {
                Some(raw) => raw.parse::<bool>().unwrap_or_else(|_| {
                    diagnostics.push(Diagnostic::error(
                        "Invalid MERAKI_DEBUG value",
                        format!("Expected true or false, got '{}'", raw),
                    ));
                    false
                }),
                None => false,
            },
        };

        let requests_per_second = match config
            .value
            .get("meraki_requests_per_second")
            .and_then(|v| v.as_number())
        {
            Some(n) if n >= 0.0 && n.fract() == 0.0 && n <= u32::MAX as f64 => n as u32,
            Some(n) => {
                diagnostics.push(Diagnostic::error(
                    "Invalid meraki_requests_per_second",
                    format!("Expected a non-negative whole number, got {}", n),
                ));
                DEFAULT_REQUESTS_PER_SECOND
            }
            None => match env_value(REQUESTS_PER_SECOND_ENV) {
                Some(raw) => raw.parse::<u32>().unwrap_or_else(|_| {
                    diagnostics.push(Diagnostic::error(
                        "Invalid MERAKI_REQUESTS_PER_SECOND value",
                        format!("Expected a non-negative whole number, got '{}'", raw),
                    ));
                    DEFAULT_REQUESTS_PER_SECOND
                }),
                None => DEFAULT_REQUESTS_PER_SECOND,
            },
        };

        match api_key {
            Some(api_key) if diagnostics.is_empty() => Ok(Self {
                api_key,
                base_url,
                debug,
                requests_per_second,
            }),
            _ => Err(diagnostics),
        }
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
