//! Default value providers for attributes
//!
//! Defaults are evaluated during planning for optional attributes that are
//! null in configuration. They run before plan modifiers.
//!
//! ```no_run
//! use tfplug::schema::{AttributeBuilder, AttributeType};
//! use tfplug::defaults::StaticDefault;
//!
//! let rps = AttributeBuilder::new("per_client_bandwidth_limit_up", AttributeType::Number)
//!     .optional()
//!     .computed()
//!     .default(StaticDefault::number(0.0))
//!     .build();
//! ```

use crate::types::{AttributePath, Dynamic};
use std::env;
use std::sync::Arc;

/// Request for default values
pub struct DefaultRequest {
    pub path: AttributePath,
}

/// Response with default value
pub struct DefaultResponse {
    pub value: Dynamic,
}

/// Default provides default values for optional attributes
pub trait Default: Send + Sync {
    fn description(&self) -> String;
    fn default_value(&self, request: DefaultRequest) -> DefaultResponse;
}

/// StaticDefault provides a static default value
pub struct StaticDefault {
    value: Dynamic,
}

impl StaticDefault {
    pub fn create(value: Dynamic) -> Arc<dyn Default> {
        Arc::new(Self { value })
    }

    pub fn string(value: &str) -> Arc<dyn Default> {
        Self::create(Dynamic::String(value.to_string()))
    }

    pub fn number(value: f64) -> Arc<dyn Default> {
        Self::create(Dynamic::Number(value))
    }

    pub fn bool(value: bool) -> Arc<dyn Default> {
        Self::create(Dynamic::Bool(value))
    }

    pub fn list(values: Vec<Dynamic>) -> Arc<dyn Default> {
        Self::create(Dynamic::List(values))
    }
}

impl Default for StaticDefault {
    fn description(&self) -> String {
        format!("static default value: {:?}", self.value)
    }

    fn default_value(&self, _request: DefaultRequest) -> DefaultResponse {
        DefaultResponse {
            value: self.value.clone(),
        }
    }
}

/// EnvDefault reads the default from an environment variable
pub struct EnvDefault {
    env_var: String,
    fallback: Option<String>,
}

impl EnvDefault {
    pub fn create(env_var: &str, fallback: &str) -> Arc<dyn Default> {
        Arc::new(Self {
            env_var: env_var.to_string(),
            fallback: Some(fallback.to_string()),
        })
    }

    /// Null when the variable is unset
    pub fn create_required(env_var: &str) -> Arc<dyn Default> {
        Arc::new(Self {
            env_var: env_var.to_string(),
            fallback: None,
        })
    }
}

impl Default for EnvDefault {
    fn description(&self) -> String {
        match &self.fallback {
            Some(fallback) => format!(
                "default from environment variable {} (fallback: {})",
                self.env_var, fallback
            ),
            None => format!("default from environment variable {}", self.env_var),
        }
    }

    fn default_value(&self, _request: DefaultRequest) -> DefaultResponse {
        let value = match env::var(&self.env_var) {
            Ok(val) => Dynamic::String(val),
            Err(_) => self
                .fallback
                .clone()
                .map(Dynamic::String)
                .unwrap_or(Dynamic::Null),
        };

        DefaultResponse { value }
    }
}
