pub mod api;
pub mod catalog;
pub mod config;
pub mod convert;
pub mod data_sources;
pub mod endpoint;
pub mod provider_data;
pub mod resources;

pub use provider_data::MerakiProviderData;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tfplug::context::Context;
use tfplug::data_source::DataSourceWithConfigure;
use tfplug::provider::{
    ConfigureProviderRequest, ConfigureProviderResponse, DataSourceFactory, Provider,
    ProviderMetadataRequest, ProviderMetadataResponse, ProviderSchemaRequest,
    ProviderSchemaResponse, ResourceFactory,
};
use tfplug::resource::ResourceWithConfigure;
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
use tfplug::types::Diagnostic;

use config::ProviderConfig;
use data_sources::EndpointDataSource;
use resources::EndpointResource;

#[derive(Default)]
pub struct MerakiProvider {
    provider_data: Option<MerakiProviderData>,
}

impl MerakiProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Provider for MerakiProvider {
    fn type_name(&self) -> &str {
        "meraki"
    }

    async fn metadata(
        &self,
        _ctx: Context,
        _request: ProviderMetadataRequest,
    ) -> ProviderMetadataResponse {
        ProviderMetadataResponse {
            type_name: self.type_name().to_string(),
        }
    }

    async fn schema(&self, _ctx: Context, _request: ProviderSchemaRequest) -> ProviderSchemaResponse {
        let schema = SchemaBuilder::new()
            .version(0)
            .description("Cisco Meraki Dashboard API provider")
            .attribute(
                AttributeBuilder::new("meraki_dashboard_api_key", AttributeType::String)
                    .description("Dashboard API key; defaults to MERAKI_DASHBOARD_API_KEY")
                    .optional()
                    .sensitive()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("meraki_base_url", AttributeType::String)
                    .description("Dashboard API base URL; defaults to MERAKI_BASE_URL or https://api.meraki.com")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("meraki_debug", AttributeType::Bool)
                    .description("Log request and response bodies; defaults to MERAKI_DEBUG")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("meraki_requests_per_second", AttributeType::Number)
                    .description("Client-side rate limit, 0 to disable; defaults to MERAKI_REQUESTS_PER_SECOND or 10")
                    .optional()
                    .build(),
            )
            .build();

        ProviderSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureProviderRequest,
    ) -> ConfigureProviderResponse {
        let config = match ProviderConfig::resolve(&request.config) {
            Ok(config) => config,
            Err(diagnostics) => {
                return ConfigureProviderResponse {
                    diagnostics,
                    provider_data: None,
                }
            }
        };

        tracing::debug!(
            terraform_version = %request.terraform_version,
            config = ?config,
            "configuring provider"
        );

        match api::Client::new(&config.base_url, &config.api_key, config.requests_per_second) {
            Ok(client) => {
                client.set_debug(config.debug);
                let provider_data = MerakiProviderData::new(client);
                self.provider_data = Some(provider_data.clone());
                ConfigureProviderResponse {
                    diagnostics: vec![],
                    provider_data: Some(Arc::new(provider_data)),
                }
            }
            Err(e) => ConfigureProviderResponse {
                diagnostics: vec![Diagnostic::error(
                    format!("Failed to create API client: {}", e),
                    "Check meraki_base_url",
                )],
                provider_data: None,
            },
        }
    }

    fn resources(&self) -> HashMap<String, ResourceFactory> {
        catalog::resources()
            .into_iter()
            .map(|descriptor| {
                let factory: ResourceFactory = Box::new(move || {
                    Box::new(EndpointResource::new(descriptor)) as Box<dyn ResourceWithConfigure>
                });
                (descriptor.type_name.to_string(), factory)
            })
            .collect()
    }

    fn data_sources(&self) -> HashMap<String, DataSourceFactory> {
        catalog::data_sources()
            .into_iter()
            .map(|descriptor| {
                let factory: DataSourceFactory = Box::new(move || {
                    Box::new(EndpointDataSource::new(descriptor))
                        as Box<dyn DataSourceWithConfigure>
                });
                (descriptor.type_name.to_string(), factory)
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tfplug::types::DynamicValue;

    fn request(config: DynamicValue) -> ConfigureProviderRequest {
        ConfigureProviderRequest {
            terraform_version: "1.9.0".to_string(),
            config,
        }
    }

    fn clear_env() {
        std::env::remove_var("MERAKI_DASHBOARD_API_KEY");
        std::env::remove_var("MERAKI_BASE_URL");
        std::env::remove_var("MERAKI_DEBUG");
        std::env::remove_var("MERAKI_REQUESTS_PER_SECOND");
    }

    #[tokio::test]
    #[serial]
    async fn provider_configures_successfully_with_env_vars() {
        clear_env();
        std::env::set_var("MERAKI_DASHBOARD_API_KEY", "test-key");
        std::env::set_var("MERAKI_BASE_URL", "https://n1.meraki.com/api/v1");
        std::env::set_var("MERAKI_DEBUG", "true");

        let mut provider = MerakiProvider::new();
        let response = provider
            .configure(Context::new(), request(DynamicValue::object()))
            .await;

        assert!(response.diagnostics.is_empty());
        let data = response.provider_data.unwrap();
        let data = data.downcast_ref::<MerakiProviderData>().unwrap();
        assert_eq!(data.client.base_url(), "https://n1.meraki.com/api/v1");
        assert!(provider.provider_data.is_some());

        clear_env();
    }

    #[tokio::test]
    #[serial]
    async fn provider_configure_requires_api_key() {
        clear_env();

        let mut provider = MerakiProvider::new();
        let response = provider
            .configure(Context::new(), request(DynamicValue::object()))
            .await;

        assert!(response.provider_data.is_none());
        assert!(response.diagnostics[0]
            .summary
            .contains("meraki_dashboard_api_key is required"));
        assert!(provider.provider_data.is_none());
    }

    #[tokio::test]
    #[serial]
    async fn provider_configure_rejects_invalid_base_url() {
        clear_env();
        std::env::set_var("MERAKI_DASHBOARD_API_KEY", "test-key");
        std::env::set_var("MERAKI_BASE_URL", "ftp://api.meraki.com");

        let mut provider = MerakiProvider::new();
        let response = provider
            .configure(Context::new(), request(DynamicValue::object()))
            .await;

        assert!(response.provider_data.is_none());
        assert!(response.diagnostics[0]
            .summary
            .starts_with("Failed to create API client"));

        clear_env();
    }

    #[tokio::test]
    async fn provider_factories_cover_catalog() {
        let provider = MerakiProvider::new();

        let resources = provider.resources();
        assert_eq!(resources.len(), 4);
        for (name, factory) in &resources {
            assert_eq!(factory().type_name(), name);
        }

        let data_sources = provider.data_sources();
        assert!(data_sources.contains_key("meraki_organizations"));
        assert!(data_sources.contains_key("meraki_networks"));
        assert_eq!(
            data_sources["meraki_networks_wireless_ssids"]().type_name(),
            "meraki_networks_wireless_ssids"
        );
    }

    #[tokio::test]
    async fn provider_schema_marks_api_key_sensitive() {
        let provider = MerakiProvider::new();
        let response = provider
            .schema(Context::new(), ProviderSchemaRequest)
            .await;

        let api_key = response
            .schema
            .attribute("meraki_dashboard_api_key")
            .unwrap();
        assert!(api_key.sensitive);
        assert!(!api_key.required);
        assert_eq!(response.schema.attributes.len(), 4);
    }
}
