//! Generic data source driven by a [`DataSourceDescriptor`]
//!
//! A lookup fills `item` when the selector argument is set and the
//! descriptor has an item path; otherwise it lists into `items`.

use crate::api::{ApiQueryParams, Client};
use crate::convert::api_to_state;
use crate::endpoint::{render_path, DataSourceDescriptor};
use crate::MerakiProviderData;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use tfplug::context::Context;
use tfplug::data_source::{
    ConfigureDataSourceRequest, ConfigureDataSourceResponse, DataSource,
    DataSourceMetadataRequest, DataSourceMetadataResponse, DataSourceSchemaRequest,
    DataSourceSchemaResponse, DataSourceWithConfigure, ReadDataSourceRequest,
    ReadDataSourceResponse, ValidateDataSourceConfigRequest, ValidateDataSourceConfigResponse,
};
use tfplug::reconcile::merge_for_read;
use tfplug::types::{Diagnostic, Dynamic, DynamicValue};
use tracing::{debug, warn};

pub struct EndpointDataSource {
    descriptor: &'static DataSourceDescriptor,
    provider_data: Option<MerakiProviderData>,
}

impl EndpointDataSource {
    pub fn new(descriptor: &'static DataSourceDescriptor) -> Self {
        Self {
            descriptor,
            provider_data: None,
        }
    }

    fn item_lookup(&self, config: &Dynamic) -> Option<&'static str> {
        let selector = self.descriptor.selector?;
        let item_path = self.descriptor.item_path?;
        match config.get(selector) {
            Some(value) if !value.is_null() => Some(item_path),
            _ => None,
        }
    }

    fn query(&self, config: &Dynamic) -> ApiQueryParams {
        self.descriptor
            .query_params()
            .fold(ApiQueryParams::new(), |params, param| {
                params.add_optional(param.api_name, config.get(param.name).and_then(query_value))
            })
    }

    async fn fetch(&self, client: &Client, config: &Dynamic) -> Result<Dynamic, Diagnostic> {
        let path_error = |e: crate::endpoint::PathError| {
            Diagnostic::error(
                format!("Unable to build request path for {}", self.descriptor.type_name),
                e.to_string(),
            )
        };
        let api_error = |e: crate::api::ApiError| {
            Diagnostic::error(
                format!("Failed to read {}", self.descriptor.type_name),
                format!("API error: {}", e),
            )
        };

        let mut fresh = BTreeMap::new();

        if let Some(item_path) = self.item_lookup(config) {
            let path = render_path(item_path, config).map_err(path_error)?;
            debug!(type_name = self.descriptor.type_name, %path, "looking up item");
            let body = client.get(&path).await.map_err(api_error)?;

            fresh.insert(
                "item".to_string(),
                api_to_state(self.descriptor.attributes, &body),
            );
            fresh.insert("items".to_string(), Dynamic::Null);
        } else if let Some(list_path) = self.descriptor.list_path {
            let path = render_path(list_path, config).map_err(path_error)?;
            let query = self.query(config);
            debug!(type_name = self.descriptor.type_name, %path, "listing items");
            let body = client.get_with_query(&path, &query).await.map_err(api_error)?;

            let items = match body {
                Value::Array(entries) => Dynamic::List(
                    entries
                        .iter()
                        .map(|entry| api_to_state(self.descriptor.attributes, entry))
                        .collect(),
                ),
                other => {
                    warn!(
                        type_name = self.descriptor.type_name,
                        "expected a JSON array from {}, got {}", path, other
                    );
                    Dynamic::Null
                }
            };
            fresh.insert("item".to_string(), Dynamic::Null);
            fresh.insert("items".to_string(), items);
        } else {
            return Err(Diagnostic::error(
                format!("Missing lookup argument for {}", self.descriptor.type_name),
                format!(
                    "{} must be set",
                    self.descriptor.selector.unwrap_or("a selector")
                ),
            ));
        }

        Ok(Dynamic::Map(fresh))
    }
}

fn query_value(value: &Dynamic) -> Option<String> {
    match value {
        Dynamic::String(s) => Some(s.clone()),
        Dynamic::Bool(b) => Some(b.to_string()),
        Dynamic::Number(n) if n.fract() == 0.0 => Some(format!("{}", *n as i64)),
        Dynamic::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl DataSource for EndpointDataSource {
    fn type_name(&self) -> &str {
        self.descriptor.type_name
    }

    async fn metadata(
        &self,
        _ctx: Context,
        _request: DataSourceMetadataRequest,
    ) -> DataSourceMetadataResponse {
        DataSourceMetadataResponse {
            type_name: self.type_name().to_string(),
        }
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: DataSourceSchemaRequest,
    ) -> DataSourceSchemaResponse {
        DataSourceSchemaResponse {
            schema: self.descriptor.schema(),
            diagnostics: vec![],
        }
    }

    async fn validate(
        &self,
        _ctx: Context,
        request: ValidateDataSourceConfigRequest,
    ) -> ValidateDataSourceConfigResponse {
        let mut diagnostics = vec![];

        // item-only lookups have nothing to list without the selector
        if self.descriptor.list_path.is_none() {
            if let Some(selector) = self.descriptor.selector {
                if request.config.value.get(selector).map_or(true, Dynamic::is_null) {
                    diagnostics.push(Diagnostic::error(
                        format!("Missing lookup argument for {}", self.descriptor.type_name),
                        format!("{} must be set", selector),
                    ));
                }
            }
        }

        ValidateDataSourceConfigResponse { diagnostics }
    }

    async fn read(&self, _ctx: Context, request: ReadDataSourceRequest) -> ReadDataSourceResponse {
        let config = request.config.value;

        let client = match &self.provider_data {
            Some(data) => data.client.as_ref(),
            None => {
                return ReadDataSourceResponse {
                    state: DynamicValue::new(config),
                    diagnostics: vec![Diagnostic::error(
                        "Provider not configured",
                        "Provider data was not properly configured",
                    )],
                }
            }
        };

        match self.fetch(client, &config).await {
            Ok(fresh) => ReadDataSourceResponse {
                state: DynamicValue::new(merge_for_read(
                    &config,
                    &fresh,
                    &self.descriptor.shape(),
                )),
                diagnostics: vec![],
            },
            Err(diagnostic) => ReadDataSourceResponse {
                state: DynamicValue::new(config),
                diagnostics: vec![diagnostic],
            },
        }
    }
}

#[async_trait]
impl DataSourceWithConfigure for EndpointDataSource {
    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureDataSourceRequest,
    ) -> ConfigureDataSourceResponse {
        let mut diagnostics = vec![];

        if let Some(data) = request.provider_data {
            if let Some(provider_data) = data.downcast_ref::<MerakiProviderData>() {
                self.provider_data = Some(provider_data.clone());
            } else {
                diagnostics.push(Diagnostic::error(
                    "Invalid provider data",
                    "Failed to extract MerakiProviderData from provider data",
                ));
            }
        } else {
            diagnostics.push(Diagnostic::error(
                "No provider data",
                "No provider data was provided to the data source",
            ));
        }

        ConfigureDataSourceResponse { diagnostics }
    }
}
