//! Generic resource driven by a [`ResourceDescriptor`]

use crate::api::{ApiError, Client};
use crate::convert::{api_to_state, state_to_body};
use crate::endpoint::{render_path, ApiKind, ResourceDescriptor, ResourceKind};
use crate::MerakiProviderData;
use async_trait::async_trait;
use serde_json::Value;
use tfplug::context::Context;
use tfplug::reconcile::{merge_for_read, merge_for_write};
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, ReadResourceRequest,
    ReadResourceResponse, Resource, ResourceMetadataRequest, ResourceMetadataResponse,
    ResourceSchemaRequest, ResourceSchemaResponse, ResourceWithConfigure, UpdateResourceRequest,
    UpdateResourceResponse, ValidateResourceConfigRequest, ValidateResourceConfigResponse,
};
use tfplug::import_state_composite_id;
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use tracing::{debug, warn};

pub struct EndpointResource {
    descriptor: &'static ResourceDescriptor,
    provider_data: Option<MerakiProviderData>,
}

impl EndpointResource {
    pub fn new(descriptor: &'static ResourceDescriptor) -> Self {
        Self {
            descriptor,
            provider_data: None,
        }
    }

    fn client(&self) -> Result<&Client, Diagnostic> {
        self.provider_data
            .as_ref()
            .map(|data| data.client.as_ref())
            .ok_or_else(|| {
                Diagnostic::error(
                    "Provider not configured",
                    "Provider data was not properly configured",
                )
            })
    }

    fn decode(&self, mut body: Value) -> Dynamic {
        if let Some(filter) = self.descriptor.response_filter {
            filter(&mut body);
        }
        api_to_state(self.descriptor.attributes, &body)
    }

    fn path(&self, template: &str, state: &Dynamic) -> Result<String, Diagnostic> {
        render_path(template, state).map_err(|e| {
            Diagnostic::error(
                format!("Unable to build request path for {}", self.descriptor.type_name),
                e.to_string(),
            )
        })
    }

    fn api_failure(&self, action: &str, e: ApiError) -> Diagnostic {
        Diagnostic::error(
            format!("Failed to {} {}", action, self.descriptor.type_name),
            format!("API error: {}", e),
        )
    }

    async fn create_remote(&self, planned: &Dynamic) -> Result<Dynamic, Diagnostic> {
        let client = self.client()?;
        let body = state_to_body(
            self.descriptor.attributes,
            planned,
            &self.descriptor.create_exclusions(),
        );

        let response = match self.descriptor.kind {
            ResourceKind::Collection { create_path, .. } => {
                let path = self.path(create_path, planned)?;
                debug!(type_name = self.descriptor.type_name, %path, "creating object");
                client.post(&path, &body).await
            }
            ResourceKind::Settings => {
                let path = self.path(self.descriptor.item_path, planned)?;
                debug!(type_name = self.descriptor.type_name, %path, "applying settings");
                client.put(&path, &body).await
            }
        }
        .map_err(|e| self.api_failure("create", e))?;

        let state = merge_for_write(planned, &self.decode(response), &self.descriptor.shape());

        if let ResourceKind::Collection { id_attribute, .. } = self.descriptor.kind {
            if state.get(id_attribute).map_or(true, Dynamic::is_null) {
                return Err(Diagnostic::error(
                    format!("Failed to create {}", self.descriptor.type_name),
                    format!("The API response did not include {}", id_attribute),
                ));
            }
        }

        Ok(state)
    }

    async fn update_remote(&self, planned: &Dynamic) -> Result<Dynamic, Diagnostic> {
        let client = self.client()?;
        let path = self.path(self.descriptor.item_path, planned)?;
        let body = state_to_body(
            self.descriptor.attributes,
            planned,
            &self.descriptor.update_exclusions(),
        );

        debug!(type_name = self.descriptor.type_name, %path, "updating object");
        let response = client
            .put(&path, &body)
            .await
            .map_err(|e| self.api_failure("update", e))?;

        Ok(merge_for_write(
            planned,
            &self.decode(response),
            &self.descriptor.shape(),
        ))
    }

    /// Import identifiers arrive as strings; numeric and boolean path
    /// attributes are converted to their schema type
    fn coerce_imported(&self, state: &mut Dynamic, diagnostics: &mut Vec<Diagnostic>) {
        let Dynamic::Map(fields) = state else {
            return;
        };

        for (name, value) in fields.iter_mut() {
            let Some(attr) = self.descriptor.attribute(name) else {
                continue;
            };
            let Dynamic::String(raw) = &*value else {
                continue;
            };
            let raw = raw.clone();
            let coerced = match attr.kind {
                ApiKind::Number => raw.parse::<f64>().ok().map(Dynamic::Number),
                ApiKind::Bool => raw.parse::<bool>().ok().map(Dynamic::Bool),
                _ => continue,
            };
            match coerced {
                Some(coerced) => *value = coerced,
                None => diagnostics.push(
                    Diagnostic::error(
                        "Unexpected Import Identifier",
                        format!("'{}' is not a valid value for {}", raw, name),
                    )
                    .with_attribute(AttributePath::new(name)),
                ),
            }
        }
    }
}

#[async_trait]
impl Resource for EndpointResource {
    fn type_name(&self) -> &str {
        self.descriptor.type_name
    }

    async fn metadata(
        &self,
        _ctx: Context,
        _request: ResourceMetadataRequest,
    ) -> ResourceMetadataResponse {
        ResourceMetadataResponse {
            type_name: self.type_name().to_string(),
        }
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: ResourceSchemaRequest,
    ) -> ResourceSchemaResponse {
        ResourceSchemaResponse {
            schema: self.descriptor.schema(),
            diagnostics: vec![],
        }
    }

    async fn validate(
        &self,
        _ctx: Context,
        _request: ValidateResourceConfigRequest,
    ) -> ValidateResourceConfigResponse {
        ValidateResourceConfigResponse {
            diagnostics: vec![],
        }
    }

    async fn create(&self, _ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        match self.create_remote(&request.planned_state.value).await {
            Ok(state) => CreateResourceResponse {
                new_state: DynamicValue::new(state),
                diagnostics: vec![],
            },
            // nothing is committed when creation fails
            Err(diagnostic) => CreateResourceResponse {
                new_state: DynamicValue::null(),
                diagnostics: vec![diagnostic],
            },
        }
    }

    async fn read(&self, _ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
        let current = request.current_state.value;

        let client = match self.client() {
            Ok(client) => client,
            Err(diagnostic) => {
                return ReadResourceResponse {
                    new_state: Some(DynamicValue::new(current)),
                    diagnostics: vec![diagnostic],
                }
            }
        };

        let path = match self.path(self.descriptor.item_path, &current) {
            Ok(path) => path,
            Err(diagnostic) => {
                return ReadResourceResponse {
                    new_state: Some(DynamicValue::new(current)),
                    diagnostics: vec![diagnostic],
                }
            }
        };

        debug!(type_name = self.descriptor.type_name, %path, "reading object");
        match client.get(&path).await {
            Ok(body) => {
                let fresh = self.decode(body);
                ReadResourceResponse {
                    new_state: Some(DynamicValue::new(merge_for_read(
                        &current,
                        &fresh,
                        &self.descriptor.shape(),
                    ))),
                    diagnostics: vec![],
                }
            }
            Err(e) if e.is_not_found() => {
                warn!(
                    type_name = self.descriptor.type_name,
                    %path,
                    "object no longer exists, removing from state"
                );
                ReadResourceResponse {
                    new_state: None,
                    diagnostics: vec![],
                }
            }
            Err(e) => ReadResourceResponse {
                new_state: Some(DynamicValue::new(current)),
                diagnostics: vec![self.api_failure("read", e)],
            },
        }
    }

    async fn update(&self, _ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        match self.update_remote(&request.planned_state.value).await {
            Ok(state) => UpdateResourceResponse {
                new_state: DynamicValue::new(state),
                diagnostics: vec![],
            },
            Err(diagnostic) => UpdateResourceResponse {
                new_state: request.prior_state,
                diagnostics: vec![diagnostic],
            },
        }
    }

    async fn delete(&self, _ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse {
        if self.descriptor.kind == ResourceKind::Settings {
            warn!(
                type_name = self.descriptor.type_name,
                "settings cannot be deleted, removing from state only"
            );
            return DeleteResourceResponse {
                diagnostics: vec![Diagnostic::warning(
                    "Resource removed from state only",
                    format!(
                        "{} manages settings that always exist; the Dashboard configuration was left unchanged",
                        self.descriptor.type_name
                    ),
                )],
            };
        }

        let client = match self.client() {
            Ok(client) => client,
            Err(diagnostic) => {
                return DeleteResourceResponse {
                    diagnostics: vec![diagnostic],
                }
            }
        };
        let path = match self.path(self.descriptor.item_path, &request.prior_state.value) {
            Ok(path) => path,
            Err(diagnostic) => {
                return DeleteResourceResponse {
                    diagnostics: vec![diagnostic],
                }
            }
        };

        debug!(type_name = self.descriptor.type_name, %path, "deleting object");
        let diagnostics = match client.delete(&path).await {
            Ok(_) => vec![],
            Err(e) if e.is_not_found() => {
                debug!(%path, "object already deleted");
                vec![]
            }
            Err(e) => vec![self.api_failure("delete", e)],
        };

        DeleteResourceResponse { diagnostics }
    }

    async fn import_state(
        &self,
        ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        let mut response = ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
        };

        import_state_composite_id(
            &ctx,
            self.descriptor.import_attributes,
            &request,
            &mut response,
        );

        for imported in &mut response.imported_resources {
            self.coerce_imported(&mut imported.state.value, &mut response.diagnostics);
        }
        if response.diagnostics.iter().any(Diagnostic::is_error) {
            response.imported_resources.clear();
        }

        response
    }
}

#[async_trait]
impl ResourceWithConfigure for EndpointResource {
    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureResourceRequest,
    ) -> ConfigureResourceResponse {
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
                "No provider data was provided to the resource",
            ));
        }

        ConfigureResourceResponse { diagnostics }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use std::sync::Arc;

    fn state(pairs: &[(&str, Dynamic)]) -> DynamicValue {
        DynamicValue::new(Dynamic::Map(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        ))
    }

    async fn configured(descriptor: &'static ResourceDescriptor, url: &str) -> EndpointResource {
        let client = Client::new(url, "test-key", 0).unwrap();
        let mut resource = EndpointResource::new(descriptor);
        let response = resource
            .configure(
                Context::new(),
                ConfigureResourceRequest {
                    provider_data: Some(Arc::new(MerakiProviderData::new(client))),
                },
            )
            .await;
        assert!(response.diagnostics.is_empty());
        resource
    }

    #[tokio::test]
    async fn configure_rejects_foreign_provider_data() {
        let mut resource = EndpointResource::new(&catalog::NETWORK);

        let response = resource
            .configure(
                Context::new(),
                ConfigureResourceRequest {
                    provider_data: Some(Arc::new("not provider data".to_string())),
                },
            )
            .await;
        assert_eq!(response.diagnostics[0].summary, "Invalid provider data");

        let response = resource
            .configure(
                Context::new(),
                ConfigureResourceRequest {
                    provider_data: None,
                },
            )
            .await;
        assert_eq!(response.diagnostics[0].summary, "No provider data");
    }

    #[tokio::test]
    async fn unconfigured_create_reports_and_commits_nothing() {
        let resource = EndpointResource::new(&catalog::NETWORK);

        let response = resource
            .create(
                Context::new(),
                CreateResourceRequest {
                    type_name: "meraki_networks".to_string(),
                    planned_state: state(&[("name", Dynamic::from("HQ"))]),
                    config: state(&[("name", Dynamic::from("HQ"))]),
                },
            )
            .await;

        assert!(response.new_state.is_null());
        assert_eq!(response.diagnostics[0].summary, "Provider not configured");
    }

    #[tokio::test]
    async fn import_splits_and_coerces_identifier() {
        let resource = EndpointResource::new(&catalog::WIRELESS_SSID);

        let response = resource
            .import_state(
                Context::new(),
                ImportResourceStateRequest {
                    type_name: "meraki_networks_wireless_ssids".to_string(),
                    id: "N_24329156, 3".to_string(),
                },
            )
            .await;

        assert!(response.diagnostics.is_empty());
        let imported = &response.imported_resources[0].state.value;
        assert_eq!(imported.get("network_id"), Some(&Dynamic::from("N_24329156")));
        assert_eq!(imported.get("number"), Some(&Dynamic::Number(3.0)));
    }

    #[tokio::test]
    async fn import_rejects_non_numeric_number() {
        let resource = EndpointResource::new(&catalog::WIRELESS_SSID);

        let response = resource
            .import_state(
                Context::new(),
                ImportResourceStateRequest {
                    type_name: "meraki_networks_wireless_ssids".to_string(),
                    id: "N_1,guest".to_string(),
                },
            )
            .await;

        assert!(response.imported_resources.is_empty());
        assert_eq!(response.diagnostics[0].summary, "Unexpected Import Identifier");
    }

    #[tokio::test]
    async fn read_missing_object_removes_it() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/networks/N_gone")
            .with_status(404)
            .with_body(r#"{"errors":["Network not found"]}"#)
            .create_async()
            .await;

        let resource = configured(&catalog::NETWORK, &server.url()).await;
        let response = resource
            .read(
                Context::new(),
                ReadResourceRequest {
                    type_name: "meraki_networks".to_string(),
                    current_state: state(&[("network_id", Dynamic::from("N_gone"))]),
                },
            )
            .await;

        mock.assert_async().await;
        assert!(response.new_state.is_none());
        assert!(response.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn read_failure_keeps_current_state() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/networks/N_1")
            .with_status(400)
            .with_body(r#"{"errors":["Bad request"]}"#)
            .create_async()
            .await;

        let resource = configured(&catalog::NETWORK, &server.url()).await;
        let current = state(&[
            ("network_id", Dynamic::from("N_1")),
            ("name", Dynamic::from("HQ")),
        ]);
        let response = resource
            .read(
                Context::new(),
                ReadResourceRequest {
                    type_name: "meraki_networks".to_string(),
                    current_state: current.clone(),
                },
            )
            .await;

        assert_eq!(response.new_state, Some(current));
        assert_eq!(response.diagnostics[0].summary, "Failed to read meraki_networks");
        assert!(response.diagnostics[0].detail.contains("Bad request"));
    }

    #[tokio::test]
    async fn settings_delete_only_warns() {
        let resource = EndpointResource::new(&catalog::WIRELESS_SSID);

        let response = resource
            .delete(
                Context::new(),
                DeleteResourceRequest {
                    type_name: "meraki_networks_wireless_ssids".to_string(),
                    prior_state: state(&[
                        ("network_id", Dynamic::from("N_1")),
                        ("number", Dynamic::Number(0.0)),
                    ]),
                },
            )
            .await;

        assert_eq!(response.diagnostics.len(), 1);
        assert!(!response.diagnostics[0].is_error());
    }

    #[tokio::test]
    async fn create_without_identifier_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/organizations/O_1/networks")
            .with_status(201)
            .with_body(r#"{"name":"HQ"}"#)
            .create_async()
            .await;

        let resource = configured(&catalog::NETWORK, &server.url()).await;
        let planned = state(&[
            ("organization_id", Dynamic::from("O_1")),
            ("name", Dynamic::from("HQ")),
            ("network_id", Dynamic::Unknown),
        ]);
        let response = resource
            .create(
                Context::new(),
                CreateResourceRequest {
                    type_name: "meraki_networks".to_string(),
                    planned_state: planned.clone(),
                    config: planned,
                },
            )
            .await;

        assert!(response.new_state.is_null());
        assert!(response.diagnostics[0].detail.contains("network_id"));
    }
}
