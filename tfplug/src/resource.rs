//! Resource trait and related types
//!
//! This module defines the Resource trait and the configure extension that
//! every resource created by a provider factory implements.

use crate::context::Context;
use crate::schema::Schema;
use crate::types::{Diagnostic, DynamicValue};
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

/// Base trait for resources - implement CRUD operations
/// Type name should be constant and match the key in Provider::resources()
#[async_trait]
pub trait Resource: Send + Sync {
    /// Type name should be constant (e.g., "meraki_networks")
    fn type_name(&self) -> &str;

    async fn metadata(
        &self,
        ctx: Context,
        request: ResourceMetadataRequest,
    ) -> ResourceMetadataResponse;

    async fn schema(&self, ctx: Context, request: ResourceSchemaRequest) -> ResourceSchemaResponse;

    /// Called during plan to validate configuration beyond the schema
    async fn validate(
        &self,
        ctx: Context,
        request: ValidateResourceConfigRequest,
    ) -> ValidateResourceConfigResponse;

    /// MUST populate all attributes in response.new_state (including computed)
    async fn create(&self, ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse;

    /// MUST return the current state, or None once the remote object is gone
    async fn read(&self, ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse;

    async fn update(&self, ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse;

    async fn delete(&self, ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse;

    /// Called during "terraform import"; the imported state is refreshed
    /// with read() afterwards
    async fn import_state(
        &self,
        _ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![Diagnostic::error(
                "Resource Import Not Implemented",
                format!("{} does not support import", request.type_name),
            )],
        }
    }
}

pub struct ResourceMetadataRequest;

pub struct ResourceMetadataResponse {
    pub type_name: String,
}

pub struct ResourceSchemaRequest;

pub struct ResourceSchemaResponse {
    pub schema: Schema,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ValidateResourceConfigRequest {
    pub type_name: String,
    pub config: DynamicValue,
}

pub struct ValidateResourceConfigResponse {
    pub diagnostics: Vec<Diagnostic>,
}

pub struct CreateResourceRequest {
    pub type_name: String,
    pub planned_state: DynamicValue,
    pub config: DynamicValue,
}

pub struct CreateResourceResponse {
    pub new_state: DynamicValue,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ReadResourceRequest {
    pub type_name: String,
    pub current_state: DynamicValue,
}

pub struct ReadResourceResponse {
    pub new_state: Option<DynamicValue>,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct UpdateResourceRequest {
    pub type_name: String,
    pub prior_state: DynamicValue,
    pub planned_state: DynamicValue,
    pub config: DynamicValue,
}

pub struct UpdateResourceResponse {
    pub new_state: DynamicValue,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct DeleteResourceRequest {
    pub type_name: String,
    pub prior_state: DynamicValue,
}

pub struct DeleteResourceResponse {
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ImportResourceStateRequest {
    pub type_name: String,
    pub id: String,
}

pub struct ImportResourceStateResponse {
    pub imported_resources: Vec<ImportedResource>,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ImportedResource {
    pub type_name: String,
    pub state: DynamicValue,
}

/// All resources must implement configure to receive provider data
/// This is called immediately after the factory creates the resource
#[async_trait]
pub trait ResourceWithConfigure: Resource {
    async fn configure(
        &mut self,
        ctx: Context,
        request: ConfigureResourceRequest,
    ) -> ConfigureResourceResponse;
}

pub struct ConfigureResourceRequest {
    /// Data from ConfigureProviderResponse.provider_data
    /// Downcast to your provider's specific type
    pub provider_data: Option<Arc<dyn Any + Send + Sync>>,
}

pub struct ConfigureResourceResponse {
    pub diagnostics: Vec<Diagnostic>,
}
