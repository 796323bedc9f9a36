//! Provider trait
//!
//! A provider owns its configuration and hands factories for its resources
//! and data sources to the server. Instances are created per request and
//! configured with the provider data returned from `configure`.

use crate::context::Context;
use crate::data_source::DataSourceWithConfigure;
use crate::resource::ResourceWithConfigure;
use crate::schema::Schema;
use crate::types::{Diagnostic, DynamicValue};
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

pub type ResourceFactory = Box<dyn Fn() -> Box<dyn ResourceWithConfigure> + Send + Sync>;
pub type DataSourceFactory = Box<dyn Fn() -> Box<dyn DataSourceWithConfigure> + Send + Sync>;

#[async_trait]
pub trait Provider: Send + Sync {
    /// Prefix shared by every resource type name (e.g., "meraki")
    fn type_name(&self) -> &str;

    async fn metadata(
        &self,
        ctx: Context,
        request: ProviderMetadataRequest,
    ) -> ProviderMetadataResponse;

    async fn schema(&self, ctx: Context, request: ProviderSchemaRequest) -> ProviderSchemaResponse;

    /// Validate configuration and build the data shared with resources
    async fn configure(
        &mut self,
        ctx: Context,
        request: ConfigureProviderRequest,
    ) -> ConfigureProviderResponse;

    fn resources(&self) -> HashMap<String, ResourceFactory>;

    fn data_sources(&self) -> HashMap<String, DataSourceFactory>;
}

pub struct ProviderMetadataRequest;

pub struct ProviderMetadataResponse {
    pub type_name: String,
}

pub struct ProviderSchemaRequest;

pub struct ProviderSchemaResponse {
    pub schema: Schema,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ConfigureProviderRequest {
    pub terraform_version: String,
    pub config: DynamicValue,
}

pub struct ConfigureProviderResponse {
    pub diagnostics: Vec<Diagnostic>,
    /// Passed to every resource and data source configure call
    pub provider_data: Option<Arc<dyn Any + Send + Sync>>,
}
