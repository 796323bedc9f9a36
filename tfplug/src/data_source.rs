//! Data source traits
//!
//! A data source only reads. The server builds a fresh instance per call
//! from the provider's factory, configures it with the provider data and
//! then runs `validate` or `read`; nothing is kept between calls.

use crate::context::Context;
use crate::schema::Schema;
use crate::types::{Diagnostic, DynamicValue};
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

/// Read-only view of remote objects, addressed by its config arguments
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fixed name such as "meraki_organizations"; the server looks factories
    /// up by this key in Provider::data_sources()
    fn type_name(&self) -> &str;

    async fn metadata(
        &self,
        ctx: Context,
        request: DataSourceMetadataRequest,
    ) -> DataSourceMetadataResponse;

    async fn schema(
        &self,
        ctx: Context,
        request: DataSourceSchemaRequest,
    ) -> DataSourceSchemaResponse;

    /// Cross-field checks; per-attribute validators already ran
    async fn validate(
        &self,
        ctx: Context,
        request: ValidateDataSourceConfigRequest,
    ) -> ValidateDataSourceConfigResponse;

    /// Returns the config arguments merged with what the API reported.
    /// Unknown values in the state are nulled by the server.
    async fn read(&self, ctx: Context, request: ReadDataSourceRequest) -> ReadDataSourceResponse;
}

pub struct DataSourceMetadataRequest;

pub struct DataSourceMetadataResponse {
    pub type_name: String,
}

pub struct DataSourceSchemaRequest;

pub struct DataSourceSchemaResponse {
    pub schema: Schema,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ValidateDataSourceConfigRequest {
    pub type_name: String,
    pub config: DynamicValue,
}

pub struct ValidateDataSourceConfigResponse {
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ReadDataSourceRequest {
    pub type_name: String,
    pub config: DynamicValue,
}

pub struct ReadDataSourceResponse {
    pub state: DynamicValue,
    pub diagnostics: Vec<Diagnostic>,
}

/// Receives the `Arc` handed out by Provider::configure; implementations
/// downcast it to their own provider data type
#[async_trait]
pub trait DataSourceWithConfigure: DataSource {
    async fn configure(
        &mut self,
        ctx: Context,
        request: ConfigureDataSourceRequest,
    ) -> ConfigureDataSourceResponse;
}

pub struct ConfigureDataSourceRequest {
    pub provider_data: Option<Arc<dyn Any + Send + Sync>>,
}

pub struct ConfigureDataSourceResponse {
    pub diagnostics: Vec<Diagnostic>,
}
