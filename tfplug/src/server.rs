//! In-process provider server
//!
//! Drives a [`Provider`] through the same sequence of calls Terraform makes
//! over the plugin protocol: schema discovery, configuration, validation,
//! planning, apply, refresh, import and data source reads. Resource and data
//! source instances are created from the provider's factories for every
//! request and configured with the shared provider data, so no lock is held
//! around resource instances.

use crate::context::Context;
use crate::data_source::{
    ConfigureDataSourceRequest, DataSourceSchemaRequest, DataSourceWithConfigure,
    ReadDataSourceRequest, ReadDataSourceResponse, ValidateDataSourceConfigRequest,
    ValidateDataSourceConfigResponse,
};
use crate::defaults::DefaultRequest;
use crate::error::TfplugError;
use crate::plan_modifier::PlanModifyRequest;
use crate::provider::{
    ConfigureProviderRequest, DataSourceFactory, Provider, ProviderSchemaRequest, ResourceFactory,
};
use crate::resource::{
    ConfigureResourceRequest, CreateResourceRequest, DeleteResourceRequest,
    ImportResourceStateRequest, ImportResourceStateResponse, ReadResourceRequest,
    ReadResourceResponse, ResourceSchemaRequest, ResourceWithConfigure, UpdateResourceRequest,
    ValidateResourceConfigRequest, ValidateResourceConfigResponse,
};
use crate::schema::{Attribute, AttributeType, ObjectNestingMode, Schema};
use crate::types::{has_errors, AttributePath, Diagnostic, Dynamic, DynamicValue};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

type ProviderData = Option<Arc<dyn Any + Send + Sync>>;

pub struct ProviderServer<P: Provider> {
    provider: RwLock<P>,
    /// None until configure_provider succeeds
    provider_data: RwLock<Option<ProviderData>>,
    resources: HashMap<String, ResourceFactory>,
    data_sources: HashMap<String, DataSourceFactory>,
}

pub struct GetProviderSchemaResponse {
    pub provider: Schema,
    pub resource_schemas: HashMap<String, Schema>,
    pub data_source_schemas: HashMap<String, Schema>,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct PlanResourceChangeRequest {
    pub type_name: String,
    pub prior_state: DynamicValue,
    pub proposed_new_state: DynamicValue,
    pub config: DynamicValue,
}

pub struct PlanResourceChangeResponse {
    pub planned_state: DynamicValue,
    pub requires_replace: Vec<AttributePath>,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ApplyResourceChangeRequest {
    pub type_name: String,
    pub prior_state: DynamicValue,
    pub planned_state: DynamicValue,
    pub config: DynamicValue,
}

pub struct ApplyResourceChangeResponse {
    pub new_state: DynamicValue,
    pub diagnostics: Vec<Diagnostic>,
}

impl<P: Provider> ProviderServer<P> {
    pub fn new(provider: P) -> Self {
        let resources = provider.resources();
        let data_sources = provider.data_sources();

        Self {
            provider: RwLock::new(provider),
            provider_data: RwLock::new(None),
            resources,
            data_sources,
        }
    }

    pub fn resource_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.resources.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn data_source_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.data_sources.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn get_provider_schema(&self, ctx: Context) -> GetProviderSchemaResponse {
        let ctx = ctx.with_field("operation", "get_provider_schema");
        let provider_response = self
            .provider
            .read()
            .await
            .schema(ctx.clone(), ProviderSchemaRequest)
            .await;
        let mut diagnostics = provider_response.diagnostics;

        let mut resource_schemas = HashMap::new();
        for (name, factory) in &self.resources {
            let response = factory().schema(ctx.clone(), ResourceSchemaRequest).await;
            diagnostics.extend(response.diagnostics);
            resource_schemas.insert(name.clone(), response.schema);
        }

        let mut data_source_schemas = HashMap::new();
        for (name, factory) in &self.data_sources {
            let response = factory().schema(ctx.clone(), DataSourceSchemaRequest).await;
            diagnostics.extend(response.diagnostics);
            data_source_schemas.insert(name.clone(), response.schema);
        }

        GetProviderSchemaResponse {
            provider: provider_response.schema,
            resource_schemas,
            data_source_schemas,
            diagnostics,
        }
    }

    /// Runs Provider::configure and keeps its provider data for every later
    /// resource and data source instance
    pub async fn configure_provider(
        &self,
        ctx: Context,
        request: ConfigureProviderRequest,
    ) -> Vec<Diagnostic> {
        let ctx = ctx.with_field("operation", "configure_provider");
        let mut diagnostics = {
            let schema = self
                .provider
                .read()
                .await
                .schema(ctx.clone(), ProviderSchemaRequest)
                .await
                .schema;
            let mut diagnostics = Vec::new();
            validate_attributes(
                &schema.attributes,
                &request.config.value,
                &AttributePath::root(),
                &mut diagnostics,
            );
            diagnostics
        };
        if has_errors(&diagnostics) {
            return diagnostics;
        }

        let response = self.provider.write().await.configure(ctx, request).await;
        diagnostics.extend(response.diagnostics);

        if has_errors(&diagnostics) {
            warn!("provider configuration failed");
            return diagnostics;
        }

        *self.provider_data.write().await = Some(response.provider_data);
        debug!("provider configured");
        diagnostics
    }

    pub async fn validate_resource_config(
        &self,
        ctx: Context,
        request: ValidateResourceConfigRequest,
    ) -> ValidateResourceConfigResponse {
        let ctx = ctx
            .with_field("operation", "validate_resource_config")
            .with_field("type_name", &request.type_name);
        let resource = match self.new_resource(&request.type_name) {
            Ok(resource) => resource,
            Err(diagnostics) => return ValidateResourceConfigResponse { diagnostics },
        };

        let schema = resource.schema(ctx.clone(), ResourceSchemaRequest).await.schema;
        let mut diagnostics = Vec::new();
        validate_attributes(
            &schema.attributes,
            &request.config.value,
            &AttributePath::root(),
            &mut diagnostics,
        );

        let response = resource.validate(ctx, request).await;
        diagnostics.extend(response.diagnostics);
        ValidateResourceConfigResponse { diagnostics }
    }

    pub async fn validate_data_source_config(
        &self,
        ctx: Context,
        request: ValidateDataSourceConfigRequest,
    ) -> ValidateDataSourceConfigResponse {
        let ctx = ctx
            .with_field("operation", "validate_data_source_config")
            .with_field("type_name", &request.type_name);
        let data_source = match self.new_data_source(&request.type_name) {
            Ok(data_source) => data_source,
            Err(diagnostics) => return ValidateDataSourceConfigResponse { diagnostics },
        };

        let schema = data_source
            .schema(ctx.clone(), DataSourceSchemaRequest)
            .await
            .schema;
        let mut diagnostics = Vec::new();
        validate_attributes(
            &schema.attributes,
            &request.config.value,
            &AttributePath::root(),
            &mut diagnostics,
        );

        let response = data_source.validate(ctx, request).await;
        diagnostics.extend(response.diagnostics);
        ValidateDataSourceConfigResponse { diagnostics }
    }

    /// Builds the planned state from Terraform's proposed state:
    /// defaults first, then unknown markers for computed values, then plan
    /// modifiers
    pub async fn plan_resource_change(
        &self,
        ctx: Context,
        request: PlanResourceChangeRequest,
    ) -> PlanResourceChangeResponse {
        let ctx = ctx
            .with_field("operation", "plan_resource_change")
            .with_field("type_name", &request.type_name);
        let resource = match self.new_resource(&request.type_name) {
            Ok(resource) => resource,
            Err(diagnostics) => {
                return PlanResourceChangeResponse {
                    planned_state: request.proposed_new_state,
                    requires_replace: vec![],
                    diagnostics,
                }
            }
        };

        if request.proposed_new_state.is_null() {
            debug!(type_name = %request.type_name, "planning destroy");
            return PlanResourceChangeResponse {
                planned_state: DynamicValue::null(),
                requires_replace: vec![],
                diagnostics: vec![],
            };
        }

        let schema = resource.schema(ctx, ResourceSchemaRequest).await.schema;
        let prior = &request.prior_state;
        let config = &request.config;
        let mut planned = request.proposed_new_state.clone();
        let mut diagnostics = Vec::new();

        for attr in &schema.attributes {
            let Some(default) = &attr.default else {
                continue;
            };
            let path = AttributePath::new(&attr.name);
            if attr.required || !config.get(&path).is_null() {
                continue;
            }
            let value = default
                .default_value(DefaultRequest { path: path.clone() })
                .value;
            if !value.is_null() {
                set_planned(&mut planned, &path, value, &mut diagnostics);
            }
        }

        let creating = prior.is_null();
        let changed = creating
            || schema
                .attributes
                .iter()
                .filter(|attr| attr.field_mode().is_user_settable())
                .any(|attr| {
                    let path = AttributePath::new(&attr.name);
                    planned.get(&path) != prior.get(&path)
                });

        if changed {
            for attr in schema.attributes.iter().filter(|a| a.computed) {
                let path = AttributePath::new(&attr.name);
                if attr.default.is_none() && config.get(&path).is_null() {
                    set_planned(&mut planned, &path, Dynamic::Unknown, &mut diagnostics);
                }
            }
            mark_nested_unknowns(&schema.attributes, &mut planned.value);
        }

        let mut requires_replace = Vec::new();
        for attr in schema.attributes.iter().filter(|a| !a.plan_modifiers.is_empty()) {
            let path = AttributePath::new(&attr.name);
            let mut plan_value = planned.get(&path);

            for modifier in &attr.plan_modifiers {
                let response = modifier.modify_plan(PlanModifyRequest {
                    state: prior.get(&path),
                    plan: plan_value,
                    config: config.get(&path),
                    path: path.clone(),
                });
                plan_value = response.plan_value;
                diagnostics.extend(response.diagnostics);
                if response.requires_replace && !requires_replace.contains(&path) {
                    requires_replace.push(path.clone());
                }
            }

            set_planned(&mut planned, &path, plan_value, &mut diagnostics);
        }

        debug!(
            type_name = %request.type_name,
            creating,
            changed,
            replace = requires_replace.len(),
            "planned resource change"
        );

        PlanResourceChangeResponse {
            planned_state: planned,
            requires_replace,
            diagnostics,
        }
    }

    /// Dispatches to create, update or delete. Failed creates commit no
    /// state; failed updates and deletes keep the prior state.
    pub async fn apply_resource_change(
        &self,
        ctx: Context,
        request: ApplyResourceChangeRequest,
    ) -> ApplyResourceChangeResponse {
        let ctx = ctx
            .with_field("operation", "apply_resource_change")
            .with_field("type_name", &request.type_name);
        let resource = match self.configured_resource(&ctx, &request.type_name).await {
            Ok(resource) => resource,
            Err(diagnostics) => {
                return ApplyResourceChangeResponse {
                    new_state: request.prior_state,
                    diagnostics,
                }
            }
        };

        let (new_state, diagnostics) = if request.planned_state.is_null() {
            let response = resource
                .delete(
                    ctx,
                    DeleteResourceRequest {
                        type_name: request.type_name.clone(),
                        prior_state: request.prior_state.clone(),
                    },
                )
                .await;
            if has_errors(&response.diagnostics) {
                (request.prior_state, response.diagnostics)
            } else {
                (DynamicValue::null(), response.diagnostics)
            }
        } else if request.prior_state.is_null() {
            let response = resource
                .create(
                    ctx,
                    CreateResourceRequest {
                        type_name: request.type_name.clone(),
                        planned_state: request.planned_state,
                        config: request.config,
                    },
                )
                .await;
            if has_errors(&response.diagnostics) {
                (DynamicValue::null(), response.diagnostics)
            } else {
                (response.new_state, response.diagnostics)
            }
        } else {
            let response = resource
                .update(
                    ctx,
                    UpdateResourceRequest {
                        type_name: request.type_name.clone(),
                        prior_state: request.prior_state.clone(),
                        planned_state: request.planned_state,
                        config: request.config,
                    },
                )
                .await;
            if has_errors(&response.diagnostics) {
                (request.prior_state, response.diagnostics)
            } else {
                (response.new_state, response.diagnostics)
            }
        };

        ApplyResourceChangeResponse {
            new_state: DynamicValue::new(new_state.value.unknowns_to_null()),
            diagnostics,
        }
    }

    pub async fn read_resource(
        &self,
        ctx: Context,
        request: ReadResourceRequest,
    ) -> ReadResourceResponse {
        let ctx = ctx
            .with_field("operation", "read_resource")
            .with_field("type_name", &request.type_name);
        let resource = match self.configured_resource(&ctx, &request.type_name).await {
            Ok(resource) => resource,
            Err(diagnostics) => {
                return ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics,
                }
            }
        };

        if request.current_state.is_null() {
            return ReadResourceResponse {
                new_state: None,
                diagnostics: vec![],
            };
        }

        let response = resource.read(ctx, request).await;
        ReadResourceResponse {
            new_state: response
                .new_state
                .map(|state| DynamicValue::new(state.value.unknowns_to_null())),
            diagnostics: response.diagnostics,
        }
    }

    pub async fn import_resource_state(
        &self,
        ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        let ctx = ctx
            .with_field("operation", "import_resource_state")
            .with_field("type_name", &request.type_name);
        let resource = match self.configured_resource(&ctx, &request.type_name).await {
            Ok(resource) => resource,
            Err(diagnostics) => {
                return ImportResourceStateResponse {
                    imported_resources: vec![],
                    diagnostics,
                }
            }
        };

        debug!(type_name = %request.type_name, id = %request.id, "importing resource");
        resource.import_state(ctx, request).await
    }

    pub async fn read_data_source(
        &self,
        ctx: Context,
        request: ReadDataSourceRequest,
    ) -> ReadDataSourceResponse {
        let ctx = ctx
            .with_field("operation", "read_data_source")
            .with_field("type_name", &request.type_name);
        let data_source = match self.configured_data_source(&ctx, &request.type_name).await {
            Ok(data_source) => data_source,
            Err(diagnostics) => {
                return ReadDataSourceResponse {
                    state: DynamicValue::null(),
                    diagnostics,
                }
            }
        };

        let response = data_source.read(ctx, request).await;
        ReadDataSourceResponse {
            state: DynamicValue::new(response.state.value.unknowns_to_null()),
            diagnostics: response.diagnostics,
        }
    }

    fn new_resource(
        &self,
        type_name: &str,
    ) -> Result<Box<dyn ResourceWithConfigure>, Vec<Diagnostic>> {
        match self.resources.get(type_name) {
            Some(factory) => Ok(factory()),
            None => Err(vec![Diagnostic::error(
                format!("Unknown resource type: {}", type_name),
                TfplugError::ResourceNotFound(type_name.to_string()).to_string(),
            )]),
        }
    }

    fn new_data_source(
        &self,
        type_name: &str,
    ) -> Result<Box<dyn DataSourceWithConfigure>, Vec<Diagnostic>> {
        match self.data_sources.get(type_name) {
            Some(factory) => Ok(factory()),
            None => Err(vec![Diagnostic::error(
                format!("Unknown data source type: {}", type_name),
                TfplugError::DataSourceNotFound(type_name.to_string()).to_string(),
            )]),
        }
    }

    async fn provider_data(&self) -> Result<ProviderData, Vec<Diagnostic>> {
        match self.provider_data.read().await.as_ref() {
            Some(data) => Ok(data.clone()),
            None => Err(vec![Diagnostic::error(
                "Provider not configured",
                format!(
                    "{}: configure_provider must succeed before resources are used",
                    TfplugError::ProviderNotConfigured
                ),
            )]),
        }
    }

    async fn configured_resource(
        &self,
        ctx: &Context,
        type_name: &str,
    ) -> Result<Box<dyn ResourceWithConfigure>, Vec<Diagnostic>> {
        let mut resource = self.new_resource(type_name)?;
        let provider_data = self.provider_data().await?;

        let response = resource
            .configure(ctx.clone(), ConfigureResourceRequest { provider_data })
            .await;
        if has_errors(&response.diagnostics) {
            return Err(response.diagnostics);
        }
        Ok(resource)
    }

    async fn configured_data_source(
        &self,
        ctx: &Context,
        type_name: &str,
    ) -> Result<Box<dyn DataSourceWithConfigure>, Vec<Diagnostic>> {
        let mut data_source = self.new_data_source(type_name)?;
        let provider_data = self.provider_data().await?;

        let response = data_source
            .configure(ctx.clone(), ConfigureDataSourceRequest { provider_data })
            .await;
        if has_errors(&response.diagnostics) {
            return Err(response.diagnostics);
        }
        Ok(data_source)
    }
}

fn set_planned(
    planned: &mut DynamicValue,
    path: &AttributePath,
    value: Dynamic,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if let Err(e) = planned.set_value(path, value) {
        diagnostics.push(
            Diagnostic::error(format!("Failed to plan {}", path), e.to_string())
                .with_attribute(path.clone()),
        );
    }
}

/// Marks null computed attributes inside nested objects, list/set elements
/// and map entries as unknown, so the plan shows them as known after apply
fn mark_nested_unknowns(attributes: &[Attribute], object: &mut Dynamic) {
    let Dynamic::Map(fields) = object else {
        return;
    };

    for attr in attributes {
        let Some(nested) = &attr.nested_type else {
            continue;
        };
        let Some(value) = fields.get_mut(&attr.name) else {
            continue;
        };
        match (nested.nesting, value) {
            (ObjectNestingMode::Single, element) => {
                mark_element_unknowns(&nested.attributes, element)
            }
            (ObjectNestingMode::List | ObjectNestingMode::Set, Dynamic::List(elements)) => {
                for element in elements {
                    mark_element_unknowns(&nested.attributes, element);
                }
            }
            (ObjectNestingMode::Map, Dynamic::Map(entries)) => {
                for element in entries.values_mut() {
                    mark_element_unknowns(&nested.attributes, element);
                }
            }
            _ => {}
        }
    }
}

fn mark_element_unknowns(attributes: &[Attribute], element: &mut Dynamic) {
    if let Dynamic::Map(fields) = element {
        for attr in attributes.iter().filter(|a| a.computed && a.default.is_none()) {
            let value = fields.entry(attr.name.clone()).or_insert(Dynamic::Null);
            if value.is_null() {
                *value = Dynamic::Unknown;
            }
        }
    }
    mark_nested_unknowns(attributes, element);
}

/// Schema-level checks: required attributes, read-only attributes, value
/// types, unknown fields and per-attribute validators. Unknown values are
/// skipped.
fn validate_attributes(
    attributes: &[Attribute],
    object: &Dynamic,
    parent: &AttributePath,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if let Some(fields) = object.as_map() {
        for name in fields.keys() {
            if !attributes.iter().any(|a| &a.name == name) {
                let path = parent.clone().attribute(name);
                diagnostics.push(
                    Diagnostic::error(
                        format!("Unknown field: {}", path),
                        format!("The field '{}' is not defined in the schema", name),
                    )
                    .with_attribute(path),
                );
            }
        }
    }

    for attr in attributes {
        let path = parent.clone().attribute(&attr.name);
        let value = object.get(&attr.name).unwrap_or(&Dynamic::Null);

        if value.is_unknown() {
            continue;
        }
        if value.is_null() {
            if attr.required {
                diagnostics.push(
                    Diagnostic::error(
                        format!("Missing required field: {}", path),
                        format!("The field '{}' is required but was not provided", path),
                    )
                    .with_attribute(path),
                );
            }
            continue;
        }
        if attr.computed && !attr.optional && !attr.required {
            diagnostics.push(
                Diagnostic::error(
                    format!("Read-only field: {}", path),
                    format!("The field '{}' is computed and cannot be configured", path),
                )
                .with_attribute(path),
            );
            continue;
        }
        if !type_matches(value, &attr.r#type) {
            diagnostics.push(
                Diagnostic::error(
                    format!("Type mismatch for field: {}", path),
                    format!(
                        "Field '{}' expects type {:?} but got {}",
                        path,
                        attr.r#type,
                        value.kind_name()
                    ),
                )
                .with_attribute(path),
            );
            continue;
        }

        for validator in &attr.validators {
            validator.validate(value, &path, diagnostics);
        }

        if let Some(nested) = &attr.nested_type {
            match (nested.nesting, value) {
                (ObjectNestingMode::Single, Dynamic::Map(_)) => {
                    validate_attributes(&nested.attributes, value, &path, diagnostics)
                }
                (ObjectNestingMode::List | ObjectNestingMode::Set, Dynamic::List(items)) => {
                    for (idx, item) in items.iter().enumerate() {
                        let item_path = path.clone().index(idx as i64);
                        validate_attributes(&nested.attributes, item, &item_path, diagnostics);
                    }
                }
                (ObjectNestingMode::Map, Dynamic::Map(entries)) => {
                    for (key, item) in entries {
                        let item_path = path.clone().key(key);
                        validate_attributes(&nested.attributes, item, &item_path, diagnostics);
                    }
                }
                _ => {}
            }
        }
    }
}

fn type_matches(value: &Dynamic, expected: &AttributeType) -> bool {
    match (value, expected) {
        (Dynamic::Null | Dynamic::Unknown, _) => true,
        (Dynamic::String(_), AttributeType::String) => true,
        (Dynamic::Number(_), AttributeType::Number) => true,
        (Dynamic::Bool(_), AttributeType::Bool) => true,
        (Dynamic::List(items), AttributeType::List(element))
        | (Dynamic::List(items), AttributeType::Set(element)) => {
            items.iter().all(|item| type_matches(item, element))
        }
        (Dynamic::Map(entries), AttributeType::Map(element)) => {
            entries.values().all(|item| type_matches(item, element))
        }
        (Dynamic::Map(entries), AttributeType::Object(fields)) => entries
            .iter()
            .all(|(name, item)| fields.get(name).is_some_and(|t| type_matches(item, t))),
        _ => false,
    }
}
