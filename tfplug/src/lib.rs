//! tfplug - Terraform Plugin Framework for Rust
//!
//! A framework for building Terraform providers in Rust: the value and schema
//! model, the provider/resource/data source traits, plan helpers, the state
//! reconciler and an in-process server that drives providers the way
//! Terraform does.

// Core modules
pub mod context;
pub mod error;
pub mod reconcile;
pub mod schema;
pub mod types;

// Provider API modules
pub mod data_source;
pub mod provider;
pub mod resource;

// Helper modules
pub mod defaults;
pub mod import;
pub mod plan_modifier;
pub mod validator;

pub mod server;

// Re-exports for convenience
pub use context::Context;
pub use data_source::{DataSource, DataSourceWithConfigure};
pub use error::{Result, TfplugError};
pub use import::{import_state_composite_id, import_state_passthrough_id};
pub use provider::{Provider, ProviderMetadataRequest, ProviderMetadataResponse};
pub use reconcile::{merge_for_read, merge_for_write, FieldMode, Shape};
pub use resource::{Resource, ResourceWithConfigure};
pub use schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
pub use server::ProviderServer;
pub use types::{Diagnostic, Dynamic, DynamicValue};
