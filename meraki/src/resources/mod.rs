//! Resource implementations

mod endpoint_resource;

pub use endpoint_resource::EndpointResource;
