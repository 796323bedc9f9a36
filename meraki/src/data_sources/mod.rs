//! Data source implementations

mod endpoint_data_source;

pub use endpoint_data_source::EndpointDataSource;
