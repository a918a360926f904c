//! OpenAPI document assembly.
//!
//! Turns the route table's endpoint descriptions into one or more OpenAPI documents:
//! endpoints are filtered per document, route templates are mapped to path keys, operation
//! tags are aggregated, and repeated schemas are moved into `components.schemas`.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod filter;
pub mod route;
pub mod service;
pub mod tags;

pub use config::{ApiDocsConfig, DocumentConfig, DEFAULT_DOCUMENT};
pub use endpoint::{
    EndpointDescription, ParameterDescription, RequestBodyDescription, ResponseDescription,
    JSON_MEDIA_TYPE,
};
pub use error::ApiDocsError;
pub use filter::DocumentFilter;
pub use route::normalize_route_template;
pub use service::{DocumentService, MODULE_NAME};
pub use tags::TagAccumulator;
