//! Route and parameter metadata, built once at registration.
//!
//! Routes are described with [`RouteDescriptor::builder`] in code, or
//! declaratively in YAML/JSON route files ([`load_routes`]).

mod handler;
mod load;
mod route;
mod types;

pub use handler::{HandlerMethod, HandlerRef};
pub use load::{
    load_routes, parse_routes, render_template, ConstraintDefinition, ParameterDefinition, ResponseTemplate,
    RouteDefinition, RouteFile,
};
pub use route::{MappingKey, RouteBuilder, RouteDescriptor};
pub use types::{CompositeType, DeclaredType, FieldDescriptor, ParameterDescriptor, SourceKind};
