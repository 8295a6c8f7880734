//! # Binding Module
//!
//! Turns a matched request into the handler's typed arguments.
//!
//! Each declared [`crate::mapping::ParameterDescriptor`] is handed to the
//! first [`ArgumentResolver`] in the [`ResolverRegistry`] that supports its
//! type and source. The resolver reads the request (path variables, query
//! and form params, headers, cookies, session, model, body), converts the
//! raw strings to the declared type and applies the missing-value policy:
//!
//! - required and absent → a [`crate::error::BindingError`]
//! - optional with a default → the default, converted
//! - optional without a default → the type's zero value
//!
//! Validated parameters are then checked against their constraints. The
//! [`ArgumentBinder`] stops at the first error.
//!
//! Map-typed query/header parameters always receive every param/header;
//! an explicit name on such a parameter has no effect.

mod args;
mod binder;
mod convert;
mod converter;
mod resolver;
mod resolvers;
mod validate;

pub use args::{Argument, BoundArguments};
pub use binder::ArgumentBinder;
pub use convert::{conform, convert_scalar, convert_values, resolve_named};
pub use converter::{
    default_converters, FormMessageConverter, JsonMessageConverter, MessageConverter,
    StringMessageConverter,
};
pub use resolver::{ArgumentResolver, BindingOutcome, ResolveContext, ResolverRegistry};
pub use resolvers::{
    CookieValueResolver, ImplicitModelResolver, ImplicitParamResolver, ModelAttributeResolver,
    MultipartFileResolver, PathVariableMapResolver, PathVariableResolver, RequestBodyResolver,
    RequestHeaderMapResolver, RequestHeaderResolver, RequestParamMapResolver, RequestParamResolver,
    SessionAttributeResolver,
};
pub use validate::{validate_value, Constraint, ObjectConstraint};
