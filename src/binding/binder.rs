use std::sync::Arc;
use tracing::{debug, warn};

use super::args::{Argument, BoundArguments};
use super::resolver::{ResolveContext, ResolverRegistry};
use super::validate::validate_value;
use crate::error::{BindingError, RegistrationError};
use crate::mapping::RouteDescriptor;
use crate::request::RequestContext;
use crate::router::MatchResult;

/// Resolves, converts and validates every declared parameter of a route.
#[derive(Debug, Clone)]
pub struct ArgumentBinder {
    registry: Arc<ResolverRegistry>,
}

impl ArgumentBinder {
    #[must_use]
    pub fn new(registry: Arc<ResolverRegistry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ResolverRegistry> {
        &self.registry
    }

    /// Registration-time check that every parameter has a resolver.
    ///
    /// # Errors
    ///
    /// `NoResolverFound` for the first unsupported parameter.
    pub fn check_route(&self, route: &RouteDescriptor) -> Result<(), RegistrationError> {
        for param in route.parameters() {
            self.registry.resolver_for(route.handler().name(), param)?;
        }
        Ok(())
    }

    /// Bind parameters in declaration order, stopping at the first error.
    ///
    /// # Errors
    ///
    /// The first [`BindingError`] raised by resolution, conversion or
    /// validation.
    pub fn bind_arguments(
        &self,
        route: &RouteDescriptor,
        matched: &MatchResult,
        request: &RequestContext,
    ) -> Result<BoundArguments, BindingError> {
        let ctx = ResolveContext::new(request, &matched.path_variables);
        let mut args = BoundArguments::new();

        for param in route.parameters() {
            let resolver = self.registry.resolver_for(route.handler().name(), param).map_err(|e| {
                // Routes are checked at registration, so this only happens for
                // descriptors bound outside the route table.
                BindingError::not_readable(param.name(), e.to_string())
            })?;

            let argument = resolver.resolve(param, &ctx).map_err(|e| {
                // B1: Parameter resolution failed
                warn!(
                    request_id = %request.request_id,
                    handler = %route.handler(),
                    parameter = %param.name(),
                    resolver = resolver.name(),
                    kind = %e.kind,
                    error = %e.message,
                    "Argument binding failed"
                );
                e
            })?;

            if param.should_validate() {
                if let Argument::Value(value) = &argument {
                    validate_value(param, value).map_err(|e| {
                        // B2: Validation failed
                        warn!(
                            request_id = %request.request_id,
                            handler = %route.handler(),
                            parameter = %param.name(),
                            field = ?e.field,
                            error = %e.message,
                            "Argument validation failed"
                        );
                        e
                    })?;
                }
            }

            args.push(param.name(), param.binding_name(), argument);
        }

        debug!(
            request_id = %request.request_id,
            handler = %route.handler(),
            arguments = args.len(),
            "Arguments bound"
        );
        Ok(args)
    }
}
