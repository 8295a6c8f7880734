use std::fmt;
use std::sync::Arc;

use super::args::Argument;
use super::converter::MessageConverter;
use super::resolvers::{
    CookieValueResolver, ImplicitModelResolver, ImplicitParamResolver, ModelAttributeResolver,
    MultipartFileResolver, PathVariableMapResolver, PathVariableResolver, RequestBodyResolver,
    RequestHeaderMapResolver, RequestHeaderResolver, RequestParamMapResolver, RequestParamResolver,
    SessionAttributeResolver,
};
use crate::error::{BindingError, RegistrationError};
use crate::mapping::ParameterDescriptor;
use crate::request::{ParamVec, RequestContext};

/// Result of resolving one parameter.
pub type BindingOutcome = Result<Argument, BindingError>;

/// Request-scoped inputs handed to every resolver.
#[derive(Clone, Copy)]
pub struct ResolveContext<'a> {
    pub request: &'a RequestContext,
    pub path_variables: &'a ParamVec,
}

impl<'a> ResolveContext<'a> {
    #[must_use]
    pub fn new(request: &'a RequestContext, path_variables: &'a ParamVec) -> Self {
        Self {
            request,
            path_variables,
        }
    }

    #[must_use]
    pub fn path_variable(&self, name: &str) -> Option<&'a str> {
        self.path_variables
            .iter()
            .find(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }
}

/// One strategy for turning request data into a parameter value.
pub trait ArgumentResolver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this strategy handles the parameter's type and source.
    fn supports(&self, param: &ParameterDescriptor) -> bool;

    fn resolve(&self, param: &ParameterDescriptor, ctx: &ResolveContext<'_>) -> BindingOutcome;
}

/// Ordered resolver chain; the first supporting strategy wins.
///
/// Immutable once built; share it behind an `Arc`.
pub struct ResolverRegistry {
    resolvers: Vec<Arc<dyn ArgumentResolver>>,
    // Index of the first catch-all strategy; custom resolvers go before it.
    fallback_start: usize,
}

impl ResolverRegistry {
    /// Empty registry (only custom resolvers).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            resolvers: Vec::new(),
            fallback_start: 0,
        }
    }

    /// Built-in strategies from specific to catch-all.
    #[must_use]
    pub fn with_defaults(converters: Vec<Arc<dyn MessageConverter>>) -> Self {
        let specific: Vec<Arc<dyn ArgumentResolver>> = vec![
            Arc::new(PathVariableMapResolver),
            Arc::new(PathVariableResolver),
            Arc::new(MultipartFileResolver),
            Arc::new(RequestParamMapResolver),
            Arc::new(RequestParamResolver),
            Arc::new(RequestHeaderMapResolver),
            Arc::new(RequestHeaderResolver),
            Arc::new(CookieValueResolver),
            Arc::new(SessionAttributeResolver),
            Arc::new(RequestBodyResolver::new(converters)),
            Arc::new(ModelAttributeResolver::explicit()),
        ];
        let fallback_start = specific.len();
        let mut resolvers = specific;
        resolvers.push(Arc::new(ImplicitModelResolver));
        resolvers.push(Arc::new(ImplicitParamResolver));
        resolvers.push(Arc::new(ModelAttributeResolver::implicit()));
        Self {
            resolvers,
            fallback_start,
        }
    }

    /// Insert a custom strategy after the built-in specific ones and before
    /// the catch-all fallbacks.
    #[must_use]
    pub fn with_custom(mut self, resolver: Arc<dyn ArgumentResolver>) -> Self {
        self.resolvers.insert(self.fallback_start, resolver);
        self.fallback_start += 1;
        self
    }

    /// First strategy supporting `param`.
    ///
    /// # Errors
    ///
    /// `NoResolverFound` naming the handler and parameter.
    pub fn resolver_for(
        &self,
        handler: &str,
        param: &ParameterDescriptor,
    ) -> Result<&Arc<dyn ArgumentResolver>, RegistrationError> {
        self.resolvers
            .iter()
            .find(|r| r.supports(param))
            .ok_or_else(|| RegistrationError::NoResolverFound {
                handler: handler.to_string(),
                parameter: param.name().to_string(),
            })
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.resolvers.iter().map(|r| r.name()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

impl fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverRegistry")
            .field("resolvers", &self.names())
            .finish()
    }
}
