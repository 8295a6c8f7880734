use http::Method;
use std::fmt;

use super::handler::{HandlerMethod, HandlerRef};
use super::types::ParameterDescriptor;
use crate::binding::BoundArguments;
use crate::dispatcher::{ReturnKind, ReturnValue};
use crate::error::RegistrationError;
use crate::media::MediaType;
use crate::request::RequestContext;
use crate::router::{MediaTypeExpression, NameValueExpression, PathPattern};

/// Immutable request mapping: pattern, conditions and the bound handler.
#[derive(Debug, Clone)]
pub struct RouteDescriptor {
    pattern: PathPattern,
    methods: Vec<Method>,
    params: Vec<NameValueExpression>,
    headers: Vec<NameValueExpression>,
    consumes: Vec<MediaTypeExpression>,
    produces: Vec<MediaType>,
    handler: HandlerRef,
    name: Option<String>,
    parameters: Vec<ParameterDescriptor>,
    return_kind: Option<ReturnKind>,
}

/// Everything that makes two mappings identical except the method set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MappingKey {
    pub shape: String,
    pub params: Vec<String>,
    pub headers: Vec<String>,
    pub consumes: Vec<String>,
    pub produces: Vec<String>,
}

impl RouteDescriptor {
    /// Start a route for `pattern`.
    #[must_use]
    pub fn builder(pattern: &str) -> RouteBuilder {
        RouteBuilder::new(pattern)
    }

    #[must_use]
    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    /// Declared methods, sorted; empty means any method.
    #[must_use]
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    #[must_use]
    pub fn params(&self) -> &[NameValueExpression] {
        &self.params
    }

    #[must_use]
    pub fn headers(&self) -> &[NameValueExpression] {
        &self.headers
    }

    #[must_use]
    pub fn consumes(&self) -> &[MediaTypeExpression] {
        &self.consumes
    }

    #[must_use]
    pub fn produces(&self) -> &[MediaType] {
        &self.produces
    }

    #[must_use]
    pub fn handler(&self) -> &HandlerRef {
        &self.handler
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn parameters(&self) -> &[ParameterDescriptor] {
        &self.parameters
    }

    #[must_use]
    pub fn return_kind(&self) -> Option<ReturnKind> {
        self.return_kind
    }

    #[must_use]
    pub fn mapping_key(&self) -> MappingKey {
        fn sorted<T: ToString>(items: &[T]) -> Vec<String> {
            let mut v: Vec<String> = items.iter().map(ToString::to_string).collect();
            v.sort();
            v
        }
        MappingKey {
            shape: self.pattern.shape(),
            params: sorted(&self.params),
            headers: sorted(&self.headers)
                .into_iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
            consumes: sorted(&self.consumes),
            produces: sorted(&self.produces),
        }
    }

    /// Number of param and header conditions.
    #[must_use]
    pub fn condition_count(&self) -> usize {
        self.params.len() + self.headers.len()
    }

    /// Compact form used in logs and errors, e.g. `{GET /items/{id}, params [v=1]}`.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut out = String::from("{");
        if !self.methods.is_empty() {
            let methods: Vec<&str> = self.methods.iter().map(Method::as_str).collect();
            out.push_str(&methods.join(","));
            out.push(' ');
        }
        out.push_str(self.pattern.as_str());
        let mut section = |label: &str, items: Vec<String>| {
            if !items.is_empty() {
                out.push_str(", ");
                out.push_str(label);
                out.push_str(" [");
                out.push_str(&items.join(" || "));
                out.push(']');
            }
        };
        section("params", self.params.iter().map(ToString::to_string).collect());
        section("headers", self.headers.iter().map(ToString::to_string).collect());
        section("consumes", self.consumes.iter().map(ToString::to_string).collect());
        section("produces", self.produces.iter().map(ToString::to_string).collect());
        out.push('}');
        out
    }
}

impl fmt::Display for RouteDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.describe(), self.handler)
    }
}

/// Registration-time builder for [`RouteDescriptor`].
///
/// Parse failures are remembered and reported by [`RouteBuilder::build`],
/// so the chain stays infallible.
#[must_use]
pub struct RouteBuilder {
    pattern: String,
    methods: Vec<Method>,
    params: Vec<String>,
    headers: Vec<String>,
    consumes: Vec<String>,
    produces: Vec<String>,
    handler: Option<HandlerRef>,
    name: Option<String>,
    parameters: Vec<ParameterDescriptor>,
    return_kind: Option<ReturnKind>,
}

impl RouteBuilder {
    fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            methods: Vec::new(),
            params: Vec::new(),
            headers: Vec::new(),
            consumes: Vec::new(),
            produces: Vec::new(),
            handler: None,
            name: None,
            parameters: Vec::new(),
            return_kind: None,
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods.extend(methods);
        self
    }

    /// Param condition: `name`, `!name`, `name=value` or `name!=value`.
    pub fn param(mut self, expr: &str) -> Self {
        self.params.push(expr.to_string());
        self
    }

    /// Header condition, same syntax as [`Self::param`].
    pub fn header(mut self, expr: &str) -> Self {
        self.headers.push(expr.to_string());
        self
    }

    pub fn consumes(mut self, media: &str) -> Self {
        self.consumes.push(media.to_string());
        self
    }

    pub fn produces(mut self, media: &str) -> Self {
        self.produces.push(media.to_string());
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn parameter(mut self, param: ParameterDescriptor) -> Self {
        self.parameters.push(param);
        self
    }

    pub fn return_kind(mut self, kind: ReturnKind) -> Self {
        self.return_kind = Some(kind);
        self
    }

    pub fn handler<F>(mut self, name: &str, target: F) -> Self
    where
        F: Fn(BoundArguments, &RequestContext) -> anyhow::Result<ReturnValue> + Send + Sync + 'static,
    {
        self.handler = Some(HandlerRef::new(name, target));
        self
    }

    /// Bind a handler implemented as a type rather than a closure.
    pub fn handler_method(mut self, name: &str, target: impl HandlerMethod + 'static) -> Self {
        self.handler = Some(HandlerRef::from_method(name, target));
        self
    }

    /// Bind an already shared handler (same target, same handler identity).
    pub fn handler_ref(mut self, handler: HandlerRef) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Compile the pattern and conditions.
    ///
    /// # Errors
    ///
    /// `InvalidPattern`, `InvalidCondition`, or `MissingHandler`.
    pub fn build(self) -> Result<RouteDescriptor, RegistrationError> {
        let pattern = PathPattern::parse(&self.pattern)?;
        let params = self
            .params
            .iter()
            .map(|e| NameValueExpression::param(e))
            .collect::<Result<Vec<_>, _>>()?;
        let headers = self
            .headers
            .iter()
            .map(|e| NameValueExpression::header(e))
            .collect::<Result<Vec<_>, _>>()?;
        let consumes = self
            .consumes
            .iter()
            .map(|e| MediaTypeExpression::parse(e))
            .collect::<Result<Vec<_>, _>>()?;
        let produces = self
            .produces
            .iter()
            .map(|e| {
                e.parse::<MediaType>()
                    .map_err(|err| RegistrationError::InvalidCondition {
                        expression: e.clone(),
                        reason: err.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut methods = self.methods;
        methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        methods.dedup();

        let handler = self
            .handler
            .ok_or_else(|| RegistrationError::MissingHandler {
                mapping: self.pattern.clone(),
            })?;

        Ok(RouteDescriptor {
            pattern,
            methods,
            params,
            headers,
            consumes,
            produces,
            handler,
            name: self.name,
            parameters: self.parameters,
            return_kind: self.return_kind,
        })
    }
}
