//! Built-in resolution strategies, from specific to catch-all.

use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

use super::args::Argument;
use super::convert::{conform, convert_values, default_or_zero, resolve_named};
use super::converter::MessageConverter;
use super::resolver::{ArgumentResolver, BindingOutcome, ResolveContext};
use crate::error::{BindingError, BindingErrorKind};
use crate::mapping::{CompositeType, DeclaredType, ParameterDescriptor, SourceKind};

fn accepts_named_value(ty: &DeclaredType) -> bool {
    ty.is_simple_or_list_of_simple() || matches!(ty, DeclaredType::Json)
}

/// `PathVariable` + `Map`: every captured variable.
pub struct PathVariableMapResolver;

impl ArgumentResolver for PathVariableMapResolver {
    fn name(&self) -> &'static str {
        "path_variable_map"
    }

    fn supports(&self, param: &ParameterDescriptor) -> bool {
        param.source() == SourceKind::PathVariable && matches!(param.declared_type(), DeclaredType::Map)
    }

    fn resolve(&self, _param: &ParameterDescriptor, ctx: &ResolveContext<'_>) -> BindingOutcome {
        let map: Map<String, Value> = ctx
            .path_variables
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.clone())))
            .collect();
        Ok(Argument::Value(Value::Object(map)))
    }
}

/// A single URI template variable.
pub struct PathVariableResolver;

impl ArgumentResolver for PathVariableResolver {
    fn name(&self) -> &'static str {
        "path_variable"
    }

    fn supports(&self, param: &ParameterDescriptor) -> bool {
        param.source() == SourceKind::PathVariable && accepts_named_value(param.declared_type())
    }

    fn resolve(&self, param: &ParameterDescriptor, ctx: &ResolveContext<'_>) -> BindingOutcome {
        let name = param.binding_name();
        let values: Vec<&str> = ctx.path_variable(name).into_iter().collect();
        resolve_named(param, &values, || BindingError::missing_path_variable(name)).map(Argument::Value)
    }
}

/// Uploaded files by form field name.
pub struct MultipartFileResolver;

impl ArgumentResolver for MultipartFileResolver {
    fn name(&self) -> &'static str {
        "multipart_file"
    }

    fn supports(&self, param: &ParameterDescriptor) -> bool {
        param.declared_type().is_file()
            && matches!(param.source(), SourceKind::None | SourceKind::QueryParam)
    }

    fn resolve(&self, param: &ParameterDescriptor, ctx: &ResolveContext<'_>) -> BindingOutcome {
        let name = param.binding_name();
        let files: Vec<_> = ctx.request.files_named(name).into_iter().cloned().collect();
        if files.is_empty() && param.is_required() {
            return Err(BindingError::missing_value(name, "request part"));
        }
        match param.declared_type() {
            DeclaredType::List(_) => Ok(Argument::Files(files)),
            _ => Ok(files
                .into_iter()
                .next()
                .map_or_else(|| Argument::Value(param.declared_type().zero_value()), Argument::File)),
        }
    }
}

/// `QueryParam` + `Map`.
///
/// Returns every query and form parameter (first value per name). The
/// parameter's own name is ignored, even when given explicitly.
pub struct RequestParamMapResolver;

impl ArgumentResolver for RequestParamMapResolver {
    fn name(&self) -> &'static str {
        "request_param_map"
    }

    fn supports(&self, param: &ParameterDescriptor) -> bool {
        param.source() == SourceKind::QueryParam && matches!(param.declared_type(), DeclaredType::Map)
    }

    fn resolve(&self, _param: &ParameterDescriptor, ctx: &ResolveContext<'_>) -> BindingOutcome {
        let mut map = Map::new();
        for (k, v) in ctx.request.all_params() {
            map.entry(k.to_string())
                .or_insert_with(|| Value::String(v.to_string()));
        }
        Ok(Argument::Value(Value::Object(map)))
    }
}

/// Query and form parameters by binding name.
pub struct RequestParamResolver;

impl ArgumentResolver for RequestParamResolver {
    fn name(&self) -> &'static str {
        "request_param"
    }

    fn supports(&self, param: &ParameterDescriptor) -> bool {
        param.source() == SourceKind::QueryParam && accepts_named_value(param.declared_type())
    }

    fn resolve(&self, param: &ParameterDescriptor, ctx: &ResolveContext<'_>) -> BindingOutcome {
        let name = param.binding_name();
        let values = ctx.request.param_values(name);
        resolve_named(param, &values, || BindingError::missing_value(name, "request parameter"))
            .map(Argument::Value)
    }
}

/// `Header` + `Map`.
///
/// Returns every request header (first value per name) regardless of the
/// declared name.
pub struct RequestHeaderMapResolver;

impl ArgumentResolver for RequestHeaderMapResolver {
    fn name(&self) -> &'static str {
        "request_header_map"
    }

    fn supports(&self, param: &ParameterDescriptor) -> bool {
        param.source() == SourceKind::Header && matches!(param.declared_type(), DeclaredType::Map)
    }

    fn resolve(&self, _param: &ParameterDescriptor, ctx: &ResolveContext<'_>) -> BindingOutcome {
        let mut map = Map::new();
        for (k, v) in &ctx.request.headers {
            map.entry(k.to_string())
                .or_insert_with(|| Value::String(v.clone()));
        }
        Ok(Argument::Value(Value::Object(map)))
    }
}

/// A request header (case-insensitive name).
pub struct RequestHeaderResolver;

impl ArgumentResolver for RequestHeaderResolver {
    fn name(&self) -> &'static str {
        "request_header"
    }

    fn supports(&self, param: &ParameterDescriptor) -> bool {
        param.source() == SourceKind::Header && accepts_named_value(param.declared_type())
    }

    fn resolve(&self, param: &ParameterDescriptor, ctx: &ResolveContext<'_>) -> BindingOutcome {
        let name = param.binding_name();
        let values = ctx.request.header_values(name);
        resolve_named(param, &values, || BindingError::missing_value(name, "request header"))
            .map(Argument::Value)
    }
}

pub struct CookieValueResolver;

impl ArgumentResolver for CookieValueResolver {
    fn name(&self) -> &'static str {
        "cookie_value"
    }

    fn supports(&self, param: &ParameterDescriptor) -> bool {
        param.source() == SourceKind::Cookie && param.declared_type().is_simple()
    }

    fn resolve(&self, param: &ParameterDescriptor, ctx: &ResolveContext<'_>) -> BindingOutcome {
        let name = param.binding_name();
        let values: Vec<&str> = ctx.request.cookie(name).into_iter().collect();
        resolve_named(param, &values, || BindingError::missing_value(name, "cookie"))
            .map(Argument::Value)
    }
}

pub struct SessionAttributeResolver;

impl ArgumentResolver for SessionAttributeResolver {
    fn name(&self) -> &'static str {
        "session_attribute"
    }

    fn supports(&self, param: &ParameterDescriptor) -> bool {
        param.source() == SourceKind::SessionAttribute && !param.declared_type().is_file()
    }

    fn resolve(&self, param: &ParameterDescriptor, ctx: &ResolveContext<'_>) -> BindingOutcome {
        let name = param.binding_name();
        let value = ctx.request.session.as_ref().and_then(|s| s.get(name));
        match value {
            Some(v) => conform(name, v, param.declared_type()).map(Argument::Value),
            None if param.is_required() => Err(BindingError::missing_session_attribute(name)),
            None => default_or_zero(param).map(Argument::Value),
        }
    }
}

/// Request body through the first converter that reads the content type.
pub struct RequestBodyResolver {
    converters: Vec<Arc<dyn MessageConverter>>,
}

impl RequestBodyResolver {
    #[must_use]
    pub fn new(converters: Vec<Arc<dyn MessageConverter>>) -> Self {
        Self { converters }
    }
}

impl ArgumentResolver for RequestBodyResolver {
    fn name(&self) -> &'static str {
        "request_body"
    }

    fn supports(&self, param: &ParameterDescriptor) -> bool {
        param.source() == SourceKind::Body && !matches!(param.declared_type(), DeclaredType::Model)
    }

    fn resolve(&self, param: &ParameterDescriptor, ctx: &ResolveContext<'_>) -> BindingOutcome {
        let name = param.binding_name();
        let request = ctx.request;
        if request.body.is_empty() {
            if param.is_required() {
                return Err(BindingError::not_readable(name, "Required request body is missing"));
            }
            return default_or_zero(param).map(Argument::Value);
        }
        let media = request.effective_content_type();
        let ty = param.declared_type();
        let converter = self
            .converters
            .iter()
            .find(|c| c.can_read(ty, &media))
            .ok_or_else(|| {
                BindingError::new(
                    BindingErrorKind::UnsupportedMediaType,
                    name,
                    format!("Content type '{media}' not supported for {ty}"),
                )
            })?;
        debug!(
            request_id = %request.request_id,
            parameter = %name,
            converter = converter.name(),
            content_type = %media,
            "Reading request body"
        );
        converter
            .read(ty, &request.body, &media)
            .map(Argument::Value)
            .map_err(|e| BindingError::not_readable(name, format!("{e:#}")))
    }
}

/// Composite types built from the model and request parameters; simple
/// types read from the model, then request parameters.
pub struct ModelAttributeResolver {
    implicit: bool,
}

impl ModelAttributeResolver {
    /// Handles parameters with an explicit `ModelAttribute` source.
    #[must_use]
    pub fn explicit() -> Self {
        Self { implicit: false }
    }

    /// Catch-all for composite parameters without a source.
    #[must_use]
    pub fn implicit() -> Self {
        Self { implicit: true }
    }
}

impl ArgumentResolver for ModelAttributeResolver {
    fn name(&self) -> &'static str {
        if self.implicit {
            "implicit_model_attribute"
        } else {
            "model_attribute"
        }
    }

    fn supports(&self, param: &ParameterDescriptor) -> bool {
        if self.implicit {
            param.source() == SourceKind::None && matches!(param.declared_type(), DeclaredType::Composite(_))
        } else {
            param.source() == SourceKind::ModelAttribute && !param.declared_type().is_file()
        }
    }

    fn resolve(&self, param: &ParameterDescriptor, ctx: &ResolveContext<'_>) -> BindingOutcome {
        let name = param.binding_name();
        let existing = ctx.request.model.get(name).cloned();
        let ty = param.declared_type();
        let value = match ty {
            DeclaredType::Composite(composite) => {
                let base = match existing {
                    Some(v @ Value::Object(_)) => conform(name, v, ty)?,
                    _ => composite.zero_value(),
                };
                let Value::Object(mut obj) = base else {
                    return Ok(Argument::Value(composite.zero_value()));
                };
                bind_fields(&mut obj, composite, "", ctx)?;
                Value::Object(obj)
            }
            DeclaredType::Model => Value::Object(ctx.request.model.clone()),
            t if t.is_simple_or_list_of_simple() => match existing {
                Some(v) => conform(name, v, t)?,
                None => {
                    let values = ctx.request.param_values(name);
                    resolve_named(param, &values, || BindingError::missing_value(name, "model attribute"))?
                }
            },
            t => existing.unwrap_or_else(|| t.zero_value()),
        };
        Ok(Argument::Value(value))
    }
}

/// Overlay request parameters onto a composite, field by field. Field
/// names match parameters exactly; nested composites use `outer.inner`.
fn bind_fields(
    obj: &mut Map<String, Value>,
    composite: &CompositeType,
    prefix: &str,
    ctx: &ResolveContext<'_>,
) -> Result<(), BindingError> {
    for field in &composite.fields {
        let key = format!("{prefix}{}", field.name);
        match &field.ty {
            DeclaredType::Composite(inner) => {
                let mut nested = match obj.remove(&field.name) {
                    Some(Value::Object(m)) => m,
                    _ => match inner.zero_value() {
                        Value::Object(m) => m,
                        _ => Map::new(),
                    },
                };
                bind_fields(&mut nested, inner, &format!("{key}."), ctx)?;
                obj.insert(field.name.clone(), Value::Object(nested));
            }
            ty if ty.is_file() => {
                let files = ctx.request.files_named(&key);
                if !files.is_empty() {
                    let described = match ty {
                        DeclaredType::List(_) => Value::Array(files.iter().map(|f| f.describe()).collect()),
                        _ => files[0].describe(),
                    };
                    obj.insert(field.name.clone(), described);
                }
            }
            ty => {
                let values = ctx.request.param_values(&key);
                if !values.is_empty() {
                    let p = ParameterDescriptor::implicit(&key, ty.clone());
                    obj.insert(field.name.clone(), convert_values(&p, &values)?);
                }
            }
        }
    }
    Ok(())
}

/// `Model` or `Map` without a source: the request model.
pub struct ImplicitModelResolver;

impl ArgumentResolver for ImplicitModelResolver {
    fn name(&self) -> &'static str {
        "implicit_model"
    }

    fn supports(&self, param: &ParameterDescriptor) -> bool {
        param.source() == SourceKind::None
            && matches!(param.declared_type(), DeclaredType::Model | DeclaredType::Map)
    }

    fn resolve(&self, _param: &ParameterDescriptor, ctx: &ResolveContext<'_>) -> BindingOutcome {
        Ok(Argument::Value(Value::Object(ctx.request.model.clone())))
    }
}

/// Simple types without a source: an optional request parameter.
pub struct ImplicitParamResolver;

impl ArgumentResolver for ImplicitParamResolver {
    fn name(&self) -> &'static str {
        "implicit_param"
    }

    fn supports(&self, param: &ParameterDescriptor) -> bool {
        param.source() == SourceKind::None && param.declared_type().is_simple_or_list_of_simple()
    }

    fn resolve(&self, param: &ParameterDescriptor, ctx: &ResolveContext<'_>) -> BindingOutcome {
        RequestParamResolver.resolve(param, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{ParamVec, RequestContext};
    use http::Method;
    use serde_json::json;

    fn ctx_for<'a>(req: &'a RequestContext, vars: &'a ParamVec) -> ResolveContext<'a> {
        ResolveContext::new(req, vars)
    }

    #[test]
    fn test_header_map_ignores_declared_name() {
        let req = RequestContext::builder(Method::GET, "/")
            .header("X-Foo", "1")
            .header("X-Bar", "2")
            .build();
        let vars = ParamVec::new();
        let p = ParameterDescriptor::header("X-Foo", DeclaredType::Map);
        let arg = RequestHeaderMapResolver.resolve(&p, &ctx_for(&req, &vars)).unwrap();
        assert_eq!(arg, Argument::Value(json!({"X-Foo": "1", "X-Bar": "2"})));
    }

    #[test]
    fn test_param_map_ignores_explicit_name() {
        let req = RequestContext::builder(Method::GET, "/?a=1&b=2&a=3").build();
        let vars = ParamVec::new();
        let p = ParameterDescriptor::query("params", DeclaredType::Map).named("a");
        let arg = RequestParamMapResolver.resolve(&p, &ctx_for(&req, &vars)).unwrap();
        assert_eq!(arg, Argument::Value(json!({"a": "1", "b": "2"})));
    }

    #[test]
    fn test_model_attribute_starts_from_model() {
        let ty = CompositeType::new("Form")
            .field("name", DeclaredType::String)
            .field("age", DeclaredType::Integer)
            .field("Note", DeclaredType::String)
            .into_type();
        let mut req = RequestContext::builder(Method::POST, "/?age=40&note=ignored").build();
        req.model.insert("form".into(), json!({"name": "flash", "age": 1}));
        let vars = ParamVec::new();
        let p = ParameterDescriptor::model_attribute("form", ty);
        let arg = ModelAttributeResolver::explicit().resolve(&p, &ctx_for(&req, &vars)).unwrap();
        assert_eq!(arg, Argument::Value(json!({"name": "flash", "age": 40, "Note": ""})));
    }

    #[test]
    fn test_model_attribute_type_mismatch() {
        let ty = CompositeType::new("Form").field("age", DeclaredType::Integer).into_type();
        let req = RequestContext::builder(Method::POST, "/?age=old").build();
        let vars = ParamVec::new();
        let p = ParameterDescriptor::implicit("form", ty);
        let err = ModelAttributeResolver::implicit()
            .resolve(&p, &ctx_for(&req, &vars))
            .unwrap_err();
        assert_eq!(err.kind, BindingErrorKind::TypeMismatch);
    }

    #[test]
    fn test_missing_body() {
        let req = RequestContext::builder(Method::POST, "/").build();
        let vars = ParamVec::new();
        let resolver = RequestBodyResolver::new(crate::binding::default_converters());
        let p = ParameterDescriptor::body("payload", DeclaredType::Json);
        let err = resolver.resolve(&p, &ctx_for(&req, &vars)).unwrap_err();
        assert_eq!(err.kind, BindingErrorKind::MessageNotReadable);
    }

    #[test]
    fn test_body_without_converter() {
        let req = RequestContext::builder(Method::POST, "/")
            .header("Content-Type", "application/xml")
            .body("<a/>")
            .build();
        let vars = ParamVec::new();
        let resolver = RequestBodyResolver::new(crate::binding::default_converters());
        let p = ParameterDescriptor::body("payload", DeclaredType::Json);
        let err = resolver.resolve(&p, &ctx_for(&req, &vars)).unwrap_err();
        assert_eq!(err.kind, BindingErrorKind::UnsupportedMediaType);
        assert_eq!(err.status(), http::StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[test]
    fn test_session_attribute() {
        let session = Arc::new(crate::session::InMemorySession::new("s"));
        crate::session::Session::set(session.as_ref(), "user", json!("ada"));
        let req = RequestContext::builder(Method::GET, "/").session(session).build();
        let vars = ParamVec::new();
        let present = ParameterDescriptor::session_attribute("user", DeclaredType::String);
        assert_eq!(
            SessionAttributeResolver.resolve(&present, &ctx_for(&req, &vars)).unwrap(),
            Argument::Value(json!("ada"))
        );
        let missing = ParameterDescriptor::session_attribute("cart", DeclaredType::Json);
        let err = SessionAttributeResolver.resolve(&missing, &ctx_for(&req, &vars)).unwrap_err();
        assert_eq!(err.kind, BindingErrorKind::MissingSessionAttribute);
    }

    #[test]
    fn test_optional_session_attribute_uses_default_then_zero() {
        let req = RequestContext::builder(Method::GET, "/").build();
        let vars = ParamVec::new();
        let with_default =
            ParameterDescriptor::session_attribute("count", DeclaredType::Integer).default_value("5");
        assert_eq!(
            SessionAttributeResolver.resolve(&with_default, &ctx_for(&req, &vars)).unwrap(),
            Argument::Value(json!(5))
        );
        let text = ParameterDescriptor::session_attribute("theme", DeclaredType::String).optional();
        assert_eq!(
            SessionAttributeResolver.resolve(&text, &ctx_for(&req, &vars)).unwrap(),
            Argument::Value(json!(""))
        );
    }

    #[test]
    fn test_optional_empty_body_uses_default_then_zero() {
        let req = RequestContext::builder(Method::POST, "/").build();
        let vars = ParamVec::new();
        let resolver = RequestBodyResolver::new(crate::binding::default_converters());
        let zero = ParameterDescriptor::body("amount", DeclaredType::Integer).optional();
        assert_eq!(
            resolver.resolve(&zero, &ctx_for(&req, &vars)).unwrap(),
            Argument::Value(json!(0))
        );
        let with_default = ParameterDescriptor::body("note", DeclaredType::String).default_value("none");
        assert_eq!(
            resolver.resolve(&with_default, &ctx_for(&req, &vars)).unwrap(),
            Argument::Value(json!("none"))
        );
    }
}
