//! Declarative route definitions (YAML or JSON).
//!
//! ```yaml
//! routes:
//!   - name: greet
//!     path: /greet/{name}
//!     method: GET
//!     produces: text/plain
//!     parameters:
//!       - { name: name, in: path }
//!       - { name: times, in: query, type: integer, default: 1 }
//!     response:
//!       body: "Hello ${name} x${times}"
//! ```
//!
//! Routes with a `response` template render it from the bound arguments;
//! routes without one echo the bound arguments as JSON.

use anyhow::Context;
use http::Method;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::info;

use super::route::RouteDescriptor;
use super::types::{DeclaredType, ParameterDescriptor, SourceKind};
use crate::binding::{Argument, BoundArguments, Constraint};
use crate::dispatcher::{HandlerResponse, ReturnValue};
use crate::error::RegistrationError;

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(match OneOrMany::deserialize(d)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

/// Simple constraint set for declaratively defined parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConstraintDefinition {
    pub not_null: bool,
    pub not_blank: bool,
    pub email: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<String>,
}

impl ConstraintDefinition {
    fn compile(&self) -> Result<Vec<Constraint>, String> {
        let mut out = Vec::new();
        if self.not_null {
            out.push(Constraint::NotNull);
        }
        if self.not_blank {
            out.push(Constraint::NotBlank);
        }
        if let Some(min) = self.min {
            out.push(Constraint::Min(min));
        }
        if let Some(max) = self.max {
            out.push(Constraint::Max(max));
        }
        if self.min_length.is_some() || self.max_length.is_some() {
            out.push(Constraint::Size {
                min: self.min_length,
                max: self.max_length,
            });
        }
        if let Some(pattern) = &self.pattern {
            out.push(Constraint::pattern(pattern).map_err(|e| e.to_string())?);
        }
        if self.email {
            out.push(Constraint::Email);
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterDefinition {
    pub name: String,
    /// `path`, `query`, `header`, `cookie`, `session`, `model`, `body` or
    /// omitted for implicit resolution.
    #[serde(rename = "in", default)]
    pub source: Option<String>,
    /// Defaults to `string`.
    #[serde(rename = "type", default)]
    pub ty: Option<String>,
    #[serde(default)]
    pub required: Option<bool>,
    /// Scalar default; numbers and booleans are accepted as-is.
    #[serde(default)]
    pub default: Option<Value>,
    /// Request-side name when it differs from `name`.
    #[serde(default)]
    pub binding: Option<String>,
    #[serde(default)]
    pub validate: bool,
    #[serde(default)]
    pub constraints: ConstraintDefinition,
}

impl ParameterDefinition {
    fn to_descriptor(&self) -> Result<ParameterDescriptor, String> {
        let source: SourceKind = self.source.as_deref().unwrap_or("none").parse()?;
        let ty: DeclaredType = self.ty.as_deref().unwrap_or("string").parse()?;
        let mut p = ParameterDescriptor::new(&self.name, ty, source);
        if let Some(binding) = &self.binding {
            p = p.named(binding);
        }
        match self.required {
            Some(true) => p = p.required(),
            Some(false) => p = p.optional(),
            None => {}
        }
        if let Some(default) = &self.default {
            let raw = match default {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            p = p.default_value(&raw);
        }
        if self.validate {
            p = p.validated();
        }
        for c in self.constraints.compile()? {
            p = p.constraint(c);
        }
        Ok(p)
    }
}

fn default_status() -> u16 {
    200
}

/// Response rendered by a declaratively defined route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseTemplate {
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default)]
    pub content_type: Option<String>,
    /// Body text with `${param}` placeholders.
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteDefinition {
    #[serde(default)]
    pub name: Option<String>,
    pub path: String,
    #[serde(default, alias = "method", deserialize_with = "one_or_many")]
    pub methods: Vec<String>,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub consumes: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub produces: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterDefinition>,
    #[serde(default)]
    pub response: Option<ResponseTemplate>,
}

impl RouteDefinition {
    /// Route name, or `METHODS path` when unnamed.
    #[must_use]
    pub fn handler_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None if self.methods.is_empty() => self.path.clone(),
            None => format!("{} {}", self.methods.join(","), self.path),
        }
    }

    /// Build a route whose handler renders the response template.
    ///
    /// # Errors
    ///
    /// `InvalidDefinition` for unknown methods, sources, types or
    /// constraints; pattern and condition errors from the builder.
    pub fn to_descriptor(&self) -> Result<RouteDescriptor, RegistrationError> {
        let handler_name = self.handler_name();
        let invalid = |reason: String| RegistrationError::InvalidDefinition {
            route: handler_name.clone(),
            reason,
        };

        let mut builder = RouteDescriptor::builder(&self.path);
        for m in &self.methods {
            let method = Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes())
                .map_err(|_| invalid(format!("invalid method '{m}'")))?;
            builder = builder.method(method);
        }
        for p in &self.params {
            builder = builder.param(p);
        }
        for h in &self.headers {
            builder = builder.header(h);
        }
        for c in &self.consumes {
            builder = builder.consumes(c);
        }
        for p in &self.produces {
            builder = builder.produces(p);
        }
        for p in &self.parameters {
            builder = builder.parameter(p.to_descriptor().map_err(&invalid)?);
        }
        if let Some(name) = &self.name {
            builder = builder.name(name);
        }

        let template = self.response.clone();
        let produces = self.produces.first().cloned();
        builder
            .handler(&handler_name, move |args: BoundArguments, _req| {
                let Some(template) = &template else {
                    return Ok(ReturnValue::Body(args.to_json()));
                };
                let mut response = HandlerResponse::text(template.status, render_template(&template.body, &args));
                let content_type = template
                    .content_type
                    .clone()
                    .or_else(|| produces.clone())
                    .unwrap_or_else(|| "text/plain".to_string());
                response.set_header("content-type", content_type);
                Ok(ReturnValue::Raw(response))
            })
            .build()
    }
}

/// Substitute `${name}` placeholders with bound argument values.
///
/// Strings are inserted verbatim, other values as JSON text; unknown names
/// render as nothing.
#[must_use]
pub fn render_template(template: &str, args: &BoundArguments) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = after[..end].trim();
        match args.by_name(name).map(Argument::to_json) {
            Some(Value::String(s)) => out.push_str(&s),
            Some(Value::Null) | None => {}
            Some(other) => out.push_str(&other.to_string()),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

/// A route definition file: `routes: [...]`, or a bare list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteFile {
    #[serde(default)]
    pub routes: Vec<RouteDefinition>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RouteDocument {
    File(RouteFile),
    List(Vec<RouteDefinition>),
}

/// Parse route definitions from YAML (a superset of JSON).
///
/// # Errors
///
/// Malformed documents.
pub fn parse_routes(content: &str) -> anyhow::Result<Vec<RouteDefinition>> {
    let doc: RouteDocument = serde_yaml::from_str(content).context("invalid route definition document")?;
    Ok(match doc {
        RouteDocument::File(f) => f.routes,
        RouteDocument::List(l) => l,
    })
}

/// Load route definitions from a `.yaml`/`.yml` or `.json` file.
///
/// # Errors
///
/// I/O and parse failures, with the path in context.
pub fn load_routes(path: impl AsRef<Path>) -> anyhow::Result<Vec<RouteDefinition>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read route file {}", path.display()))?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    );
    let routes = if is_yaml {
        parse_routes(&content)
    } else {
        let doc: RouteDocument = serde_json::from_str(&content).context("invalid route definition document")?;
        Ok(match doc {
            RouteDocument::File(f) => f.routes,
            RouteDocument::List(l) => l,
        })
    }
    .with_context(|| format!("failed to parse route file {}", path.display()))?;

    // L1: Route file loaded
    info!(path = %path.display(), routes = routes.len(), "Route definitions loaded");
    Ok(routes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const YAML: &str = r#"
routes:
  - name: greet
    path: /greet/{name}
    method: GET
    produces: text/plain
    parameters:
      - { name: name, in: path }
      - { name: times, in: query, type: integer, default: 1 }
    response:
      body: "Hello ${name} x${times}"
  - path: /items
    methods: [POST, PUT]
"#;

    #[test]
    fn test_parse_yaml_routes() {
        let routes = parse_routes(YAML).unwrap();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].methods, vec!["GET"]);
        assert_eq!(routes[0].produces, vec!["text/plain"]);
        assert_eq!(routes[1].handler_name(), "POST,PUT /items");

        let route = routes[0].to_descriptor().unwrap();
        assert_eq!(route.parameters().len(), 2);
        assert_eq!(route.parameters()[1].default(), Some("1"));
        assert_eq!(route.name(), Some("greet"));
    }

    #[test]
    fn test_invalid_definitions() {
        let bad_type = RouteDefinition {
            name: Some("x".into()),
            path: "/x".into(),
            methods: vec![],
            params: vec![],
            headers: vec![],
            consumes: vec![],
            produces: vec![],
            parameters: vec![ParameterDefinition {
                name: "id".into(),
                source: Some("query".into()),
                ty: Some("uuid".into()),
                required: None,
                default: None,
                binding: None,
                validate: false,
                constraints: ConstraintDefinition::default(),
            }],
            response: None,
        };
        assert!(matches!(
            bad_type.to_descriptor(),
            Err(RegistrationError::InvalidDefinition { .. })
        ));
    }

    #[test]
    fn test_render_template() {
        let mut args = BoundArguments::new();
        args.push("name", "name", Argument::Value(json!("Ada")));
        args.push("n", "n", Argument::Value(json!(3)));
        assert_eq!(render_template("Hi ${name} (${n}) ${missing}!", &args), "Hi Ada (3) !");
        assert_eq!(render_template("open ${name", &args), "open ${name");
    }

    #[test]
    fn test_load_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes.json");
        std::fs::write(&path, r#"[{"path": "/ping", "method": "GET"}]"#).unwrap();
        let routes = load_routes(&path).unwrap();
        assert_eq!(routes[0].path, "/ping");
        assert!(load_routes(dir.path().join("missing.yaml")).is_err());
    }
}
