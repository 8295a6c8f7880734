use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::binding::{Constraint, ObjectConstraint};

/// Where a parameter's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    PathVariable,
    QueryParam,
    Header,
    Cookie,
    SessionAttribute,
    ModelAttribute,
    Body,
    /// No explicit source: resolved by the fallback strategies.
    None,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceKind::PathVariable => "path",
            SourceKind::QueryParam => "query",
            SourceKind::Header => "header",
            SourceKind::Cookie => "cookie",
            SourceKind::SessionAttribute => "session",
            SourceKind::ModelAttribute => "model",
            SourceKind::Body => "body",
            SourceKind::None => "none",
        };
        write!(f, "{s}")
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "path" | "path_variable" => Ok(SourceKind::PathVariable),
            "query" | "param" | "query_param" => Ok(SourceKind::QueryParam),
            "header" => Ok(SourceKind::Header),
            "cookie" => Ok(SourceKind::Cookie),
            "session" | "session_attribute" => Ok(SourceKind::SessionAttribute),
            "model" | "model_attribute" => Ok(SourceKind::ModelAttribute),
            "body" => Ok(SourceKind::Body),
            "none" | "" => Ok(SourceKind::None),
            other => Err(format!("unknown parameter source '{other}'")),
        }
    }
}

/// The type a handler declares for a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum DeclaredType {
    String,
    Integer,
    Float,
    Boolean,
    List(Box<DeclaredType>),
    Map,
    Composite(Arc<CompositeType>),
    /// Arbitrary JSON, taken as-is.
    Json,
    File,
    /// The request model itself.
    Model,
}

impl DeclaredType {
    #[must_use]
    pub fn list_of(inner: DeclaredType) -> Self {
        DeclaredType::List(Box::new(inner))
    }

    /// Scalars convertible from a single string.
    #[must_use]
    pub fn is_simple(&self) -> bool {
        matches!(
            self,
            DeclaredType::String | DeclaredType::Integer | DeclaredType::Float | DeclaredType::Boolean
        )
    }

    #[must_use]
    pub fn is_simple_or_list_of_simple(&self) -> bool {
        match self {
            DeclaredType::List(inner) => inner.is_simple(),
            other => other.is_simple(),
        }
    }

    /// `File` or a list of files.
    #[must_use]
    pub fn is_file(&self) -> bool {
        match self {
            DeclaredType::File => true,
            DeclaredType::List(inner) => matches!(inner.as_ref(), DeclaredType::File),
            _ => false,
        }
    }

    #[must_use]
    pub fn is_list(&self) -> bool {
        matches!(self, DeclaredType::List(_))
    }

    #[must_use]
    pub fn composite(&self) -> Option<&CompositeType> {
        match self {
            DeclaredType::Composite(c) => Some(c),
            _ => None,
        }
    }

    /// Value an optional parameter takes when nothing was supplied.
    #[must_use]
    pub fn zero_value(&self) -> Value {
        match self {
            DeclaredType::String => Value::String(String::new()),
            DeclaredType::Integer => Value::from(0),
            DeclaredType::Float => Value::from(0.0),
            DeclaredType::Boolean => Value::Bool(false),
            DeclaredType::List(_) => Value::Array(Vec::new()),
            DeclaredType::Map | DeclaredType::Model => Value::Object(Map::new()),
            DeclaredType::Composite(c) => c.zero_value(),
            DeclaredType::Json | DeclaredType::File => Value::Null,
        }
    }
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclaredType::String => write!(f, "string"),
            DeclaredType::Integer => write!(f, "integer"),
            DeclaredType::Float => write!(f, "float"),
            DeclaredType::Boolean => write!(f, "boolean"),
            DeclaredType::List(inner) => write!(f, "list<{inner}>"),
            DeclaredType::Map => write!(f, "map"),
            DeclaredType::Composite(c) => write!(f, "{}", c.name),
            DeclaredType::Json => write!(f, "json"),
            DeclaredType::File => write!(f, "file"),
            DeclaredType::Model => write!(f, "model"),
        }
    }
}

impl FromStr for DeclaredType {
    type Err = String;

    /// Parses the simple type names used in route definition files:
    /// `string`, `integer`, `float`, `boolean`, `map`, `json`, `file`,
    /// `model` and `list<...>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(inner) = s
            .strip_prefix("list<")
            .and_then(|rest| rest.strip_suffix('>'))
        {
            return Ok(DeclaredType::list_of(inner.parse()?));
        }
        match s.to_ascii_lowercase().as_str() {
            "string" | "str" => Ok(DeclaredType::String),
            "integer" | "int" | "long" => Ok(DeclaredType::Integer),
            "float" | "double" | "number" => Ok(DeclaredType::Float),
            "boolean" | "bool" => Ok(DeclaredType::Boolean),
            "map" => Ok(DeclaredType::Map),
            "json" | "object" => Ok(DeclaredType::Json),
            "file" => Ok(DeclaredType::File),
            "model" => Ok(DeclaredType::Model),
            other => Err(format!("unknown declared type '{other}'")),
        }
    }
}

/// One property of a [`CompositeType`].
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub ty: DeclaredType,
    pub constraints: Vec<Constraint>,
}

/// A structured type bound field-by-field (form objects, JSON bodies).
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeType {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
    pub object_constraints: Vec<ObjectConstraint>,
}

impl CompositeType {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            object_constraints: Vec::new(),
        }
    }

    #[must_use]
    pub fn field(self, name: &str, ty: DeclaredType) -> Self {
        self.field_with(name, ty, Vec::new())
    }

    #[must_use]
    pub fn field_with(mut self, name: &str, ty: DeclaredType, constraints: Vec<Constraint>) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.to_string(),
            ty,
            constraints,
        });
        self
    }

    #[must_use]
    pub fn object_constraint(mut self, constraint: ObjectConstraint) -> Self {
        self.object_constraints.push(constraint);
        self
    }

    #[must_use]
    pub fn into_type(self) -> DeclaredType {
        DeclaredType::Composite(Arc::new(self))
    }

    /// Object with every field at its zero value.
    #[must_use]
    pub fn zero_value(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|f| (f.name.clone(), f.ty.zero_value()))
                .collect(),
        )
    }
}

/// Metadata for one handler parameter, built once at registration.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDescriptor {
    name: String,
    declared_type: DeclaredType,
    source: SourceKind,
    binding_name: Option<String>,
    required: bool,
    default_value: Option<String>,
    validate: bool,
    constraints: Vec<Constraint>,
}

impl ParameterDescriptor {
    /// Generic constructor. Parameters are required unless their source is
    /// `None` or `ModelAttribute`.
    #[must_use]
    pub fn new(name: &str, declared_type: DeclaredType, source: SourceKind) -> Self {
        Self {
            name: name.to_string(),
            declared_type,
            source,
            binding_name: None,
            required: !matches!(source, SourceKind::None | SourceKind::ModelAttribute),
            default_value: None,
            validate: false,
            constraints: Vec::new(),
        }
    }

    #[must_use]
    pub fn path_variable(name: &str, ty: DeclaredType) -> Self {
        Self::new(name, ty, SourceKind::PathVariable)
    }

    #[must_use]
    pub fn query(name: &str, ty: DeclaredType) -> Self {
        Self::new(name, ty, SourceKind::QueryParam)
    }

    #[must_use]
    pub fn header(name: &str, ty: DeclaredType) -> Self {
        Self::new(name, ty, SourceKind::Header)
    }

    #[must_use]
    pub fn cookie(name: &str, ty: DeclaredType) -> Self {
        Self::new(name, ty, SourceKind::Cookie)
    }

    #[must_use]
    pub fn session_attribute(name: &str, ty: DeclaredType) -> Self {
        Self::new(name, ty, SourceKind::SessionAttribute)
    }

    #[must_use]
    pub fn model_attribute(name: &str, ty: DeclaredType) -> Self {
        Self::new(name, ty, SourceKind::ModelAttribute)
    }

    #[must_use]
    pub fn body(name: &str, ty: DeclaredType) -> Self {
        Self::new(name, ty, SourceKind::Body)
    }

    /// Parameter without an explicit source.
    #[must_use]
    pub fn implicit(name: &str, ty: DeclaredType) -> Self {
        Self::new(name, ty, SourceKind::None)
    }

    /// Bind from a differently named request value.
    #[must_use]
    pub fn named(mut self, binding_name: &str) -> Self {
        self.binding_name = Some(binding_name.to_string());
        self
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// A default makes the parameter optional.
    #[must_use]
    pub fn default_value(mut self, value: &str) -> Self {
        self.default_value = Some(value.to_string());
        self.required = false;
        self
    }

    #[must_use]
    pub fn validated(mut self) -> Self {
        self.validate = true;
        self
    }

    #[must_use]
    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Explicit binding name, falling back to the parameter name.
    #[must_use]
    pub fn binding_name(&self) -> &str {
        self.binding_name.as_deref().unwrap_or(&self.name)
    }

    #[must_use]
    pub fn has_explicit_name(&self) -> bool {
        self.binding_name.is_some()
    }

    #[must_use]
    pub fn declared_type(&self) -> &DeclaredType {
        &self.declared_type
    }

    #[must_use]
    pub fn source(&self) -> SourceKind {
        self.source
    }

    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }

    #[must_use]
    pub fn default(&self) -> Option<&str> {
        self.default_value.as_deref()
    }

    #[must_use]
    pub fn should_validate(&self) -> bool {
        self.validate
    }

    #[must_use]
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }
}
