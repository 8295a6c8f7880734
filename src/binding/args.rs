use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::ClientError;
use crate::multipart::MultipartFile;

/// One resolved handler argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Value(Value),
    File(MultipartFile),
    Files(Vec<MultipartFile>),
}

impl Argument {
    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Argument::Value(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_file(&self) -> Option<&MultipartFile> {
        match self {
            Argument::File(f) => Some(f),
            Argument::Files(files) => files.first(),
            Argument::Value(_) => None,
        }
    }

    /// JSON view of the argument; files are summarised.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Argument::Value(v) => v.clone(),
            Argument::File(f) => f.describe(),
            Argument::Files(files) => Value::Array(files.iter().map(MultipartFile::describe).collect()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    name: String,
    binding_name: String,
    argument: Argument,
}

/// Resolved arguments in declaration order.
///
/// Lookup by name accepts the parameter name or its binding name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundArguments {
    entries: Vec<Entry>,
}

impl BoundArguments {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &str, binding_name: &str, argument: Argument) {
        self.entries.push(Entry {
            name: name.to_string(),
            binding_name: binding_name.to_string(),
            argument,
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Argument> {
        self.entries.get(index).map(|e| &e.argument)
    }

    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&Argument> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .or_else(|| self.entries.iter().find(|e| e.binding_name == name))
            .map(|e| &e.argument)
    }

    #[must_use]
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.by_name(name).and_then(Argument::as_value)
    }

    #[must_use]
    pub fn str(&self, name: &str) -> Option<&str> {
        self.value(name).and_then(Value::as_str)
    }

    #[must_use]
    pub fn i64(&self, name: &str) -> Option<i64> {
        self.value(name).and_then(Value::as_i64)
    }

    #[must_use]
    pub fn file(&self, name: &str) -> Option<&MultipartFile> {
        self.by_name(name).and_then(Argument::as_file)
    }

    /// Deserialize one argument into a concrete type.
    ///
    /// # Errors
    ///
    /// A [`ClientError`] when the argument is missing or has the wrong shape.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<T> {
        let value = self
            .by_name(name)
            .map(Argument::to_json)
            .ok_or_else(|| ClientError::bad_request(format!("missing argument '{name}'")))?;
        serde_json::from_value(value)
            .map_err(|e| ClientError::bad_request(format!("argument '{name}': {e}")).into())
    }

    /// `(parameter name, argument)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Argument)> {
        self.entries.iter().map(|e| (e.name.as_str(), &e.argument))
    }

    /// All arguments as one JSON object keyed by parameter name.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut map = Map::with_capacity(self.entries.len());
        for e in &self.entries {
            map.insert(e.name.clone(), e.argument.to_json());
        }
        Value::Object(map)
    }
}
