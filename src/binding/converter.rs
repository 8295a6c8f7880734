//! Message converters: request bodies in, response bodies out.

use anyhow::{bail, Context};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::convert::{conform, convert_values};
use crate::dispatcher::ResponseBody;
use crate::mapping::{DeclaredType, ParameterDescriptor};
use crate::media::MediaType;

/// Reads a body of some media type into a declared type, and writes values
/// back out.
pub trait MessageConverter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Media types this converter reads and writes, most preferred first.
    fn supported_media_types(&self) -> Vec<MediaType>;

    fn can_read(&self, ty: &DeclaredType, media: &MediaType) -> bool;

    /// # Errors
    ///
    /// The body does not parse or does not fit `ty`.
    fn read(&self, ty: &DeclaredType, body: &[u8], media: &MediaType) -> anyhow::Result<Value>;

    fn can_write(&self, value: &Value, media: &MediaType) -> bool;

    /// # Errors
    ///
    /// Serialization failures.
    fn write(&self, value: &Value, media: &MediaType) -> anyhow::Result<ResponseBody>;
}

fn supports(supported: &[MediaType], media: &MediaType) -> bool {
    supported.iter().any(|s| s.includes(media))
}

/// `application/json` and `application/*+json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonMessageConverter;

impl MessageConverter for JsonMessageConverter {
    fn name(&self) -> &'static str {
        "json"
    }

    fn supported_media_types(&self) -> Vec<MediaType> {
        vec![MediaType::application_json(), MediaType::new("application", "*+json")]
    }

    fn can_read(&self, ty: &DeclaredType, media: &MediaType) -> bool {
        !ty.is_file() && supports(&self.supported_media_types(), media)
    }

    fn read(&self, ty: &DeclaredType, body: &[u8], _media: &MediaType) -> anyhow::Result<Value> {
        let value: Value = serde_json::from_slice(body).context("JSON parse error")?;
        conform("body", value, ty).map_err(|e| anyhow::anyhow!("JSON does not match {ty}: {}", e.message))
    }

    fn can_write(&self, _value: &Value, media: &MediaType) -> bool {
        media.is_wildcard_type() || supports(&self.supported_media_types(), media)
    }

    fn write(&self, value: &Value, _media: &MediaType) -> anyhow::Result<ResponseBody> {
        Ok(ResponseBody::Json(value.clone()))
    }
}

/// `application/x-www-form-urlencoded` into maps, composites or strings.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormMessageConverter;

impl MessageConverter for FormMessageConverter {
    fn name(&self) -> &'static str {
        "form"
    }

    fn supported_media_types(&self) -> Vec<MediaType> {
        vec![MediaType::form_urlencoded()]
    }

    fn can_read(&self, ty: &DeclaredType, media: &MediaType) -> bool {
        matches!(ty, DeclaredType::Map | DeclaredType::Composite(_) | DeclaredType::String)
            && supports(&self.supported_media_types(), media)
    }

    fn read(&self, ty: &DeclaredType, body: &[u8], _media: &MediaType) -> anyhow::Result<Value> {
        if matches!(ty, DeclaredType::String) {
            return Ok(Value::String(String::from_utf8_lossy(body).into_owned()));
        }
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(body).into_owned().collect();
        match ty {
            DeclaredType::Composite(c) => {
                let mut out = Map::new();
                for field in &c.fields {
                    let values: Vec<&str> = pairs
                        .iter()
                        .filter(|(k, _)| *k == field.name)
                        .map(|(_, v)| v.as_str())
                        .collect();
                    let value = if values.is_empty() {
                        field.ty.zero_value()
                    } else {
                        let p = ParameterDescriptor::implicit(&field.name, field.ty.clone());
                        convert_values(&p, &values).map_err(|e| anyhow::anyhow!(e.message))?
                    };
                    out.insert(field.name.clone(), value);
                }
                Ok(Value::Object(out))
            }
            _ => {
                // Multi-valued fields become arrays.
                let mut out = Map::new();
                for (k, v) in pairs {
                    match out.get_mut(&k) {
                        Some(Value::Array(items)) => items.push(Value::String(v)),
                        Some(existing) => {
                            let first = existing.take();
                            *existing = Value::Array(vec![first, Value::String(v)]);
                        }
                        None => {
                            out.insert(k, Value::String(v));
                        }
                    }
                }
                Ok(Value::Object(out))
            }
        }
    }

    fn can_write(&self, _value: &Value, _media: &MediaType) -> bool {
        false
    }

    fn write(&self, _value: &Value, media: &MediaType) -> anyhow::Result<ResponseBody> {
        bail!("form converter cannot write {media}")
    }
}

/// `text/plain` (reads any media type into a `String` parameter).
#[derive(Debug, Default, Clone, Copy)]
pub struct StringMessageConverter;

impl MessageConverter for StringMessageConverter {
    fn name(&self) -> &'static str {
        "string"
    }

    fn supported_media_types(&self) -> Vec<MediaType> {
        vec![MediaType::text_plain(), MediaType::all()]
    }

    fn can_read(&self, ty: &DeclaredType, _media: &MediaType) -> bool {
        matches!(ty, DeclaredType::String)
    }

    fn read(&self, _ty: &DeclaredType, body: &[u8], _media: &MediaType) -> anyhow::Result<Value> {
        let text = std::str::from_utf8(body).context("body is not valid UTF-8")?;
        Ok(Value::String(text.to_string()))
    }

    fn can_write(&self, value: &Value, media: &MediaType) -> bool {
        value.is_string() && (media.kind() == "text" || media.is_wildcard_type())
    }

    fn write(&self, value: &Value, _media: &MediaType) -> anyhow::Result<ResponseBody> {
        match value {
            Value::String(s) => Ok(ResponseBody::Text(s.clone())),
            other => Ok(ResponseBody::Text(other.to_string())),
        }
    }
}

/// Default converter chain: form, JSON, then plain text.
#[must_use]
pub fn default_converters() -> Vec<Arc<dyn MessageConverter>> {
    vec![
        Arc::new(FormMessageConverter),
        Arc::new(JsonMessageConverter),
        Arc::new(StringMessageConverter),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::CompositeType;
    use serde_json::json;

    #[test]
    fn test_json_reads_composite() {
        let ty = CompositeType::new("Pet").field("name", DeclaredType::String).into_type();
        let c = JsonMessageConverter;
        let media = MediaType::new("application", "vnd.pet+json");
        assert!(c.can_read(&ty, &media));
        assert_eq!(c.read(&ty, br#"{"name":"rex"}"#, &media).unwrap(), json!({"name": "rex"}));
        assert!(c.read(&ty, b"{broken", &media).is_err());
        assert!(c.read(&ty, b"[1]", &media).is_err());
    }

    #[test]
    fn test_form_reads_map_with_repeats() {
        let c = FormMessageConverter;
        let v = c
            .read(&DeclaredType::Map, b"a=1&b=2&a=3", &MediaType::form_urlencoded())
            .unwrap();
        assert_eq!(v, json!({"a": ["1", "3"], "b": "2"}));
    }

    #[test]
    fn test_string_reads_only_strings() {
        let c = StringMessageConverter;
        assert!(c.can_read(&DeclaredType::String, &MediaType::octet_stream()));
        assert!(!c.can_read(&DeclaredType::Integer, &MediaType::text_plain()));
        assert!(c.can_write(&json!("hi"), &MediaType::text_plain()));
        assert!(!c.can_write(&json!({"a": 1}), &MediaType::text_plain()));
    }
}
