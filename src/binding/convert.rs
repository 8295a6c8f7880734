//! String-to-typed conversion for named values.
//!
//! Several values for a scalar are joined with commas before conversion;
//! list types split comma-separated values as well as taking repeats.

use serde_json::{Map, Number, Value};

use crate::error::BindingError;
use crate::mapping::{DeclaredType, ParameterDescriptor};

/// Convert one raw string to a scalar of `ty`.
///
/// # Errors
///
/// `TypeMismatch` naming `parameter`.
pub fn convert_scalar(parameter: &str, raw: &str, ty: &DeclaredType) -> Result<Value, BindingError> {
    let mismatch = || BindingError::type_mismatch(parameter, raw, &ty.to_string());
    match ty {
        DeclaredType::String => Ok(Value::String(raw.to_string())),
        DeclaredType::Integer => raw
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| mismatch()),
        DeclaredType::Float => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(mismatch),
        DeclaredType::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "on" | "yes" | "1" => Ok(Value::Bool(true)),
            "false" | "off" | "no" | "0" => Ok(Value::Bool(false)),
            _ => Err(mismatch()),
        },
        DeclaredType::Json => Ok(serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))),
        _ => Err(mismatch()),
    }
}

/// Convert every value supplied for a parameter to its declared type.
///
/// # Errors
///
/// `TypeMismatch` for the first value that does not convert.
pub fn convert_values(param: &ParameterDescriptor, values: &[&str]) -> Result<Value, BindingError> {
    let name = param.binding_name();
    match param.declared_type() {
        DeclaredType::List(inner) => values
            .iter()
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| convert_scalar(name, v, inner))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        ty => convert_scalar(name, &values.join(","), ty),
    }
}

/// Treat an empty string as "no value" for every type except `String`.
fn is_effectively_absent(ty: &DeclaredType, values: &[&str]) -> bool {
    values.is_empty()
        || (!matches!(ty, DeclaredType::String) && values.iter().all(|v| v.trim().is_empty()))
}

/// Shared missing-value policy for named values (params, headers, cookies,
/// path variables): convert what was supplied, else the default, else the
/// zero value, else `missing()` for required parameters.
///
/// # Errors
///
/// `missing()` for absent required values, `TypeMismatch` on conversion.
pub fn resolve_named(
    param: &ParameterDescriptor,
    values: &[&str],
    missing: impl FnOnce() -> BindingError,
) -> Result<Value, BindingError> {
    if !is_effectively_absent(param.declared_type(), values) {
        return convert_values(param, values);
    }
    if param.default().is_none() && param.is_required() {
        return Err(missing());
    }
    default_or_zero(param)
}

/// Value of an absent optional parameter: its converted default, else the
/// zero value of its declared type.
///
/// # Errors
///
/// `TypeMismatch` when the default does not convert.
pub fn default_or_zero(param: &ParameterDescriptor) -> Result<Value, BindingError> {
    match param.default() {
        Some(default) => convert_values(param, &[default]),
        None => Ok(param.declared_type().zero_value()),
    }
}

/// Coerce an already structured JSON value (session attribute, parsed
/// body) to the declared type: strings convert like request values,
/// composites get missing fields filled with zero values.
///
/// # Errors
///
/// `TypeMismatch` when the shape cannot be reconciled.
pub fn conform(parameter: &str, value: Value, ty: &DeclaredType) -> Result<Value, BindingError> {
    let mismatch = |v: &Value| BindingError::type_mismatch(parameter, &v.to_string(), &ty.to_string());
    match (ty, value) {
        (_, Value::Null) => Ok(Value::Null),
        (DeclaredType::Json | DeclaredType::File, v) => Ok(v),
        (DeclaredType::String, Value::String(s)) => Ok(Value::String(s)),
        (DeclaredType::String, v @ (Value::Number(_) | Value::Bool(_))) => Ok(Value::String(v.to_string())),
        (DeclaredType::Integer, Value::Number(n)) if n.is_i64() => Ok(Value::Number(n)),
        (DeclaredType::Float, Value::Number(n)) => Ok(Value::Number(n)),
        (DeclaredType::Boolean, Value::Bool(b)) => Ok(Value::Bool(b)),
        (t, Value::String(s)) if t.is_simple() => convert_scalar(parameter, &s, t),
        (DeclaredType::List(inner), Value::Array(items)) => items
            .into_iter()
            .map(|item| conform(parameter, item, inner))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        (DeclaredType::Map | DeclaredType::Model, Value::Object(o)) => Ok(Value::Object(o)),
        (DeclaredType::Composite(c), Value::Object(mut obj)) => {
            let mut out = Map::with_capacity(c.fields.len());
            for field in &c.fields {
                let v = match obj.remove(&field.name) {
                    Some(v) => conform(&field.name, v, &field.ty)?,
                    None => field.ty.zero_value(),
                };
                out.insert(field.name.clone(), v);
            }
            Ok(Value::Object(out))
        }
        (_, v) => Err(mismatch(&v)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BindingErrorKind;
    use crate::mapping::CompositeType;
    use serde_json::json;

    #[test]
    fn test_scalar_conversion() {
        assert_eq!(convert_scalar("n", " 42 ", &DeclaredType::Integer), Ok(json!(42)));
        assert_eq!(convert_scalar("b", "on", &DeclaredType::Boolean), Ok(json!(true)));
        assert_eq!(convert_scalar("f", "2.5", &DeclaredType::Float), Ok(json!(2.5)));
        let err = convert_scalar("n", "abc", &DeclaredType::Integer).unwrap_err();
        assert_eq!(err.kind, BindingErrorKind::TypeMismatch);
        assert_eq!(err.parameter, "n");
    }

    #[test]
    fn test_multi_values_collapse() {
        let scalar = ParameterDescriptor::query("tag", DeclaredType::String);
        assert_eq!(convert_values(&scalar, &["a", "b"]), Ok(json!("a,b")));

        let list = ParameterDescriptor::query("ids", DeclaredType::list_of(DeclaredType::Integer));
        assert_eq!(convert_values(&list, &["1,2", "3"]), Ok(json!([1, 2, 3])));
    }

    #[test]
    fn test_missing_policy() {
        let required = ParameterDescriptor::query("id", DeclaredType::Integer);
        let err = resolve_named(&required, &[], || BindingError::missing_value("id", "request parameter"))
            .unwrap_err();
        assert_eq!(err.kind, BindingErrorKind::MissingValue);

        let defaulted = ParameterDescriptor::query("page", DeclaredType::Integer).default_value("1");
        assert_eq!(resolve_named(&defaulted, &[""], || unreachable!()), Ok(json!(1)));

        let optional = ParameterDescriptor::query("q", DeclaredType::String).optional();
        assert_eq!(resolve_named(&optional, &[], || unreachable!()), Ok(json!("")));
    }

    #[test]
    fn test_conform_fills_composite() {
        let ty = CompositeType::new("Item")
            .field("name", DeclaredType::String)
            .field("qty", DeclaredType::Integer)
            .into_type();
        assert_eq!(
            conform("item", json!({"name": "pen", "extra": true}), &ty),
            Ok(json!({"name": "pen", "qty": 0}))
        );
        assert!(conform("item", json!([1]), &ty).is_err());
        assert_eq!(conform("n", json!("5"), &DeclaredType::Integer), Ok(json!(5)));
    }
}
