//! Declarative constraints checked after binding.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::error::BindingError;
use crate::mapping::{DeclaredType, ParameterDescriptor};

static EMAIL: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

/// Constraint on a single value. `null` satisfies everything except
/// `NotNull` and `NotBlank`.
#[derive(Clone)]
pub enum Constraint {
    NotNull,
    NotBlank,
    Min(f64),
    Max(f64),
    /// Length of strings, arrays and objects.
    Size { min: Option<usize>, max: Option<usize> },
    /// Full match of a string value.
    Pattern(Regex),
    Email,
}

impl Constraint {
    /// Compile a `Pattern` constraint (anchored).
    ///
    /// # Errors
    ///
    /// The regex compile error.
    pub fn pattern(expr: &str) -> Result<Self, regex::Error> {
        Regex::new(&format!("^(?:{expr})$")).map(Constraint::Pattern)
    }

    /// `Ok(())` or the violation message.
    ///
    /// # Errors
    ///
    /// The message describing the violation.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        match self {
            Constraint::NotNull => {
                if value.is_null() {
                    return Err("must not be null".into());
                }
            }
            Constraint::NotBlank => {
                let blank = match value {
                    Value::Null => true,
                    Value::String(s) => s.trim().is_empty(),
                    _ => false,
                };
                if blank {
                    return Err("must not be blank".into());
                }
            }
            Constraint::Min(min) => {
                if let Some(n) = value.as_f64() {
                    if n < *min {
                        return Err(format!("must be greater than or equal to {min}"));
                    }
                }
            }
            Constraint::Max(max) => {
                if let Some(n) = value.as_f64() {
                    if n > *max {
                        return Err(format!("must be less than or equal to {max}"));
                    }
                }
            }
            Constraint::Size { min, max } => {
                let len = match value {
                    Value::String(s) => Some(s.chars().count()),
                    Value::Array(a) => Some(a.len()),
                    Value::Object(o) => Some(o.len()),
                    _ => None,
                };
                if let Some(len) = len {
                    let lo = min.unwrap_or(0);
                    let hi = max.unwrap_or(usize::MAX);
                    if len < lo || len > hi {
                        return Err(match max {
                            Some(hi) => format!("size must be between {lo} and {hi}"),
                            None => format!("size must be at least {lo}"),
                        });
                    }
                }
            }
            Constraint::Pattern(re) => {
                if let Some(s) = value.as_str() {
                    if !re.is_match(s) {
                        return Err(format!("must match \"{}\"", pattern_source(re)));
                    }
                }
            }
            Constraint::Email => {
                if let Some(s) = value.as_str() {
                    let ok = s.is_empty() || EMAIL.as_ref().is_some_and(|re| re.is_match(s));
                    if !ok {
                        return Err("must be a well-formed email address".into());
                    }
                }
            }
        }
        Ok(())
    }
}

fn pattern_source(re: &Regex) -> &str {
    re.as_str()
        .strip_prefix("^(?:")
        .and_then(|s| s.strip_suffix(")$"))
        .unwrap_or(re.as_str())
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::NotNull => write!(f, "NotNull"),
            Constraint::NotBlank => write!(f, "NotBlank"),
            Constraint::Min(v) => write!(f, "Min({v})"),
            Constraint::Max(v) => write!(f, "Max({v})"),
            Constraint::Size { min, max } => write!(f, "Size({min:?}, {max:?})"),
            Constraint::Pattern(re) => write!(f, "Pattern({})", pattern_source(re)),
            Constraint::Email => write!(f, "Email"),
        }
    }
}

impl PartialEq for Constraint {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Constraint::Pattern(a), Constraint::Pattern(b)) => a.as_str() == b.as_str(),
            (Constraint::Min(a), Constraint::Min(b)) | (Constraint::Max(a), Constraint::Max(b)) => a == b,
            (Constraint::Size { min: a, max: b }, Constraint::Size { min: c, max: d }) => a == c && b == d,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

type ObjectCheck = dyn Fn(&Value) -> Result<(), String> + Send + Sync;

/// Constraint over a whole composite value.
#[derive(Clone)]
pub enum ObjectConstraint {
    /// Two fields must hold equal values (e.g. password confirmation).
    FieldsEqual { first: String, second: String },
    Custom { name: String, check: Arc<ObjectCheck> },
}

impl ObjectConstraint {
    #[must_use]
    pub fn fields_equal(first: &str, second: &str) -> Self {
        ObjectConstraint::FieldsEqual {
            first: first.to_string(),
            second: second.to_string(),
        }
    }

    pub fn custom<F>(name: &str, check: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        ObjectConstraint::Custom {
            name: name.to_string(),
            check: Arc::new(check),
        }
    }

    /// # Errors
    ///
    /// The violation message.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        match self {
            ObjectConstraint::FieldsEqual { first, second } => {
                if value.get(first) != value.get(second) {
                    return Err(format!("'{first}' and '{second}' must match"));
                }
                Ok(())
            }
            ObjectConstraint::Custom { check, .. } => check(value),
        }
    }
}

impl fmt::Debug for ObjectConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectConstraint::FieldsEqual { first, second } => {
                write!(f, "FieldsEqual({first}, {second})")
            }
            ObjectConstraint::Custom { name, .. } => write!(f, "Custom({name})"),
        }
    }
}

impl PartialEq for ObjectConstraint {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                ObjectConstraint::FieldsEqual { first: a, second: b },
                ObjectConstraint::FieldsEqual { first: c, second: d },
            ) => a == c && b == d,
            (ObjectConstraint::Custom { name: a, .. }, ObjectConstraint::Custom { name: b, .. }) => a == b,
            _ => false,
        }
    }
}

/// Check a bound value against the parameter's own constraints, then the
/// composite field constraints in declaration order, then object-level
/// constraints. The first violation wins.
///
/// # Errors
///
/// A `Validation` [`BindingError`] naming the failing field.
pub fn validate_value(param: &ParameterDescriptor, value: &Value) -> Result<(), BindingError> {
    let pname = param.binding_name();
    for c in param.constraints() {
        c.check(value)
            .map_err(|msg| BindingError::validation(pname, pname, msg))?;
    }
    if let DeclaredType::Composite(composite) = param.declared_type() {
        for field in &composite.fields {
            let field_value = value.get(&field.name).unwrap_or(&Value::Null);
            for c in &field.constraints {
                c.check(field_value)
                    .map_err(|msg| BindingError::validation(pname, &field.name, msg))?;
            }
        }
        for c in &composite.object_constraints {
            c.check(value)
                .map_err(|msg| BindingError::validation(pname, pname, msg))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BindingErrorKind;
    use crate::mapping::CompositeType;
    use serde_json::json;

    #[test]
    fn test_scalar_constraints() {
        assert!(Constraint::NotBlank.check(&json!("  ")).is_err());
        assert!(Constraint::NotNull.check(&Value::Null).is_err());
        assert!(Constraint::Min(1.0).check(&json!(0)).is_err());
        assert!(Constraint::Max(10.0).check(&json!(10)).is_ok());
        assert!(Constraint::Size { min: Some(2), max: Some(3) }.check(&json!("a")).is_err());
        assert!(Constraint::pattern(r"[a-z]+").unwrap().check(&json!("abc1")).is_err());
        assert!(Constraint::Email.check(&json!("ada@example.com")).is_ok());
        assert_eq!(
            Constraint::Email.check(&json!("nope")),
            Err("must be a well-formed email address".to_string())
        );
        assert!(Constraint::Min(1.0).check(&Value::Null).is_ok());
    }

    #[test]
    fn test_first_field_violation_wins() {
        let ty = CompositeType::new("Signup")
            .field_with("name", DeclaredType::String, vec![Constraint::NotBlank])
            .field_with("email", DeclaredType::String, vec![Constraint::Email])
            .field("password", DeclaredType::String)
            .field("confirm", DeclaredType::String)
            .object_constraint(ObjectConstraint::fields_equal("password", "confirm"))
            .into_type();
        let param = ParameterDescriptor::model_attribute("signup", ty).validated();

        let err = validate_value(&param, &json!({"name": "", "email": "bad"})).unwrap_err();
        assert_eq!(err.kind, BindingErrorKind::Validation);
        assert_eq!(err.field.as_deref(), Some("name"));

        let err = validate_value(
            &param,
            &json!({"name": "a", "email": "a@b.io", "password": "x", "confirm": "y"}),
        )
        .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("signup"));

        assert!(validate_value(
            &param,
            &json!({"name": "a", "email": "a@b.io", "password": "x", "confirm": "x"})
        )
        .is_ok());
    }
}
