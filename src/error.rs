//! Error taxonomy for matching, binding and registration.
//!
//! Matching and binding errors are per-request and map to a structured error
//! response. Registration errors are configuration bugs: they abort the
//! registration of the offending route and never surface at request time.

use http::{Method, StatusCode};
use std::fmt;

use crate::media::MediaType;

/// Why a request could not be matched to exactly one route.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchError {
    /// No registered pattern is compatible with the request path.
    NotFound { path: String },
    /// Some pattern matches the path, but none accepts the method.
    MethodNotAllowed { method: Method, allowed: Vec<Method> },
    /// Path and method match, but declared param/header conditions do not.
    UnsatisfiedConditions { conditions: Vec<String> },
    /// The request content type is not consumed by any candidate.
    UnsupportedMediaType {
        content_type: Option<MediaType>,
        supported: Vec<MediaType>,
    },
    /// No candidate produces anything the client accepts.
    NotAcceptable { acceptable: Vec<MediaType> },
    /// Two or more candidates tie on specificity. Configuration bug.
    AmbiguousMapping { path: String, handlers: Vec<String> },
}

impl MatchError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            MatchError::NotFound { .. } => StatusCode::NOT_FOUND,
            MatchError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            MatchError::UnsatisfiedConditions { .. } => StatusCode::BAD_REQUEST,
            MatchError::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            MatchError::NotAcceptable { .. } => StatusCode::NOT_ACCEPTABLE,
            MatchError::AmbiguousMapping { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Ambiguity is a route authoring mistake, not a client error.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, MatchError::AmbiguousMapping { .. })
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for MatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchError::NotFound { path } => write!(f, "No mapping for {path}"),
            MatchError::MethodNotAllowed { method, allowed } => write!(
                f,
                "Request method '{method}' is not supported; allowed: {}",
                join(allowed)
            ),
            MatchError::UnsatisfiedConditions { conditions } => write!(
                f,
                "Request does not satisfy mapping conditions: {}",
                conditions.join(" OR ")
            ),
            MatchError::UnsupportedMediaType {
                content_type,
                supported,
            } => write!(
                f,
                "Content type '{}' is not supported; supported: {}",
                content_type
                    .as_ref()
                    .map_or_else(|| "<none>".to_string(), ToString::to_string),
                join(supported)
            ),
            MatchError::NotAcceptable { acceptable } => write!(
                f,
                "No acceptable representation; producible: {}",
                join(acceptable)
            ),
            MatchError::AmbiguousMapping { path, handlers } => write!(
                f,
                "Ambiguous handler methods mapped for '{path}': {}",
                handlers.join(", ")
            ),
        }
    }
}

impl std::error::Error for MatchError {}

/// Classification of a per-parameter binding failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingErrorKind {
    MissingPathVariable,
    /// Missing query param, header or cookie.
    MissingValue,
    MissingSessionAttribute,
    MessageNotReadable,
    UnsupportedMediaType,
    TypeMismatch,
    Validation,
}

impl BindingErrorKind {
    #[must_use]
    pub fn status(self) -> StatusCode {
        match self {
            // The mapping declared a variable the pattern cannot supply.
            BindingErrorKind::MissingPathVariable => StatusCode::INTERNAL_SERVER_ERROR,
            BindingErrorKind::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl fmt::Display for BindingErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BindingErrorKind::MissingPathVariable => "MissingPathVariable",
            BindingErrorKind::MissingValue => "MissingValue",
            BindingErrorKind::MissingSessionAttribute => "MissingSessionAttribute",
            BindingErrorKind::MessageNotReadable => "MessageNotReadable",
            BindingErrorKind::UnsupportedMediaType => "UnsupportedMediaType",
            BindingErrorKind::TypeMismatch => "TypeMismatch",
            BindingErrorKind::Validation => "Validation",
        };
        write!(f, "{s}")
    }
}

/// A parameter that could not be resolved, converted or validated.
///
/// For validation failures `field` names the failing property (or the
/// object itself for object-level errors).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingError {
    pub kind: BindingErrorKind,
    pub parameter: String,
    pub field: Option<String>,
    pub message: String,
}

impl BindingError {
    #[must_use]
    pub fn new(kind: BindingErrorKind, parameter: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            parameter: parameter.to_string(),
            field: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn missing_path_variable(parameter: &str) -> Self {
        Self::new(
            BindingErrorKind::MissingPathVariable,
            parameter,
            format!("Required URI template variable '{parameter}' is not present"),
        )
    }

    #[must_use]
    pub fn missing_value(parameter: &str, source: &str) -> Self {
        Self::new(
            BindingErrorKind::MissingValue,
            parameter,
            format!("Required {source} '{parameter}' is not present"),
        )
    }

    #[must_use]
    pub fn missing_session_attribute(parameter: &str) -> Self {
        Self::new(
            BindingErrorKind::MissingSessionAttribute,
            parameter,
            format!("Missing session attribute '{parameter}'"),
        )
    }

    #[must_use]
    pub fn not_readable(parameter: &str, message: impl Into<String>) -> Self {
        Self::new(BindingErrorKind::MessageNotReadable, parameter, message)
    }

    #[must_use]
    pub fn type_mismatch(parameter: &str, value: &str, expected: &str) -> Self {
        Self::new(
            BindingErrorKind::TypeMismatch,
            parameter,
            format!("Failed to convert value '{value}' of '{parameter}' to {expected}"),
        )
    }

    #[must_use]
    pub fn validation(parameter: &str, field: &str, message: impl Into<String>) -> Self {
        Self {
            kind: BindingErrorKind::Validation,
            parameter: parameter.to_string(),
            field: Some(field.to_string()),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }
}

impl fmt::Display for BindingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}: field '{}' {}", self.kind, field, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for BindingError {}

/// Route registration failures. These abort registration of the route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// An identical mapping is already bound to a different handler.
    DuplicateRoute {
        mapping: String,
        existing: String,
        attempted: String,
    },
    /// Same mapping shape with overlapping, non-identical method sets.
    AmbiguousMapping {
        mapping: String,
        existing: String,
        attempted: String,
    },
    /// No resolver strategy supports a declared parameter.
    NoResolverFound { handler: String, parameter: String },
    InvalidPattern { pattern: String, reason: String },
    InvalidCondition { expression: String, reason: String },
    /// A route was built without a handler.
    MissingHandler { mapping: String },
    /// A declarative route definition could not be turned into a route.
    InvalidDefinition { route: String, reason: String },
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationError::DuplicateRoute {
                mapping,
                existing,
                attempted,
            } => write!(
                f,
                "Duplicate mapping {mapping}: already bound to '{existing}', cannot bind '{attempted}'"
            ),
            RegistrationError::AmbiguousMapping {
                mapping,
                existing,
                attempted,
            } => write!(
                f,
                "Ambiguous mapping {mapping}: '{attempted}' overlaps '{existing}'"
            ),
            RegistrationError::NoResolverFound { handler, parameter } => write!(
                f,
                "No argument resolver supports parameter '{parameter}' of handler '{handler}'"
            ),
            RegistrationError::InvalidPattern { pattern, reason } => {
                write!(f, "Invalid path pattern '{pattern}': {reason}")
            }
            RegistrationError::InvalidCondition { expression, reason } => {
                write!(f, "Invalid condition '{expression}': {reason}")
            }
            RegistrationError::MissingHandler { mapping } => {
                write!(f, "No handler bound to mapping {mapping}")
            }
            RegistrationError::InvalidDefinition { route, reason } => {
                write!(f, "Invalid route definition '{route}': {reason}")
            }
        }
    }
}

impl std::error::Error for RegistrationError {}

/// Error a handler raises to signal bad client input.
///
/// Its message is safe to show to the client; any other handler error is
/// reported as a generic 500.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientError {
    pub status: StatusCode,
    pub message: String,
}

impl ClientError {
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn with_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ClientError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_error_statuses() {
        let not_found = MatchError::NotFound { path: "/x".into() };
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
        let ambiguous = MatchError::AmbiguousMapping {
            path: "/x".into(),
            handlers: vec!["a".into(), "b".into()],
        };
        assert!(ambiguous.is_fatal());
        assert_eq!(ambiguous.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_method_not_allowed_lists_methods() {
        let err = MatchError::MethodNotAllowed {
            method: Method::DELETE,
            allowed: vec![Method::GET, Method::POST],
        };
        assert_eq!(
            err.to_string(),
            "Request method 'DELETE' is not supported; allowed: GET, POST"
        );
    }

    #[test]
    fn test_binding_error_display() {
        let err = BindingError::missing_value("id", "query parameter");
        assert_eq!(err.kind, BindingErrorKind::MissingValue);
        assert_eq!(err.parameter, "id");
        assert_eq!(
            err.to_string(),
            "MissingValue: Required query parameter 'id' is not present"
        );
        let err = BindingError::validation("user", "email", "must be a well-formed email address");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("field 'email'"));
    }
}
