//! Param, header and media-type conditions attached to a mapping.

use std::fmt;

use crate::error::RegistrationError;
use crate::media::MediaType;

/// `name`, `!name`, `name=value` or `name!=value`.
///
/// A missing param/header only satisfies the negated forms: `!name` and
/// `name!=value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameValueExpression {
    name: String,
    value: Option<String>,
    negated: bool,
    ignore_case: bool,
}

impl NameValueExpression {
    /// Parse a param expression (names are case-sensitive).
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::InvalidCondition`] for empty names.
    pub fn param(expr: &str) -> Result<Self, RegistrationError> {
        Self::parse(expr, false)
    }

    /// Parse a header expression (names are case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::InvalidCondition`] for empty names.
    pub fn header(expr: &str) -> Result<Self, RegistrationError> {
        Self::parse(expr, true)
    }

    fn parse(expr: &str, ignore_case: bool) -> Result<Self, RegistrationError> {
        let expr = expr.trim();
        let (name, value, negated) = if let Some((n, v)) = expr.split_once("!=") {
            (n, Some(v), true)
        } else if let Some((n, v)) = expr.split_once('=') {
            (n, Some(v), false)
        } else if let Some(n) = expr.strip_prefix('!') {
            (n, None, true)
        } else {
            (expr, None, false)
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(RegistrationError::InvalidCondition {
                expression: expr.to_string(),
                reason: "empty name".into(),
            });
        }
        Ok(Self {
            name: name.to_string(),
            value: value.map(|v| v.trim().to_string()),
            negated,
            ignore_case,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluate against every value the request carries for [`Self::name`].
    #[must_use]
    pub fn matches(&self, values: &[&str]) -> bool {
        let hit = match &self.value {
            None => !values.is_empty(),
            Some(expected) => values.iter().any(|v| *v == expected.as_str()),
        };
        hit != self.negated
    }

    #[must_use]
    pub fn ignore_case(&self) -> bool {
        self.ignore_case
    }
}

impl fmt::Display for NameValueExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.value, self.negated) {
            (None, false) => write!(f, "{}", self.name),
            (None, true) => write!(f, "!{}", self.name),
            (Some(v), false) => write!(f, "{}={}", self.name, v),
            (Some(v), true) => write!(f, "{}!={}", self.name, v),
        }
    }
}

/// A `consumes` entry, optionally negated (`!text/plain`).
#[derive(Debug, Clone, PartialEq)]
pub struct MediaTypeExpression {
    media: MediaType,
    negated: bool,
}

impl MediaTypeExpression {
    /// # Errors
    ///
    /// Returns [`RegistrationError::InvalidCondition`] for unparsable media types.
    pub fn parse(expr: &str) -> Result<Self, RegistrationError> {
        let expr = expr.trim();
        let (raw, negated) = match expr.strip_prefix('!') {
            Some(rest) => (rest, true),
            None => (expr, false),
        };
        let media = raw
            .parse::<MediaType>()
            .map_err(|e| RegistrationError::InvalidCondition {
                expression: expr.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { media, negated })
    }

    #[must_use]
    pub fn media(&self) -> &MediaType {
        &self.media
    }

    #[must_use]
    pub fn is_negated(&self) -> bool {
        self.negated
    }

    #[must_use]
    pub fn matches(&self, content_type: &MediaType) -> bool {
        self.media.includes(content_type) != self.negated
    }
}

impl fmt::Display for MediaTypeExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "!")?;
        }
        write!(f, "{}", self.media)
    }
}

/// Consumes condition: satisfied when any expression matches the request's
/// content type; an empty list accepts everything.
#[must_use]
pub fn consumes_matches(consumes: &[MediaTypeExpression], content_type: &MediaType) -> bool {
    consumes.is_empty() || consumes.iter().any(|e| e.matches(content_type))
}

/// Produces condition: satisfied when any producible type is compatible with
/// any accepted range; an empty list produces anything.
#[must_use]
pub fn produces_matches(produces: &[MediaType], accept: &[MediaType]) -> bool {
    produces.is_empty()
        || produces
            .iter()
            .any(|p| accept.iter().any(|a| a.is_compatible_with(p)))
}
