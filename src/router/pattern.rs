//! Path patterns: literal, variable, wildcard and catch-all segments.
//!
//! Supported segment syntax:
//!
//! - `items`: literal, matched exactly (after percent-decoding the request)
//! - `{id}`: variable capturing one segment
//! - `{id:\d+}`: variable whose value must fully match the regex
//! - `*`: anonymous single-segment wildcard
//! - `**` / `{*rest}`: catch-all for the remaining segments, last position only
//!
//! Empty segments are ignored on both sides, so `/items/` and `/items`
//! are the same pattern and match the same requests.

use regex::Regex;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::error::RegistrationError;
use crate::request::ParamVec;

/// One segment of a compiled [`PathPattern`].
#[derive(Debug, Clone)]
pub enum Segment {
    Literal(String),
    Variable {
        name: Arc<str>,
        constraint: Option<Regex>,
    },
    Wildcard,
    CatchAll { name: Option<Arc<str>> },
}

impl Segment {
    fn shape(&self) -> Cow<'_, str> {
        match self {
            Segment::Literal(lit) => Cow::Borrowed(lit.as_str()),
            Segment::Variable {
                constraint: Some(re),
                ..
            } => Cow::Owned(format!("{{:{}}}", constraint_source(re))),
            Segment::Variable { .. } => Cow::Borrowed("{}"),
            Segment::Wildcard => Cow::Borrowed("*"),
            Segment::CatchAll { .. } => Cow::Borrowed("**"),
        }
    }
}

// Constraint regexes are stored anchored; strip the anchoring for display.
fn constraint_source(re: &Regex) -> &str {
    re.as_str()
        .strip_prefix("^(?:")
        .and_then(|s| s.strip_suffix(")$"))
        .unwrap_or(re.as_str())
}

/// Compiled path pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

/// Split a request path into non-empty segments, percent-decoding each one.
///
/// Segments that are not valid UTF-8 after decoding are kept verbatim.
#[must_use]
pub fn split_path(path: &str) -> Vec<Cow<'_, str>> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| urlencoding::decode(s).unwrap_or(Cow::Borrowed(s)))
        .collect()
}

impl PathPattern {
    /// Compile a pattern string.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::InvalidPattern`] for patterns that do not
    /// start with `/`, contain partial variable syntax, duplicate variable
    /// names, bad regexes, or a catch-all that is not the last segment.
    pub fn parse(raw: &str) -> Result<Self, RegistrationError> {
        let invalid = |reason: String| RegistrationError::InvalidPattern {
            pattern: raw.to_string(),
            reason,
        };
        if !raw.starts_with('/') {
            return Err(invalid("pattern must start with '/'".into()));
        }

        let parts: Vec<&str> = raw.split('/').filter(|s| !s.is_empty()).collect();
        let mut segments = Vec::with_capacity(parts.len());
        let mut names: Vec<Arc<str>> = Vec::new();

        for (idx, part) in parts.iter().enumerate() {
            let is_last = idx + 1 == parts.len();
            let segment = if *part == "**" {
                Segment::CatchAll { name: None }
            } else if *part == "*" {
                Segment::Wildcard
            } else if let Some(inner) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                if let Some(name) = inner.strip_prefix('*') {
                    if name.is_empty() {
                        return Err(invalid("catch-all variable needs a name".into()));
                    }
                    Segment::CatchAll {
                        name: Some(Arc::from(name)),
                    }
                } else {
                    let (name, constraint) = match inner.split_once(':') {
                        Some((name, expr)) => {
                            let re = Regex::new(&format!("^(?:{expr})$")).map_err(|e| {
                                invalid(format!("bad constraint for '{name}': {e}"))
                            })?;
                            (name, Some(re))
                        }
                        None => (inner, None),
                    };
                    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
                        return Err(invalid(format!("invalid variable name '{name}'")));
                    }
                    Segment::Variable {
                        name: Arc::from(name),
                        constraint,
                    }
                }
            } else if part.contains('{') || part.contains('}') {
                return Err(invalid(format!("partial variable syntax in segment '{part}'")));
            } else {
                Segment::Literal((*part).to_string())
            };

            if matches!(segment, Segment::CatchAll { .. }) && !is_last {
                return Err(invalid("catch-all must be the last segment".into()));
            }
            if let Segment::Variable { name, .. }
            | Segment::CatchAll {
                name: Some(name), ..
            } = &segment
            {
                if names.iter().any(|n| n == name) {
                    return Err(invalid(format!("duplicate variable '{name}'")));
                }
                names.push(Arc::clone(name));
            }
            segments.push(segment);
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Pattern with variable names erased, used to detect duplicate mappings:
    /// `/items/{id}` and `/items/{name}` have the same shape.
    #[must_use]
    pub fn shape(&self) -> String {
        if self.segments.is_empty() {
            return "/".to_string();
        }
        let mut out = String::with_capacity(self.raw.len());
        for seg in &self.segments {
            out.push('/');
            out.push_str(&seg.shape());
        }
        out
    }

    /// Names of all capturing variables, in positional order.
    #[must_use]
    pub fn variable_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Variable { name, .. } => Some(name.as_ref()),
                Segment::CatchAll { name: Some(name) } => Some(name.as_ref()),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn has_variable(&self, name: &str) -> bool {
        self.variable_names().contains(&name)
    }

    #[must_use]
    pub fn literal_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count()
    }

    /// Variables plus single-segment wildcards.
    #[must_use]
    pub fn dynamic_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Variable { .. } | Segment::Wildcard))
            .count()
    }

    #[must_use]
    pub fn catch_all_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::CatchAll { .. }))
            .count()
    }

    #[must_use]
    pub fn constrained_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| {
                matches!(
                    s,
                    Segment::Variable {
                        constraint: Some(_),
                        ..
                    }
                )
            })
            .count()
    }

    /// Number of leading literal segments.
    #[must_use]
    pub fn literal_prefix_len(&self) -> usize {
        self.segments
            .iter()
            .take_while(|s| matches!(s, Segment::Literal(_)))
            .count()
    }

    /// Match decoded request segments, returning captured variables.
    ///
    /// Rejects as soon as a literal or constraint fails. Variables are bound
    /// by positional correspondence.
    #[must_use]
    pub fn matches<S: AsRef<str>>(&self, request: &[S]) -> Option<ParamVec> {
        let mut params = ParamVec::new();
        let mut idx = 0;
        for seg in &self.segments {
            match seg {
                Segment::CatchAll { name } => {
                    if let Some(name) = name {
                        let rest: Vec<&str> = request[idx.min(request.len())..]
                            .iter()
                            .map(AsRef::as_ref)
                            .collect();
                        params.push((Arc::clone(name), rest.join("/")));
                    }
                    return Some(params);
                }
                _ if idx >= request.len() => return None,
                Segment::Literal(lit) => {
                    if lit != request[idx].as_ref() {
                        return None;
                    }
                }
                Segment::Variable { name, constraint } => {
                    let value = request[idx].as_ref();
                    if let Some(re) = constraint {
                        if !re.is_match(value) {
                            return None;
                        }
                    }
                    params.push((Arc::clone(name), value.to_string()));
                }
                Segment::Wildcard => {}
            }
            idx += 1;
        }
        if idx == request.len() {
            Some(params)
        } else {
            None
        }
    }

    /// Substitute variables into the pattern (reverse routing).
    ///
    /// Returns `None` when a variable has no value or wildcards are present.
    #[must_use]
    pub fn expand(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        if self.segments.is_empty() {
            return Some("/".to_string());
        }
        let mut out = String::new();
        for seg in &self.segments {
            match seg {
                Segment::Literal(lit) => {
                    out.push('/');
                    out.push_str(lit);
                }
                Segment::Variable { name, .. } => {
                    out.push('/');
                    out.push_str(&urlencoding::encode(&lookup(name)?));
                }
                Segment::CatchAll { name: Some(name) } => {
                    let rest = lookup(name)?;
                    if !rest.is_empty() {
                        out.push('/');
                        out.push_str(&rest);
                    }
                }
                Segment::Wildcard | Segment::CatchAll { name: None } => return None,
            }
        }
        Some(out)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}
