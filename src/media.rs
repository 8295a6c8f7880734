//! Media types and `Accept` negotiation.
//!
//! Only the parts of RFC 7231 media ranges the matcher and the message
//! converters need: `type/subtype` with wildcards, `+suffix` structured
//! syntax, parameters, and the `q` quality factor.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A parsed media type such as `application/json;charset=utf-8`.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaType {
    kind: String,
    subtype: String,
    params: Vec<(String, String)>,
}

/// Error produced when a media type string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTypeError {
    pub input: String,
    pub reason: &'static str,
}

impl fmt::Display for MediaTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid media type '{}': {}", self.input, self.reason)
    }
}

impl std::error::Error for MediaTypeError {}

impl MediaType {
    #[must_use]
    pub fn new(kind: &str, subtype: &str) -> Self {
        Self {
            kind: kind.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            params: Vec::new(),
        }
    }

    #[must_use]
    pub fn all() -> Self {
        Self::new("*", "*")
    }

    #[must_use]
    pub fn application_json() -> Self {
        Self::new("application", "json")
    }

    #[must_use]
    pub fn text_plain() -> Self {
        Self::new("text", "plain")
    }

    #[must_use]
    pub fn form_urlencoded() -> Self {
        Self::new("application", "x-www-form-urlencoded")
    }

    #[must_use]
    pub fn multipart_form_data() -> Self {
        Self::new("multipart", "form-data")
    }

    #[must_use]
    pub fn octet_stream() -> Self {
        Self::new("application", "octet-stream")
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    /// Look up a parameter (case-insensitive name).
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn is_wildcard_type(&self) -> bool {
        self.kind == "*"
    }

    /// `*` or `*+suffix`.
    #[must_use]
    pub fn is_wildcard_subtype(&self) -> bool {
        self.subtype == "*" || self.subtype.starts_with("*+")
    }

    #[must_use]
    pub fn is_concrete(&self) -> bool {
        !self.is_wildcard_type() && !self.is_wildcard_subtype()
    }

    /// Structured syntax suffix, e.g. `json` for `application/problem+json`.
    #[must_use]
    pub fn suffix(&self) -> Option<&str> {
        self.subtype.rsplit_once('+').map(|(_, s)| s)
    }

    /// Quality factor from the `q` parameter (defaults to 1.0).
    #[must_use]
    pub fn quality(&self) -> f32 {
        self.param("q")
            .and_then(|q| q.parse::<f32>().ok())
            .filter(|q| (0.0..=1.0).contains(q))
            .unwrap_or(1.0)
    }

    /// Media type without parameters (keeps `type/subtype` only).
    #[must_use]
    pub fn essence(&self) -> String {
        format!("{}/{}", self.kind, self.subtype)
    }

    /// Whether `self` (possibly a range) includes `other`.
    ///
    /// `*/*` includes everything, `text/*` includes `text/plain`,
    /// `application/*+json` includes `application/problem+json`.
    #[must_use]
    pub fn includes(&self, other: &MediaType) -> bool {
        if self.is_wildcard_type() {
            return true;
        }
        if self.kind != other.kind {
            return false;
        }
        if self.subtype == other.subtype || self.subtype == "*" {
            return true;
        }
        if let Some(suffix) = self.subtype.strip_prefix("*+") {
            return other.suffix() == Some(suffix);
        }
        false
    }

    /// Symmetric inclusion.
    #[must_use]
    pub fn is_compatible_with(&self, other: &MediaType) -> bool {
        self.includes(other) || other.includes(self)
    }

    /// The more specific of two compatible types (used when picking the
    /// response content type).
    #[must_use]
    pub fn most_specific<'a>(&'a self, other: &'a MediaType) -> &'a MediaType {
        if self.specificity() >= other.specificity() {
            self
        } else {
            other
        }
    }

    fn specificity(&self) -> u8 {
        match (self.is_wildcard_type(), self.is_wildcard_subtype()) {
            (true, _) => 0,
            (false, true) => 1,
            (false, false) if self.params.iter().any(|(k, _)| k.as_str() != "q") => 3,
            (false, false) => 2,
        }
    }
}

impl FromStr for MediaType {
    type Err = MediaTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason| MediaTypeError {
            input: s.to_string(),
            reason,
        };
        let mut parts = s.split(';');
        let essence = parts.next().unwrap_or("").trim();
        if essence.is_empty() {
            return Err(err("empty media type"));
        }
        // A bare `*` is sent by some clients as shorthand for `*/*`.
        let (kind, subtype) = if essence == "*" {
            ("*", "*")
        } else {
            essence.split_once('/').ok_or_else(|| err("missing '/'"))?
        };
        let (kind, subtype) = (kind.trim(), subtype.trim());
        if kind.is_empty() || subtype.is_empty() {
            return Err(err("empty type or subtype"));
        }
        if kind == "*" && subtype != "*" {
            return Err(err("wildcard type requires wildcard subtype"));
        }
        let mut media = MediaType::new(kind, subtype);
        for param in parts {
            let param = param.trim();
            if param.is_empty() {
                continue;
            }
            let (k, v) = param.split_once('=').ok_or_else(|| err("parameter without '='"))?;
            media
                .params
                .push((k.trim().to_ascii_lowercase(), v.trim().trim_matches('"').to_string()));
        }
        Ok(media)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.subtype)?;
        for (k, v) in &self.params {
            write!(f, ";{k}={v}")?;
        }
        Ok(())
    }
}

/// Parse an `Accept` header into media ranges ordered by preference:
/// quality descending, then specificity descending. Invalid entries are
/// skipped. An absent or empty header yields `*/*`.
#[must_use]
pub fn parse_accept(header: Option<&str>) -> Vec<MediaType> {
    let mut ranges: Vec<MediaType> = header
        .unwrap_or("")
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .filter_map(|s| s.trim().parse::<MediaType>().ok())
        .collect();
    if ranges.is_empty() {
        return vec![MediaType::all()];
    }
    ranges.sort_by(|a, b| {
        b.quality()
            .partial_cmp(&a.quality())
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.specificity().cmp(&a.specificity()))
    });
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mt(s: &str) -> MediaType {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_with_params() {
        let m = mt("Application/JSON; charset=\"UTF-8\"");
        assert_eq!(m.kind(), "application");
        assert_eq!(m.subtype(), "json");
        assert_eq!(m.param("charset"), Some("UTF-8"));
        assert_eq!(m.essence(), "application/json");
    }

    #[test]
    fn test_invalid_media_types() {
        assert!("".parse::<MediaType>().is_err());
        assert!("json".parse::<MediaType>().is_err());
        assert!("*/json".parse::<MediaType>().is_err());
    }

    #[test]
    fn test_includes_wildcards_and_suffix() {
        assert!(mt("*/*").includes(&mt("image/png")));
        assert!(mt("text/*").includes(&mt("text/html")));
        assert!(!mt("text/*").includes(&mt("application/json")));
        assert!(mt("application/*+json").includes(&mt("application/problem+json")));
        assert!(!mt("application/json").includes(&mt("text/*")));
        assert!(mt("application/json").is_compatible_with(&mt("application/*")));
    }

    #[test]
    fn test_accept_sorted_by_quality_then_specificity() {
        let accept = parse_accept(Some("text/*;q=0.5, application/json, */*;q=0.1, text/html"));
        let order: Vec<String> = accept.iter().map(MediaType::essence).collect();
        assert_eq!(order, vec!["application/json", "text/html", "text/*", "*/*"]);
    }

    #[test]
    fn test_missing_accept_is_all() {
        assert_eq!(parse_accept(None), vec![MediaType::all()]);
        assert_eq!(parse_accept(Some(" ")), vec![MediaType::all()]);
    }
}
