//! Inbound request shape consumed by matching and binding.
//!
//! The transport layer is out of scope: whatever accepts connections builds a
//! [`RequestContext`] through [`RequestContext::builder`] and hands it to the
//! dispatcher. Query strings, cookies, content type, accept list and
//! urlencoded/multipart bodies are parsed once here, ahead of matching.

use http::Method;
use serde_json::{Map, Value};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::io::{self, Read};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::dispatcher::CancellationToken;
use crate::ids::RequestId;
use crate::media::{parse_accept, MediaType};
use crate::multipart::{parse_multipart, MultipartFile};
use crate::session::Session;

/// Maximum number of path/query parameters before heap allocation.
/// Most REST APIs have ≤4 path params (e.g., /users/{id}/posts/{postId}).
pub const MAX_INLINE_PARAMS: usize = 8;

/// Maximum inline headers/cookies before heap allocation.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Stack-allocated multi-valued parameter storage for the hot path.
///
/// Names use `Arc<str>`: path variable names come from the compiled pattern
/// and cloning them is an atomic increment. Duplicate names are allowed,
/// which is how multi-valued query parameters are represented.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Stack-allocated header/cookie storage (duplicates allowed).
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Request attribute carrying the flash map id of the previous redirect.
pub const FLASH_ID_ATTRIBUTE: &str = "routebind.flash_id";

/// Cookie the redirect response uses to deliver the flash map id.
pub const FLASH_ID_COOKIE: &str = "FLASH_ID";

/// Everything the matcher and the resolvers may read from a request.
pub struct RequestContext {
    pub request_id: RequestId,
    pub method: Method,
    /// Path without the query string.
    pub path: String,
    pub headers: HeaderVec,
    pub query_params: ParamVec,
    /// Fields of urlencoded or multipart bodies.
    pub form_params: ParamVec,
    pub cookies: HeaderVec,
    pub content_type: Option<MediaType>,
    /// Accepted media ranges, most preferred first (`*/*` when absent).
    pub accept: Vec<MediaType>,
    pub body: Vec<u8>,
    pub files: Vec<MultipartFile>,
    pub session: Option<Arc<dyn Session>>,
    pub attributes: HashMap<String, Value>,
    /// Request model; seeded with flash attributes before binding.
    pub model: Map<String, Value>,
    /// Cancelled by the transport when the client goes away.
    pub disconnect: CancellationToken,
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("headers", &self.headers)
            .field("query_params", &self.query_params)
            .field("content_type", &self.content_type)
            .field("body_len", &self.body.len())
            .field("files", &self.files.len())
            .field("has_session", &self.session.is_some())
            .finish()
    }
}

impl RequestContext {
    /// Start building a request from a method and a path with optional
    /// query string.
    #[must_use]
    pub fn builder(method: Method, uri: &str) -> RequestBuilder {
        RequestBuilder::new(method, uri)
    }

    /// First value of a header (case-insensitive per RFC 7230).
    #[inline]
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values of a header, in arrival order.
    #[must_use]
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// All values of a request parameter: query string first, then form body.
    #[must_use]
    pub fn param_values(&self, name: &str) -> Vec<&str> {
        self.query_params
            .iter()
            .chain(self.form_params.iter())
            .filter(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// First value of a request parameter.
    #[inline]
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query_params
            .iter()
            .chain(self.form_params.iter())
            .find(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Query and form parameters in arrival order, duplicates included.
    pub fn all_params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.query_params
            .iter()
            .chain(self.form_params.iter())
            .map(|(k, v)| (k.as_ref(), v.as_str()))
    }

    #[inline]
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Multipart files uploaded under a form field name.
    #[must_use]
    pub fn files_named(&self, name: &str) -> Vec<&MultipartFile> {
        self.files.iter().filter(|f| f.name() == name).collect()
    }

    /// Content type used for `consumes` matching; a missing header counts as
    /// `application/octet-stream`.
    #[must_use]
    pub fn effective_content_type(&self) -> MediaType {
        self.content_type
            .clone()
            .unwrap_or_else(MediaType::octet_stream)
    }

    #[must_use]
    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }

    /// Flash map id from the request attribute, falling back to the cookie.
    #[must_use]
    pub fn flash_id(&self) -> Option<String> {
        self.attributes
            .get(FLASH_ID_ATTRIBUTE)
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| self.cookie(FLASH_ID_COOKIE).map(str::to_string))
    }

    /// Same request re-targeted at another path (used for `forward:`).
    #[must_use]
    pub fn forwarded_to(&self, path: &str) -> RequestContext {
        let (path, query) = split_uri(path);
        let mut query_params = self.query_params.clone();
        query_params.extend(parse_query_params(query));
        RequestContext {
            request_id: self.request_id,
            method: self.method.clone(),
            path: path.to_string(),
            headers: self.headers.clone(),
            query_params,
            form_params: self.form_params.clone(),
            cookies: self.cookies.clone(),
            content_type: self.content_type.clone(),
            accept: self.accept.clone(),
            body: self.body.clone(),
            files: self.files.clone(),
            session: self.session.clone(),
            attributes: self.attributes.clone(),
            model: self.model.clone(),
            disconnect: self.disconnect.clone(),
        }
    }
}

/// Builder for [`RequestContext`].
pub struct RequestBuilder {
    request_id: Option<RequestId>,
    method: Method,
    uri: String,
    headers: HeaderVec,
    body: Vec<u8>,
    session: Option<Arc<dyn Session>>,
    attributes: HashMap<String, Value>,
    disconnect: CancellationToken,
}

impl RequestBuilder {
    fn new(method: Method, uri: &str) -> Self {
        Self {
            request_id: None,
            method,
            uri: uri.to_string(),
            headers: HeaderVec::new(),
            body: Vec::new(),
            session: None,
            attributes: HashMap::new(),
            disconnect: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn request_id(mut self, id: RequestId) -> Self {
        self.request_id = Some(id);
        self
    }

    /// Append a header (repeated names are kept as separate values).
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((Arc::from(name), value.to_string()));
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a JSON body and its content type.
    #[must_use]
    pub fn json(self, value: &Value) -> Self {
        self.header("content-type", "application/json")
            .body(value.to_string())
    }

    /// Set an urlencoded form body and its content type.
    #[must_use]
    pub fn form(self, fields: &[(&str, &str)]) -> Self {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields.iter())
            .finish();
        self.header("content-type", "application/x-www-form-urlencoded")
            .body(encoded)
    }

    /// Read the body from a reader, refusing more than `limit` bytes.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidData` error when the body exceeds the limit, or
    /// the underlying read error.
    pub fn body_from_reader<R: Read>(mut self, reader: R, limit: usize) -> io::Result<Self> {
        self.body = read_limited(reader, limit)?;
        Ok(self)
    }

    #[must_use]
    pub fn session(mut self, session: Arc<dyn Session>) -> Self {
        self.session = Some(session);
        self
    }

    #[must_use]
    pub fn attribute(mut self, name: &str, value: Value) -> Self {
        self.attributes.insert(name.to_string(), value);
        self
    }

    #[must_use]
    pub fn disconnect_token(mut self, token: CancellationToken) -> Self {
        self.disconnect = token;
        self
    }

    #[must_use]
    pub fn build(self) -> RequestContext {
        let (path, query) = split_uri(&self.uri);
        let request_id = self.request_id.unwrap_or_else(|| {
            RequestId::from_header_or_new(header_in(&self.headers, "x-request-id"))
        });

        let content_type = header_in(&self.headers, "content-type").and_then(|raw| {
            raw.parse::<MediaType>()
                .map_err(|e| warn!(request_id = %request_id, error = %e, "Ignoring malformed content type"))
                .ok()
        });
        let accept = parse_accept(header_in(&self.headers, "accept"));
        let cookies = parse_cookies(&self.headers);

        let mut form_params = ParamVec::new();
        let mut files = Vec::new();
        if let Some(ct) = &content_type {
            if ct.includes(&MediaType::form_urlencoded()) {
                form_params = url::form_urlencoded::parse(&self.body)
                    .map(|(k, v)| (Arc::from(k.as_ref()), v.into_owned()))
                    .collect();
            } else if ct.includes(&MediaType::multipart_form_data()) {
                match ct.param("boundary") {
                    Some(boundary) => match parse_multipart(&self.body, boundary) {
                        Ok((fields, parsed)) => {
                            form_params = fields;
                            files = parsed;
                        }
                        Err(e) => {
                            warn!(request_id = %request_id, error = %e, "Malformed multipart body")
                        }
                    },
                    None => warn!(request_id = %request_id, "Multipart request without boundary"),
                }
            }
        }

        let ctx = RequestContext {
            request_id,
            method: self.method,
            path: path.to_string(),
            headers: self.headers,
            query_params: parse_query_params(query),
            form_params,
            cookies,
            content_type,
            accept,
            body: self.body,
            files,
            session: self.session,
            attributes: self.attributes,
            model: Map::new(),
            disconnect: self.disconnect,
        };
        debug!(
            request_id = %ctx.request_id,
            method = %ctx.method,
            path = %ctx.path,
            query_params = ctx.query_params.len(),
            form_params = ctx.form_params.len(),
            files = ctx.files.len(),
            "Request context built"
        );
        ctx
    }
}

fn header_in<'a>(headers: &'a HeaderVec, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn split_uri(uri: &str) -> (&str, &str) {
    match uri.split_once('?') {
        Some((path, query)) => (if path.is_empty() { "/" } else { path }, query),
        None => (if uri.is_empty() { "/" } else { uri }, ""),
    }
}

/// Parse `name=value; other=value` pairs out of every `Cookie` header.
#[must_use]
pub fn parse_cookies(headers: &HeaderVec) -> HeaderVec {
    headers
        .iter()
        .filter(|(k, _)| k.eq_ignore_ascii_case("cookie"))
        .flat_map(|(_, raw)| raw.split(';'))
        .filter_map(|pair| {
            let mut parts = pair.trim().splitn(2, '=');
            let name = parts.next()?.trim();
            if name.is_empty() {
                return None;
            }
            let value = parts.next().unwrap_or("").trim();
            Some((Arc::from(name), value.to_string()))
        })
        .collect()
}

/// Parse and URL-decode a query string (without the leading `?`).
/// Repeated names produce repeated entries.
#[must_use]
pub fn parse_query_params(query: &str) -> ParamVec {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (Arc::from(k.as_ref()), v.into_owned()))
        .collect()
}

/// Read at most `limit` bytes; one byte more is an error.
///
/// # Errors
///
/// `InvalidData` when the limit is exceeded, or the reader's own error.
pub fn read_limited<R: Read>(reader: R, limit: usize) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    reader.take(cap).read_to_end(&mut buf)?;
    if buf.len() > limit {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("request body exceeds {limit} bytes"),
        ));
    }
    Ok(buf)
}
