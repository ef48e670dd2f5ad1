//! # HTTP Request
//!
//! Inbound request snapshot handed to the dispatcher.
//!
//! Parameters are gathered into one ordered multimap from the query string
//! and the body (`application/x-www-form-urlencoded`, `multipart/form-data`
//! text parts, and `application/json` objects flattened to dot/bracket
//! keys). Multipart parts carrying a filename become uploaded files.

use crate::error::{Error, Result};
use crate::json::parse_json_bytes;
use crate::keypath::flatten;
use crate::router::Method;
use http_body_util::BodyExt;
use hyper::body::Bytes;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Ordered multimap of request parameters
///
/// Keys keep first-insertion order; repeated keys accumulate values.
/// Lookups go through a key index into the ordered entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParameters {
    entries: Vec<(String, Vec<String>)>,
    index: HashMap<String, usize>,
}

impl RequestParameters {
    /// Create an empty parameter set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value under `key`
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(&slot) = self.index.get(&key) {
            self.entries[slot].1.push(value);
        } else {
            self.index.insert(key.clone(), self.entries.len());
            self.entries.push((key, vec![value]));
        }
    }

    /// All values for `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.index
            .get(key)
            .and_then(|&slot| self.entries.get(slot))
            .map(|(_, v)| v.as_slice())
    }

    /// First value for `key`
    #[must_use]
    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.first()).map(String::as_str)
    }

    /// Whether `key` is present
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Whether any key starts with `prefix`
    #[must_use]
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.entries.iter().any(|(k, _)| k.starts_with(prefix))
    }

    /// Iterate entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of distinct keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no parameters
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RequestParameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.append(k, v);
        }
        params
    }
}

/// Inbound HTTP request
///
/// Owned exclusively by one dispatch. The attribute store carries path
/// parameters and view data between pipeline stages.
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Request path (without query string)
    pub path: String,
    /// Raw query string (e.g., "page=1&limit=10")
    query_string: Option<String>,
    /// Request parameters from query and body
    params: RequestParameters,
    /// Uploaded file payloads keyed by field name
    files: HashMap<String, Bytes>,
    /// Per-request attribute store
    attributes: Map<String, Value>,
    /// Request headers
    headers: hyper::HeaderMap,
    /// Request body (collected)
    body: Option<Bytes>,
}

impl Request {
    /// Create a request from a method and a path with optional query string
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let (path, query_string) = match path.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (path, None),
        };

        let mut params = RequestParameters::new();
        if let Some(q) = &query_string {
            parse_urlencoded_into(q, &mut params);
        }

        Self {
            method,
            path,
            query_string,
            params,
            files: HashMap::new(),
            attributes: Map::new(),
            headers: hyper::HeaderMap::new(),
            body: None,
        }
    }

    /// Add a request parameter
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.append(key, value);
        self
    }

    /// Add an uploaded file payload
    #[must_use]
    pub fn with_file(mut self, field: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        self.files.insert(field.into(), payload.into());
        self
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    /// Attach a body and merge its parameters according to `content_type`
    ///
    /// # Errors
    ///
    /// Returns `Error::BadRequest` if a JSON or multipart body is malformed.
    pub fn with_body(mut self, content_type: &str, body: impl Into<Bytes>) -> Result<Self> {
        let body = body.into();
        self.set_header("content-type", content_type);
        parse_body_into(content_type, &body, &mut self.params, &mut self.files)?;
        self.body = Some(body);
        Ok(self)
    }

    /// Create from hyper request with body size limit
    ///
    /// # Errors
    ///
    /// Returns `Error::PayloadTooLarge` if the body exceeds `max_body_size`
    /// and `Error::BadRequest` if it cannot be read or parsed.
    pub async fn from_hyper_with_limit(
        req: hyper::Request<hyper::body::Incoming>,
        max_body_size: usize,
    ) -> Result<Self> {
        let method = Method::from(req.method());
        let uri = req.uri();
        let mut request = Self::new(method, uri.path());
        if let Some(q) = uri.query() {
            parse_urlencoded_into(q, &mut request.params);
            request.query_string = Some(q.to_string());
        }
        request.headers = req.headers().clone();

        if let Some(len) = request
            .header(hyper::header::CONTENT_LENGTH.as_str())
            .and_then(|v| v.parse::<usize>().ok())
        {
            if len > max_body_size {
                return Err(Error::PayloadTooLarge {
                    limit: max_body_size,
                    actual: len,
                });
            }
        }

        let bytes = BodyExt::collect(req.into_body())
            .await
            .map_err(|e| Error::BadRequest(e.to_string()))?
            .to_bytes();
        if bytes.len() > max_body_size {
            return Err(Error::PayloadTooLarge {
                limit: max_body_size,
                actual: bytes.len(),
            });
        }

        if !bytes.is_empty() {
            let content_type = request.content_type().unwrap_or_default().to_string();
            parse_body_into(&content_type, &bytes, &mut request.params, &mut request.files)?;
            request.body = Some(bytes);
        }
        Ok(request)
    }

    /// Request parameters
    #[must_use]
    pub const fn params(&self) -> &RequestParameters {
        &self.params
    }

    /// Uploaded file payloads
    #[must_use]
    pub const fn files(&self) -> &HashMap<String, Bytes> {
        &self.files
    }

    /// The attribute store
    #[must_use]
    pub const fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Get an attribute by name
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Set or override an attribute
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Get a header value by name (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Set or override a header
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let (Ok(n), Ok(v)) = (
            hyper::header::HeaderName::from_bytes(name.as_bytes()),
            hyper::header::HeaderValue::from_str(value),
        ) {
            self.headers.insert(n, v);
        }
    }

    /// The `Content-Type` header
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header(hyper::header::CONTENT_TYPE.as_str())
    }

    /// Get raw query string
    #[must_use]
    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    /// Get the request body as bytes
    #[must_use]
    pub fn body_bytes(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }
}

fn parse_body_into(
    content_type: &str,
    body: &[u8],
    params: &mut RequestParameters,
    files: &mut HashMap<String, Bytes>,
) -> Result<()> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match mime.as_str() {
        "application/x-www-form-urlencoded" => {
            parse_urlencoded_into(&String::from_utf8_lossy(body), params);
        }
        "application/json" => {
            let mut bytes = body.to_vec();
            let value: Value = parse_json_bytes(&mut bytes)?;
            for (key, value) in flatten(&value) {
                params.append(key, value);
            }
        }
        "multipart/form-data" => {
            let boundary = multipart_boundary(content_type)
                .ok_or_else(|| Error::BadRequest("multipart body without a valid boundary".into()))?;
            parse_multipart_into(body, &boundary, params, files);
        }
        _ => {}
    }
    Ok(())
}

/// Parse `a=1&b=2&a=3` into `params`, keeping repeated keys
fn parse_urlencoded_into(query: &str, params: &mut RequestParameters) {
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        params.append(url_decode(key), url_decode(value));
    }
}

/// Percent-decoding with `+` as space
///
/// Decodes to bytes first so multi-byte UTF-8 sequences survive; invalid
/// escapes are kept verbatim.
fn url_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => {
                let decoded = bytes
                    .get(i + 1..i + 3)
                    .and_then(|hex| std::str::from_utf8(hex).ok())
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok());
                if let Some(byte) = decoded {
                    out.push(byte);
                    i += 2;
                } else {
                    out.push(b'%');
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Longest boundary allowed by RFC 2046
const MAX_BOUNDARY_LEN: usize = 70;

fn multipart_boundary(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .skip(1)
        .find_map(|attr| {
            let (name, value) = attr.trim().split_once('=')?;
            name.eq_ignore_ascii_case("boundary")
                .then(|| value.trim_matches('"').to_string())
        })
        .filter(|boundary| (1..=MAX_BOUNDARY_LEN).contains(&boundary.len()))
}

fn parse_multipart_into(
    body: &[u8],
    boundary: &str,
    params: &mut RequestParameters,
    files: &mut HashMap<String, Bytes>,
) {
    let delimiter = format!("--{boundary}");
    for part in split_bytes(body, delimiter.as_bytes()).into_iter().skip(1) {
        if part.starts_with(b"--") {
            break;
        }
        let part = part.strip_prefix(b"\r\n").unwrap_or(part);
        let part = part.strip_suffix(b"\r\n").unwrap_or(part);
        let Some(split) = find_bytes(part, b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&part[..split]);
        let content = &part[split + 4..];

        let Some(disposition) = head.lines().find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.trim()
                .eq_ignore_ascii_case("content-disposition")
                .then_some(value)
        }) else {
            continue;
        };
        let Some(name) = disposition_attr(disposition, "name") else {
            continue;
        };

        match disposition_attr(disposition, "filename") {
            Some(filename) if !filename.is_empty() => {
                files.insert(name, Bytes::copy_from_slice(content));
            }
            _ => params.append(name, String::from_utf8_lossy(content)),
        }
    }
}

fn disposition_attr(disposition: &str, attr: &str) -> Option<String> {
    disposition.split(';').skip(1).find_map(|item| {
        let (name, value) = item.trim().split_once('=')?;
        (name.trim() == attr).then(|| value.trim().trim_matches('"').to_string())
    })
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    let (&first, tail) = needle.split_first()?;
    let mut from = 0;
    while let Some(offset) = haystack[from..].iter().position(|&b| b == first) {
        let start = from + offset;
        let end = start + needle.len();
        if end > haystack.len() {
            return None;
        }
        if haystack[start + 1..end] == *tail {
            return Some(start);
        }
        from = start + 1;
    }
    None
}

fn split_bytes<'a>(haystack: &'a [u8], needle: &[u8]) -> Vec<&'a [u8]> {
    let mut parts = Vec::new();
    let mut rest = haystack;
    while let Some(pos) = find_bytes(rest, needle) {
        parts.push(&rest[..pos]);
        rest = &rest[pos + needle.len()..];
    }
    parts.push(rest);
    parts
}
