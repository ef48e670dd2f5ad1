//! # HTTP Response
//!
//! Outbound response produced by the dispatcher and rendered to hyper by
//! the server.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::StatusCode;
use std::collections::HashMap;

/// Plain-text content type
pub const TEXT_PLAIN: &str = "text/plain;charset=UTF-8";
/// HTML content type
pub const TEXT_HTML: &str = "text/html";
/// JSON document content type
pub const APPLICATION_JSON: &str = "application/json;charset=UTF-8";

/// HTTP response
#[derive(Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: Bytes,
    /// Content type
    pub content_type: String,
    /// Response headers
    pub headers: HashMap<String, String>,
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("body", &String::from_utf8_lossy(&self.body))
            .field("content_type", &self.content_type)
            .field("headers", &self.headers)
            .finish()
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(TEXT_PLAIN, Bytes::new())
    }
}

impl Response {
    /// Create a 200 response with the given content type and body
    #[must_use]
    pub fn new(content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            content_type: content_type.into(),
            headers: HashMap::new(),
        }
    }

    /// Create a JSON response
    #[must_use]
    pub fn json(body: impl Into<String>) -> Self {
        Self::new(APPLICATION_JSON, body.into())
    }

    /// Create a text response
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self::new(TEXT_PLAIN, body.into())
    }

    /// Create an HTML response
    #[must_use]
    pub fn html(body: impl Into<String>) -> Self {
        Self::new(TEXT_HTML, body.into())
    }

    /// Set status code
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Set a header
    #[must_use]
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.set_header(key, value);
        self
    }

    /// Set or override a header
    pub fn set_header(&mut self, key: &str, value: &str) {
        if key.eq_ignore_ascii_case("content-type") {
            self.content_type = value.to_string();
        } else {
            self.headers.insert(key.to_ascii_lowercase(), value.to_string());
        }
    }

    /// Get a header value (case-insensitive)
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        if key.eq_ignore_ascii_case("content-type") {
            return Some(&self.content_type);
        }
        self.headers.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    /// Body as UTF-8 text (lossy)
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Convert to hyper Response
    pub(crate) fn into_hyper(self) -> hyper::Response<Full<Bytes>> {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut builder = hyper::Response::builder().status(status);
        builder = builder.header(hyper::header::CONTENT_TYPE, &self.content_type);
        for (k, v) in &self.headers {
            builder = builder.header(k.as_str(), v.as_str());
        }

        builder.body(Full::new(self.body)).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Invalid response header, sending bare 500");
            let mut fallback = hyper::Response::new(Full::new(Bytes::from_static(b"Internal Server Error")));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_response() {
        let resp = Response::json(r#"{"status":"OK"}"#);
        assert_eq!(resp.status, 200);
        assert_eq!(resp.content_type, APPLICATION_JSON);
    }

    #[test]
    fn test_with_status() {
        let resp = Response::text("boom").with_status(500);
        assert_eq!(resp.status, 500);
        assert_eq!(resp.body_text(), "boom");
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let resp = Response::text("x")
            .with_header("X-Request-Id", "abc")
            .with_header("Content-Type", "text/csv");
        assert_eq!(resp.header("x-request-id"), Some("abc"));
        assert_eq!(resp.header("content-type"), Some("text/csv"));
    }

    #[test]
    fn test_into_hyper() {
        let resp = Response::html("<p>hi</p>").with_header("x-a", "1").into_hyper();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["content-type"], TEXT_HTML);
        assert_eq!(resp.headers()["x-a"], "1");
    }
}
