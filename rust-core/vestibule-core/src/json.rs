//! # JSON Serialization Module
//!
//! The structured-data document rendered for JSON handlers, and body
//! parsing using simd-json.
//!
//! ## Wire shape
//!
//! ```text
//! {"status":"OK","code":200,"count":2,"data":{...}}
//! ```
//!
//! Keys are emitted in field order and `data` keeps insertion order.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// Fixed payload sent when a document cannot be serialized
pub const ERROR_DOCUMENT: &str = r#"{"status":"ERROR","code":500,"count":0,"data":{}}"#;

/// Structured-data response document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonDocument {
    /// `OK` or `ERROR`
    pub status: &'static str,
    /// Numeric status code
    pub code: u16,
    /// Number of top-level data entries
    pub count: usize,
    /// Payload
    pub data: Map<String, Value>,
}

impl JsonDocument {
    /// Successful document wrapping `data`
    #[must_use]
    pub fn ok(data: Map<String, Value>) -> Self {
        Self {
            status: "OK",
            code: 200,
            count: data.len(),
            data,
        }
    }

    /// Error document with empty data
    #[must_use]
    pub fn error(code: u16) -> Self {
        Self {
            status: "ERROR",
            code,
            count: 0,
            data: Map::new(),
        }
    }

    /// Serialize to the compact wire form
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` if a data value cannot be serialized.
    pub fn to_json(&self) -> Result<String> {
        to_json(self)
    }
}

/// Parse JSON string to a typed value using simd-json
///
/// # Errors
///
/// Returns `Error::BadRequest` if parsing fails
pub fn parse_json<T: DeserializeOwned>(json_str: &str) -> Result<T> {
    let mut bytes = json_str.as_bytes().to_vec();
    parse_json_bytes(&mut bytes)
}

/// Parse JSON bytes to a typed value using simd-json
///
/// The buffer is used as scratch space by the parser.
///
/// # Errors
///
/// Returns `Error::BadRequest` if parsing fails
pub fn parse_json_bytes<T: DeserializeOwned>(bytes: &mut [u8]) -> Result<T> {
    simd_json::from_slice(bytes).map_err(|e| Error::BadRequest(format!("invalid JSON body: {e}")))
}

/// Serialize a value to JSON string
///
/// # Errors
///
/// Returns `Error::Json` if serialization fails
pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}
