//! # Error Handling
//!
//! Centralized error types for Vestibule core.
//! Uses `thiserror` for ergonomic error definitions.
//!
//! Binding never raises: scalar conversion failures are reported as
//! [`ConversionError`] and coalesced to a default at the call site.

use thiserror::Error;

/// Result type alias for Vestibule operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the Vestibule runtime
#[derive(Error, Debug)]
pub enum Error {
    /// Server failed to bind to the specified address
    #[error("Failed to bind server to {address}: {source}")]
    BindError {
        /// The address we tried to bind to
        address: String,
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Route template could not be compiled
    #[error("Invalid route pattern: {pattern}: {reason}")]
    InvalidPattern {
        /// The invalid pattern
        pattern: String,
        /// Reason for invalidity
        reason: String,
    },

    /// A route with the same pattern and method is already registered
    #[error("Duplicate route: {method} {pattern}")]
    DuplicateRoute {
        /// The normalized pattern
        pattern: String,
        /// The method constraint
        method: String,
    },

    /// Method constraint outside GET, POST and ANY
    #[error("Unsupported method constraint: {0}")]
    InvalidMethod(String),

    /// The handler-owning type could not be instantiated
    #[error("Cannot construct handler owner {owner}: no usable constructor")]
    HandlerConstruction {
        /// Owning type name
        owner: String,
    },

    /// The handler returned an error or panicked
    #[error("{message}")]
    Invocation {
        /// `Owner#handler` of the failed call
        handler: String,
        /// Description of the failure
        message: String,
    },

    /// A view-forward named a view that cannot be resolved
    #[error("No view found for: {view}")]
    ViewNotFound {
        /// The requested view name
        view: String,
    },

    /// The result could not be rendered
    #[error("Render failure: {0}")]
    Render(String),

    /// Malformed inbound request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Request payload too large
    #[error("Payload too large: limit={limit} bytes, received={actual} bytes")]
    PayloadTooLarge {
        /// Max allowed size
        limit: usize,
        /// Actual size
        actual: usize,
    },

    /// HTTP protocol error
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to convert a raw request string into a declared scalar type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    /// No value was supplied
    #[error("missing value")]
    Missing,

    /// The raw text does not parse as the target type
    #[error("cannot convert '{raw}' to {target}")]
    Unparsable {
        /// Raw request text
        raw: String,
        /// Target type name
        target: &'static str,
    },

    /// The target type cannot be built from a single string
    #[error("{target} cannot be assigned from a scalar value")]
    NotScalar {
        /// Target type name
        target: &'static str,
    },
}
