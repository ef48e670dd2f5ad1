//! # Vestibule Core
//!
//! Front-controller dispatch core for the Vestibule framework.
//! Every request enters through one [`Dispatcher`], which resolves a route,
//! binds request parameters to the handler's declared signature, invokes it
//! and renders the result.
//!
//! ## Architecture
//!
//! The route table is built once at startup and shared read-only by all
//! request workers. Handlers are synchronous; the HTTP server runs them on
//! Tokio's blocking pool.
//!
//! ## Modules
//!
//! - `pattern` - Path templates with typed, constrained placeholders
//! - `route` - Route descriptors and compiled routes
//! - `router` - Route table with four-tier precedence (matchit for literals)
//! - `keypath` - Dot/bracket key paths and nested trees
//! - `types` - Type descriptors and scalar conversion
//! - `binder` - Request parameters to typed handler arguments
//! - `handler` - Handler-owning types and invocation
//! - `render` - Views, JSON documents and plain text
//! - `dispatcher` - The front controller
//! - `server` - HTTP server built on Hyper
//! - `request` / `response` - Request and response wrappers
//! - `middleware` - Request/response middleware system
//! - `json` - JSON parsing with simd-json and the JSON document format
//! - `statics` / `view` - Static resources and view forwarding
//! - `error` - Error types and handling

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

extern crate self as vestibule_core;

pub mod binder;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod json;
pub mod keypath;
pub mod middleware;
pub mod pattern;
pub mod render;
pub mod request;
pub mod response;
pub mod route;
pub mod router;
pub mod server;
pub mod statics;
pub mod types;
pub mod view;

pub use binder::{BoundArguments, ParamSpec, ParameterBinder};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::{ConversionError, Error, Result};
pub use handler::{Controller, Handler, Outcome};
pub use json::{parse_json, to_json, JsonDocument};
pub use middleware::{LoggingMiddleware, Middleware, MiddlewareChain, MiddlewareResult, TimingMiddleware};
pub use pattern::{ParameterMap, PathPattern};
pub use render::ResultRenderer;
pub use request::{Request, RequestParameters};
pub use response::Response;
pub use route::{MethodConstraint, Origin, Route, RouteDescriptor};
pub use router::{Method, RouteTable, RouteTableBuilder};
pub use server::{init_tracing, Server, ServerConfig};
pub use statics::{StaticDir, StaticResources};
pub use types::{Bindable, BoundValue, FieldSpec, ObjectSchema, TypeDescriptor};
pub use view::{DirectoryViews, ModelView, ViewResolver};
pub use vestibule_macros::Bindable;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, "0.1.1");
    }
}
