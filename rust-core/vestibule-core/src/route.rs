//! # Route Metadata
//!
//! Every registration style (verb-specific, explicit path, naming
//! convention) is normalized into one [`RouteDescriptor`] before it reaches
//! the table. A [`Route`] is a descriptor whose pattern has been compiled.

use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::pattern::PathPattern;
use crate::router::Method;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// HTTP method a route accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodConstraint {
    /// GET only
    Get,
    /// POST only
    Post,
    /// Any method
    Any,
}

impl MethodConstraint {
    /// The specific constraint a request method can satisfy, if any
    ///
    /// Methods other than GET and POST only reach `Any` routes.
    #[must_use]
    pub const fn for_request(method: Method) -> Option<Self> {
        match method {
            Method::Get => Some(Self::Get),
            Method::Post => Some(Self::Post),
            _ => None,
        }
    }
}

impl fmt::Display for MethodConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Any => "ANY",
        })
    }
}

impl FromStr for MethodConstraint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "ANY" | "ALL" | "" => Ok(Self::Any),
            other => Err(Error::InvalidMethod(other.to_string())),
        }
    }
}

/// How a route was declared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Path given explicitly, method-agnostic unless stated
    ExplicitPath,
    /// Verb-specific declaration (GET or POST)
    Verb,
    /// Derived from the owner and handler names
    Convention,
}

/// Uncompiled route registration
#[derive(Debug, Clone)]
pub struct RouteDescriptor {
    /// Route template
    pub pattern: String,
    /// Accepted method
    pub method: MethodConstraint,
    /// Target handler
    pub handler: Arc<Handler>,
    /// Declaration style
    pub origin: Origin,
}

impl RouteDescriptor {
    /// Describe a route
    #[must_use]
    pub fn new(
        pattern: impl Into<String>,
        method: MethodConstraint,
        handler: impl Into<Arc<Handler>>,
        origin: Origin,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            method,
            handler: handler.into(),
            origin,
        }
    }

    /// GET-only route
    #[must_use]
    pub fn get(pattern: impl Into<String>, handler: impl Into<Arc<Handler>>) -> Self {
        Self::new(pattern, MethodConstraint::Get, handler, Origin::Verb)
    }

    /// POST-only route
    #[must_use]
    pub fn post(pattern: impl Into<String>, handler: impl Into<Arc<Handler>>) -> Self {
        Self::new(pattern, MethodConstraint::Post, handler, Origin::Verb)
    }

    /// Method-agnostic route at an explicit path
    #[must_use]
    pub fn path(pattern: impl Into<String>, handler: impl Into<Arc<Handler>>) -> Self {
        Self::new(pattern, MethodConstraint::Any, handler, Origin::ExplicitPath)
    }

    /// Method-agnostic route at the path derived from the handler's names
    #[must_use]
    pub fn convention(handler: impl Into<Arc<Handler>>) -> Self {
        let handler = handler.into();
        let pattern = convention_path(handler.owner(), handler.name());
        Self::new(pattern, MethodConstraint::Any, handler, Origin::Convention)
    }
}

/// Path derived from an owner type name and a handler name
///
/// `StudentController` + `index` gives `/student`; any other handler name
/// is appended: `StudentController` + `list` gives `/student/list`.
#[must_use]
pub fn convention_path(owner: &str, handler: &str) -> String {
    let base = owner.strip_suffix("Controller").unwrap_or(owner);
    let path = if handler == "index" {
        format!("/{base}")
    } else {
        format!("/{base}/{handler}")
    };
    path.to_lowercase()
}

/// A compiled, registered route
#[derive(Debug, Clone)]
pub struct Route {
    pattern: PathPattern,
    method: MethodConstraint,
    handler: Arc<Handler>,
    origin: Origin,
}

impl Route {
    /// Compile a descriptor
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPattern` if the template does not compile.
    pub fn compile(descriptor: RouteDescriptor) -> Result<Self> {
        Ok(Self {
            pattern: PathPattern::compile(&descriptor.pattern)?,
            method: descriptor.method,
            handler: descriptor.handler,
            origin: descriptor.origin,
        })
    }

    /// Compiled path pattern
    #[must_use]
    pub const fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    /// Accepted method
    #[must_use]
    pub const fn method(&self) -> MethodConstraint {
        self.method
    }

    /// Target handler
    #[must_use]
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Declaration style
    #[must_use]
    pub const fn origin(&self) -> Origin {
        self.origin
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} [{}]", self.pattern, self.handler, self.method)
    }
}
