//! # Route Table and Resolver
//!
//! Holds every registered route and resolves `(path, method)` to exactly one
//! of them. Literal routes are indexed in a `matchit` radix trie keyed by the
//! lower-cased path; templated routes are scanned in registration order.
//!
//! ## Precedence
//!
//! Tiers are tried in order and the first match wins:
//!
//! 1. literal routes constrained to the request method
//! 2. templated routes constrained to the request method
//! 3. literal routes accepting any method
//! 4. templated routes accepting any method
//!
//! Within a tier the earlier registration wins. The table is immutable once
//! built and is shared read-only between request workers.

use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::pattern::ParameterMap;
use crate::route::{MethodConstraint, Route, RouteDescriptor};
use matchit::Router as MatchitRouter;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// HTTP request methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// HTTP GET
    Get,
    /// HTTP POST
    Post,
    /// HTTP PUT
    Put,
    /// HTTP DELETE
    Delete,
    /// HTTP PATCH
    Patch,
    /// HTTP HEAD
    Head,
    /// HTTP OPTIONS
    Options,
    /// Any other method
    Other,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Put => write!(f, "PUT"),
            Self::Delete => write!(f, "DELETE"),
            Self::Patch => write!(f, "PATCH"),
            Self::Head => write!(f, "HEAD"),
            Self::Options => write!(f, "OPTIONS"),
            Self::Other => write!(f, "OTHER"),
        }
    }
}

impl From<&hyper::Method> for Method {
    fn from(method: &hyper::Method) -> Self {
        match *method {
            hyper::Method::GET => Self::Get,
            hyper::Method::POST => Self::Post,
            hyper::Method::PUT => Self::Put,
            hyper::Method::DELETE => Self::Delete,
            hyper::Method::PATCH => Self::Patch,
            hyper::Method::HEAD => Self::Head,
            hyper::Method::OPTIONS => Self::Options,
            _ => Self::Other,
        }
    }
}

impl From<&str> for Method {
    fn from(method: &str) -> Self {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "PATCH" => Self::Patch,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            _ => Self::Other,
        }
    }
}

/// Position of a route in registration order
pub type RouteId = usize;

/// Routes sharing one method constraint
#[derive(Clone)]
struct Tier {
    /// Literal routes keyed by lower-cased template
    literal: MatchitRouter<RouteId>,
    /// Templated routes in registration order
    templated: Vec<RouteId>,
}

impl Tier {
    fn new() -> Self {
        Self {
            literal: MatchitRouter::new(),
            templated: Vec::new(),
        }
    }
}

/// Immutable set of registered routes
#[derive(Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
    tiers: HashMap<MethodConstraint, Tier>,
}

impl RouteTable {
    /// Start building a table
    #[must_use]
    pub fn builder() -> RouteTableBuilder {
        RouteTableBuilder::default()
    }

    /// Build a table from descriptors, skipping any that fail to register
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = RouteDescriptor>) -> Self {
        descriptors
            .into_iter()
            .fold(Self::builder(), RouteTableBuilder::route)
            .build()
    }

    /// Resolve a request to its route and path parameters
    ///
    /// Returns `None` when no tier matches.
    #[must_use]
    pub fn resolve(&self, path: &str, method: Method) -> Option<(&Route, ParameterMap)> {
        let specific = MethodConstraint::for_request(method);
        let lowered = path.to_lowercase();
        let resolved = specific
            .into_iter()
            .chain(std::iter::once(MethodConstraint::Any))
            .filter_map(|constraint| self.tiers.get(&constraint))
            .find_map(|tier| {
                self.match_literal(tier, &lowered)
                    .or_else(|| self.match_templated(tier, path))
            });

        match &resolved {
            Some((route, params)) => debug!(%method, path, route = %route, ?params, "Route resolved"),
            None => debug!(%method, path, "No route matched"),
        }
        resolved
    }

    fn match_literal(&self, tier: &Tier, lowered: &str) -> Option<(&Route, ParameterMap)> {
        let matched = tier.literal.at(lowered).ok()?;
        self.routes
            .get(*matched.value)
            .map(|route| (route, ParameterMap::new()))
    }

    fn match_templated(&self, tier: &Tier, path: &str) -> Option<(&Route, ParameterMap)> {
        tier.templated.iter().find_map(|&id| {
            let route = self.routes.get(id)?;
            route.pattern().matches(path).map(|params| (route, params))
        })
    }

    /// All routes in registration order
    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Number of registered routes
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no route is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.routes.iter().map(ToString::to_string))
            .finish()
    }
}

/// Collects routes into a [`RouteTable`]
#[derive(Default)]
pub struct RouteTableBuilder {
    table: RouteTable,
}

impl RouteTableBuilder {
    /// Register a route
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPattern` if the template does not compile and
    /// `Error::DuplicateRoute` if the same template and method constraint
    /// are already registered.
    pub fn add_route(&mut self, descriptor: RouteDescriptor) -> Result<RouteId> {
        let route = Route::compile(descriptor)?;
        let key = route.pattern().template().to_lowercase();
        let duplicate = self.table.routes.iter().any(|r| {
            r.method() == route.method() && r.pattern().template().to_lowercase() == key
        });
        if duplicate {
            return Err(Error::DuplicateRoute {
                pattern: route.pattern().template().to_string(),
                method: route.method().to_string(),
            });
        }

        let id = self.table.routes.len();
        let tier = self
            .table
            .tiers
            .entry(route.method())
            .or_insert_with(Tier::new);
        if route.pattern().is_literal() {
            tier.literal
                .insert(key, id)
                .map_err(|e| Error::InvalidPattern {
                    pattern: route.pattern().template().to_string(),
                    reason: e.to_string(),
                })?;
        } else {
            tier.templated.push(id);
        }

        info!(route = %route, "Mapped route");
        self.table.routes.push(route);
        Ok(id)
    }

    /// Register a route, logging and skipping it on failure
    #[must_use]
    pub fn route(mut self, descriptor: RouteDescriptor) -> Self {
        let label = format!("{} -> {} [{}]", descriptor.pattern, descriptor.handler, descriptor.method);
        if let Err(e) = self.add_route(descriptor) {
            warn!(route = %label, error = %e, "Skipping route");
        }
        self
    }

    /// Register a GET route
    #[must_use]
    pub fn get(self, path: &str, handler: impl Into<Arc<Handler>>) -> Self {
        self.route(RouteDescriptor::get(path, handler))
    }

    /// Register a POST route
    #[must_use]
    pub fn post(self, path: &str, handler: impl Into<Arc<Handler>>) -> Self {
        self.route(RouteDescriptor::post(path, handler))
    }

    /// Register a method-agnostic route
    #[must_use]
    pub fn path(self, path: &str, handler: impl Into<Arc<Handler>>) -> Self {
        self.route(RouteDescriptor::path(path, handler))
    }

    /// Register a route at the handler's convention path
    #[must_use]
    pub fn convention(self, handler: impl Into<Arc<Handler>>) -> Self {
        self.route(RouteDescriptor::convention(handler))
    }

    /// Finish building
    #[must_use]
    pub fn build(self) -> RouteTable {
        info!(routes = self.table.len(), "Route table ready");
        self.table
    }
}
