//! # Middleware System
//!
//! Request/response interception around dispatch.
//!
//! Middlewares run in registration order before dispatch and in reverse
//! order after it. A middleware may short-circuit with its own response.

use crate::request::Request;
use crate::response::Response;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info};

/// Middleware trait for request/response interception
pub trait Middleware: Send + Sync {
    /// Called before dispatch
    ///
    /// Return [`MiddlewareResult::Respond`] to skip dispatch.
    fn before_request(&self, _req: &Request) -> MiddlewareResult {
        MiddlewareResult::Continue
    }

    /// Called after dispatch, with the response about to be sent
    fn after_response(&self, _req: &Request, _res: &mut Response) {}

    /// Middleware name for logging
    fn name(&self) -> &'static str {
        "Unknown"
    }
}

/// Result of middleware execution
#[derive(Debug)]
pub enum MiddlewareResult {
    /// Continue to next middleware/dispatch
    Continue,
    /// Short-circuit with this response
    Respond(Response),
}

/// Ordered middleware chain
#[derive(Default, Clone)]
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    /// Create a new empty middleware chain
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a middleware to the chain
    pub fn add<M: Middleware + 'static>(&mut self, middleware: M) {
        debug!(middleware = middleware.name(), "Middleware added");
        self.middlewares.push(Arc::new(middleware));
    }

    /// Execute `before_request` for all middlewares
    pub fn run_before(&self, req: &Request) -> MiddlewareResult {
        for mw in &self.middlewares {
            match mw.before_request(req) {
                MiddlewareResult::Continue => continue,
                result => return result,
            }
        }
        MiddlewareResult::Continue
    }

    /// Execute `after_response` for all middlewares, in reverse order
    pub fn run_after(&self, req: &Request, res: &mut Response) {
        for mw in self.middlewares.iter().rev() {
            mw.after_response(req, res);
        }
    }

    /// Get the number of middlewares
    #[must_use]
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Check if chain is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }
}

/// Logs one structured event per request and per response
#[derive(Default)]
pub struct LoggingMiddleware {
    log_params: bool,
}

impl LoggingMiddleware {
    /// Create a new logging middleware
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also log the number of request parameters and files
    #[must_use]
    pub const fn with_params(mut self) -> Self {
        self.log_params = true;
        self
    }
}

impl Middleware for LoggingMiddleware {
    fn before_request(&self, req: &Request) -> MiddlewareResult {
        let request_id = req.header("x-request-id").unwrap_or("-");
        if self.log_params {
            info!(
                method = %req.method,
                path = %req.path,
                request_id = %request_id,
                params = req.params().len(),
                files = req.files().len(),
                "Request received"
            );
        } else {
            info!(
                method = %req.method,
                path = %req.path,
                request_id = %request_id,
                "Request received"
            );
        }
        MiddlewareResult::Continue
    }

    fn after_response(&self, req: &Request, res: &mut Response) {
        let request_id = req.header("x-request-id").unwrap_or("-");
        info!(
            method = %req.method,
            path = %req.path,
            status = res.status,
            request_id = %request_id,
            "Response sent"
        );
    }

    fn name(&self) -> &'static str {
        "LoggingMiddleware"
    }
}

/// Measures dispatch time and reports it in `x-response-time`
///
/// Start times are keyed by request id, so the server must assign one
/// before the chain runs.
#[derive(Default)]
pub struct TimingMiddleware {
    start_times: Mutex<HashMap<String, Instant>>,
}

impl TimingMiddleware {
    /// Create a new timing middleware
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(req: &Request) -> String {
        req.header("x-request-id")
            .map_or_else(|| format!("{}:{}", req.method, req.path), str::to_string)
    }
}

impl Middleware for TimingMiddleware {
    fn before_request(&self, req: &Request) -> MiddlewareResult {
        if let Ok(mut times) = self.start_times.lock() {
            times.insert(Self::key(req), Instant::now());
        }
        MiddlewareResult::Continue
    }

    fn after_response(&self, req: &Request, res: &mut Response) {
        let start = self
            .start_times
            .lock()
            .ok()
            .and_then(|mut times| times.remove(&Self::key(req)));
        if let Some(start) = start {
            let duration = start.elapsed();
            res.set_header("x-response-time", &format!("{}us", duration.as_micros()));
            debug!(
                method = %req.method,
                path = %req.path,
                duration_us = %duration.as_micros(),
                "Request timing"
            );
        }
    }

    fn name(&self) -> &'static str {
        "TimingMiddleware"
    }
}
