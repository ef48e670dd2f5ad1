//! # Result Rendering
//!
//! Turns a handler's [`Outcome`] into a response:
//!
//! - handlers flagged JSON always produce a [`JsonDocument`], echoing the
//!   request parameters as a nested tree when the outcome is not a map
//! - [`Outcome::View`] copies its data into the attribute store and forwards
//!   to the configured [`ViewResolver`]
//! - anything else renders as diagnostic plain text

use crate::error::Error;
use crate::handler::{Handler, Outcome};
use crate::json::{JsonDocument, ERROR_DOCUMENT};
use crate::keypath::{nest, DEFAULT_MAX_INDEX};
use crate::request::Request;
use crate::response::Response;
use crate::view::{ModelView, ViewResolver};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Renders handler outcomes
#[derive(Clone)]
pub struct ResultRenderer {
    views: Option<Arc<dyn ViewResolver>>,
    max_index: usize,
}

impl Default for ResultRenderer {
    fn default() -> Self {
        Self {
            views: None,
            max_index: DEFAULT_MAX_INDEX,
        }
    }
}

impl ResultRenderer {
    /// Renderer without a view resolver
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward views to `views`
    #[must_use]
    pub fn with_views(mut self, views: impl ViewResolver + 'static) -> Self {
        self.views = Some(Arc::new(views));
        self
    }

    /// Largest list index honored when echoing parameters as JSON
    #[must_use]
    pub const fn with_max_index(mut self, max_index: usize) -> Self {
        self.max_index = max_index;
        self
    }

    /// Render `outcome` produced by `handler` for `request`
    pub fn render(&self, handler: &Handler, outcome: Outcome, request: &mut Request) -> Response {
        if handler.is_json() {
            return render_json(outcome, request, self.max_index);
        }
        match outcome {
            Outcome::View(mv) => self.render_view(mv, request),
            other => render_plain(handler, &other),
        }
    }

    fn render_view(&self, mv: ModelView, request: &mut Request) -> Response {
        let (view, data) = mv.into_parts();
        for (key, value) in data {
            request.set_attribute(key, value);
        }

        let forwarded = match (&self.views, view.is_empty()) {
            (Some(views), false) => views.forward(&view, request),
            _ => Err(Error::ViewNotFound { view }),
        };
        forwarded.unwrap_or_else(|e| {
            warn!(error = %e, "View forward failed");
            Response::text(format!("{e}\n")).with_status(500)
        })
    }
}

impl fmt::Debug for ResultRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultRenderer")
            .field("views", &self.views.is_some())
            .field("max_index", &self.max_index)
            .finish()
    }
}

fn render_json(outcome: Outcome, request: &Request, max_index: usize) -> Response {
    let data = match outcome {
        Outcome::Data(map) => map,
        _ => nest(request.params().iter(), max_index),
    };
    match JsonDocument::ok(data).to_json() {
        Ok(body) => Response::json(body),
        Err(e) => {
            error!(error = %e, "JSON document serialization failed");
            Response::json(ERROR_DOCUMENT).with_status(500)
        }
    }
}

fn render_plain(handler: &Handler, outcome: &Outcome) -> Response {
    if !handler.owner_marked() {
        debug!(owner = handler.owner(), "Plain result from unregistered owner");
        return Response::text(format!("not a registered handler: {}\n", handler.owner()));
    }

    let value = match outcome {
        Outcome::Text(text) => text.clone(),
        Outcome::Data(map) => serde_json::Value::Object(map.clone()).to_string(),
        Outcome::View(mv) => mv.view().to_string(),
        Outcome::Empty => "null result".to_string(),
    };
    Response::text(format!(
        "Owning type: {}\nHandler: {}\n{value}\n",
        handler.owner(),
        handler.name()
    ))
}
