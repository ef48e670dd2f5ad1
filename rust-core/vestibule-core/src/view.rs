//! # View Forwarding
//!
//! A handler may answer with a [`ModelView`]: a view name plus data. The
//! renderer copies the data into the request's attribute store and forwards
//! to a [`ViewResolver`], which produces the response. Templating is the
//! resolver's business.

use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::Response;
use crate::statics::resolve_under;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::debug;

/// View name plus the data handed to it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelView {
    view: String,
    data: Map<String, Value>,
}

impl ModelView {
    /// Forward to `view` with no data
    #[must_use]
    pub fn new(view: impl Into<String>) -> Self {
        Self {
            view: view.into(),
            data: Map::new(),
        }
    }

    /// Add a data entry
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.add_data(key, value);
        self
    }

    /// Add or replace a data entry
    pub fn add_data(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    /// The view name
    #[must_use]
    pub fn view(&self) -> &str {
        &self.view
    }

    /// The data mapping
    #[must_use]
    pub const fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Split into view name and data
    #[must_use]
    pub fn into_parts(self) -> (String, Map<String, Value>) {
        (self.view, self.data)
    }
}

/// Resolves a view name to a response
///
/// The request's attribute store holds the view data when `forward` runs.
pub trait ViewResolver: Send + Sync {
    /// Produce the response for `view`
    ///
    /// # Errors
    ///
    /// Returns `Error::ViewNotFound` if `view` does not exist.
    fn forward(&self, view: &str, request: &Request) -> Result<Response>;
}

impl<F> ViewResolver for F
where
    F: Fn(&str, &Request) -> Result<Response> + Send + Sync,
{
    fn forward(&self, view: &str, request: &Request) -> Result<Response> {
        self(view, request)
    }
}

/// Serves view files from a directory as HTML
#[derive(Debug, Clone)]
pub struct DirectoryViews {
    root: PathBuf,
}

impl DirectoryViews {
    /// Views are looked up under `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ViewResolver for DirectoryViews {
    fn forward(&self, view: &str, request: &Request) -> Result<Response> {
        let not_found = || Error::ViewNotFound {
            view: view.to_string(),
        };
        let file = resolve_under(&self.root, view).ok_or_else(not_found)?;
        if !file.is_file() {
            return Err(not_found());
        }
        debug!(view, file = %file.display(), attributes = request.attributes().len(), "Forwarding to view");
        let body = std::fs::read(&file)?;
        Ok(Response::new(crate::response::TEXT_HTML, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::Method;

    #[test]
    fn test_model_view_data() {
        let mv = ModelView::new("list.html").with("count", 3).with("title", "Students");
        assert_eq!(mv.view(), "list.html");
        assert_eq!(mv.data().len(), 2);
        assert_eq!(mv.data()["count"], Value::from(3));
    }

    #[test]
    fn test_closure_resolver() {
        let resolver = |view: &str, req: &Request| -> Result<Response> {
            let title = req.attribute("title").and_then(Value::as_str).unwrap_or_default();
            Ok(Response::html(format!("{view}:{title}")))
        };
        let mut req = Request::new(Method::Get, "/");
        req.set_attribute("title", "Hi");
        let resp = resolver.forward("home", &req).unwrap();
        assert_eq!(resp.body_text(), "home:Hi");
    }

    #[test]
    fn test_directory_views() {
        let dir = std::env::temp_dir().join(format!("vestibule-views-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("page.html"), "<p>page</p>").unwrap();

        let views = DirectoryViews::new(&dir);
        let req = Request::new(Method::Get, "/");
        let resp = views.forward("page.html", &req).unwrap();
        assert_eq!(resp.body_text(), "<p>page</p>");
        assert_eq!(resp.content_type, crate::response::TEXT_HTML);

        assert!(matches!(
            views.forward("missing.html", &req),
            Err(Error::ViewNotFound { .. })
        ));
        assert!(views.forward("../page.html", &req).is_err());

        std::fs::remove_dir_all(&dir).ok();
    }
}
