//! # Dispatcher
//!
//! The front controller: one call per request.
//!
//! 1. normalize the path (strip the base prefix, empty becomes `/`, drop one
//!    trailing slash)
//! 2. serve a static resource if the path names one
//! 3. resolve the route; unmatched paths get a 200 page echoing the path
//! 4. store path parameters as request attributes, bind, invoke
//! 5. render the outcome, or a 500 plain-text description of the failure
//!
//! A failing handler affects only its own request.

use crate::binder::ParameterBinder;
use crate::keypath::DEFAULT_MAX_INDEX;
use crate::render::ResultRenderer;
use crate::request::Request;
use crate::response::Response;
use crate::router::RouteTable;
use crate::statics::{StaticDir, StaticResources};
use crate::view::{DirectoryViews, ViewResolver};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error};

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Deployment prefix stripped from request paths (e.g. `/app`)
    pub base_path: String,
    /// Directory of static resources served ahead of routing
    pub static_root: Option<PathBuf>,
    /// Directory of view files for view forwards
    pub view_root: Option<PathBuf>,
    /// Largest list index honored in compound keys (default: 4096)
    pub max_index: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            base_path: String::new(),
            static_root: None,
            view_root: None,
            max_index: DEFAULT_MAX_INDEX,
        }
    }
}

impl DispatcherConfig {
    /// Set the deployment prefix
    #[must_use]
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    /// Serve static resources from `root`
    #[must_use]
    pub fn with_static_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.static_root = Some(root.into());
        self
    }

    /// Resolve views under `root`
    #[must_use]
    pub fn with_view_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.view_root = Some(root.into());
        self
    }

    /// Skip compound keys indexing past `max_index`
    #[must_use]
    pub const fn with_max_index(mut self, max_index: usize) -> Self {
        self.max_index = max_index;
        self
    }
}

/// Front controller over an immutable route table
#[derive(Clone)]
pub struct Dispatcher {
    routes: Arc<RouteTable>,
    base_path: String,
    statics: Option<Arc<dyn StaticResources>>,
    renderer: ResultRenderer,
    max_index: usize,
}

impl Dispatcher {
    /// Dispatcher with default configuration
    #[must_use]
    pub fn new(routes: impl Into<Arc<RouteTable>>) -> Self {
        Self::with_config(routes, DispatcherConfig::default())
    }

    /// Dispatcher with explicit configuration
    #[must_use]
    pub fn with_config(routes: impl Into<Arc<RouteTable>>, config: DispatcherConfig) -> Self {
        let mut dispatcher = Self {
            routes: routes.into(),
            base_path: config.base_path.trim_end_matches('/').to_string(),
            statics: None,
            renderer: ResultRenderer::new().with_max_index(config.max_index),
            max_index: config.max_index,
        };
        if let Some(root) = config.static_root {
            dispatcher = dispatcher.with_statics(StaticDir::new(root));
        }
        if let Some(root) = config.view_root {
            dispatcher = dispatcher.with_views(DirectoryViews::new(root));
        }
        dispatcher
    }

    /// Use `statics` for static resources
    #[must_use]
    pub fn with_statics(mut self, statics: impl StaticResources + 'static) -> Self {
        self.statics = Some(Arc::new(statics));
        self
    }

    /// Use `views` for view forwards
    #[must_use]
    pub fn with_views(mut self, views: impl ViewResolver + 'static) -> Self {
        self.renderer = self.renderer.with_views(views);
        self
    }

    /// The shared route table
    #[must_use]
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Handle one request
    pub fn handle(&self, request: &mut Request) -> Response {
        let relative = self.strip_base(&request.path).to_string();
        let path = normalize(&relative);

        if let Some(statics) = &self.statics {
            if statics.exists(&path) {
                return statics.serve(&path).unwrap_or_else(|e| {
                    error!(path = %path, error = %e, "Static resource failed");
                    Response::text(e.to_string()).with_status(500)
                });
            }
        }

        let Some((route, params)) = self.routes.resolve(&path, request.method) else {
            debug!(method = %request.method, path = %path, "Serving path echo");
            return path_echo(&relative);
        };

        for (name, value) in params {
            request.set_attribute(name, value);
        }

        let handler = route.handler();
        let binder = ParameterBinder::for_request(request).with_max_index(self.max_index);
        match handler.call(&binder, request) {
            Ok(outcome) => self.renderer.render(handler, outcome, request),
            Err(e) => Response::text(e.to_string()).with_status(500),
        }
    }

    fn strip_base<'p>(&self, path: &'p str) -> &'p str {
        if self.base_path.is_empty() {
            return path;
        }
        path.strip_prefix(self.base_path.as_str())
            .filter(|rest| rest.is_empty() || rest.starts_with('/'))
            .unwrap_or(path)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.routes.len())
            .field("base_path", &self.base_path)
            .field("statics", &self.statics.is_some())
            .field("renderer", &self.renderer)
            .field("max_index", &self.max_index)
            .finish()
    }
}

/// Empty becomes `/`; one trailing slash is dropped except on the root
fn normalize(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    match path.strip_suffix('/') {
        Some(trimmed) if !trimmed.is_empty() => trimmed.to_string(),
        _ => path.to_string(),
    }
}

fn path_echo(path: &str) -> Response {
    Response::html(format!(
        "<html><body>\n<h1>Path: {}</h1>\n</body></html>\n",
        escape_html(path)
    ))
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::BoundArguments;
    use crate::handler::{Controller, Handler, Outcome};
    use crate::types::{Bindable, FieldSpec, ObjectSchema, TypeDescriptor};
    use crate::response::{TEXT_HTML, TEXT_PLAIN};
    use crate::router::Method;
    use anyhow::anyhow;

    struct Items;

    impl Controller for Items {
        fn construct() -> Option<Self> {
            Some(Self)
        }
    }

    struct Corrupt;

    impl Bindable for Corrupt {
        fn descriptor() -> TypeDescriptor {
            fn fields() -> Vec<FieldSpec> {
                panic!("property table unavailable")
            }
            TypeDescriptor::Object(ObjectSchema::new("Corrupt", fields))
        }
    }

    fn dispatcher(config: DispatcherConfig) -> Dispatcher {
        let table = RouteTable::builder()
            .get(
                "/items/{id}",
                Handler::new("show", |_: &mut Items, args: &BoundArguments| {
                    Ok(format!("item {}", args.int("id")).into())
                })
                .param::<i64>("id"),
            )
            .get(
                "/fail",
                Handler::new("fail", |_: &mut Items, _: &BoundArguments| -> anyhow::Result<Outcome> {
                    Err(anyhow!("database unavailable"))
                }),
            )
            .get("/", Handler::new("home", |_: &mut Items, _: &BoundArguments| Ok("home".into())))
            .post(
                "/corrupt",
                Handler::new("corrupt", |_: &mut Items, _: &BoundArguments| Ok(Outcome::Empty))
                    .param::<Corrupt>("c"),
            )
            .build();
        Dispatcher::with_config(table, config)
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize("/items/"), "/items");
        assert_eq!(normalize("/items"), "/items");
    }

    #[test]
    fn test_path_parameters_reach_handler() {
        let resp = dispatcher(DispatcherConfig::default()).handle(&mut Request::new(Method::Get, "/items/42/"));
        assert_eq!(resp.status, 200);
        assert_eq!(resp.content_type, TEXT_PLAIN);
        assert!(resp.body_text().ends_with("item 42\n"));
    }

    #[test]
    fn test_base_path_is_stripped() {
        let d = dispatcher(DispatcherConfig::default().with_base_path("/app/"));
        assert!(d.handle(&mut Request::new(Method::Get, "/app/items/7")).body_text().contains("item 7"));
        assert!(d.handle(&mut Request::new(Method::Get, "/app")).body_text().contains("home"));
        assert!(d.handle(&mut Request::new(Method::Get, "/application")).body_text().contains("Path: /application"));
    }

    #[test]
    fn test_unmatched_path_echo() {
        let resp = dispatcher(DispatcherConfig::default()).handle(&mut Request::new(Method::Get, "/nothing/<here>"));
        assert_eq!(resp.status, 200);
        assert_eq!(resp.content_type, TEXT_HTML);
        assert!(resp.body_text().contains("<h1>Path: /nothing/&lt;here&gt;</h1>"));
    }

    #[test]
    fn test_handler_failure_is_500_text() {
        let d = dispatcher(DispatcherConfig::default());
        let resp = d.handle(&mut Request::new(Method::Get, "/fail"));
        assert_eq!(resp.status, 500);
        assert_eq!(resp.content_type, TEXT_PLAIN);
        assert_eq!(resp.body_text(), "database unavailable");

        let after = d.handle(&mut Request::new(Method::Get, "/items/1"));
        assert_eq!(after.status, 200);
    }

    #[test]
    fn test_static_resources_served_first() {
        let dir = std::env::temp_dir().join(format!("vestibule-dispatch-{}", std::process::id()));
        std::fs::create_dir_all(dir.join("items")).unwrap();
        std::fs::write(dir.join("items/9"), "static nine").unwrap();

        let d = dispatcher(DispatcherConfig::default().with_static_root(&dir));
        assert_eq!(d.handle(&mut Request::new(Method::Get, "/items/9")).body_text(), "static nine");
        assert!(d.handle(&mut Request::new(Method::Get, "/items/8")).body_text().contains("item 8"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_binding_panic_is_500_text() {
        let d = dispatcher(DispatcherConfig::default());
        let resp = d.handle(&mut Request::new(Method::Post, "/corrupt?c.x=1"));
        assert_eq!(resp.status, 500);
        assert_eq!(resp.content_type, TEXT_PLAIN);
        assert_eq!(resp.body_text(), "property table unavailable");

        assert_eq!(d.handle(&mut Request::new(Method::Get, "/items/3")).status, 200);
    }

    #[test]
    fn test_huge_index_does_not_abort() {
        let d = dispatcher(DispatcherConfig::default().with_max_index(16));
        let resp = d.handle(&mut Request::new(Method::Get, "/items/5?x[1000000000000]=1"));
        assert_eq!(resp.status, 200);
        assert!(resp.body_text().contains("item 5"));
    }
}
