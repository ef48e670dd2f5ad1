//! # Static Resources
//!
//! Files served directly when the request path names one, ahead of routing.

use crate::error::Result;
use crate::response::Response;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Static-file collaborator consulted before route resolution
pub trait StaticResources: Send + Sync {
    /// Whether `path` names an existing resource
    fn exists(&self, path: &str) -> bool;

    /// Serve the resource at `path`
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the resource cannot be read.
    fn serve(&self, path: &str) -> Result<Response>;
}

/// Serves files under a root directory
#[derive(Debug, Clone)]
pub struct StaticDir {
    root: PathBuf,
}

impl StaticDir {
    /// Serve files under `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn file(&self, path: &str) -> Option<PathBuf> {
        resolve_under(&self.root, path).filter(|p| p.is_file())
    }
}

impl StaticResources for StaticDir {
    fn exists(&self, path: &str) -> bool {
        self.file(path).is_some()
    }

    fn serve(&self, path: &str) -> Result<Response> {
        let file = self.file(path).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, format!("no static resource at {path}"))
        })?;
        let bytes = std::fs::read(&file)?;
        debug!(path, size = bytes.len(), "Serving static resource");
        Ok(Response::new(content_type(&file), bytes))
    }
}

/// Map a URL path onto `root`, refusing anything that escapes it
pub(crate) fn resolve_under(root: &Path, url_path: &str) -> Option<PathBuf> {
    let mut resolved = root.to_path_buf();
    for component in Path::new(url_path.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(resolved)
}

/// Content type derived from the file extension
fn content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("html" | "htm") => "text/html",
        Some("css") => "text/css",
        Some("txt") => "text/plain;charset=UTF-8",
        Some("js" | "mjs") => "application/javascript",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("webp") => "image/webp",
        Some("woff2") => "font/woff2",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}
