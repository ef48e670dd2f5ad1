//! # HTTP Server
//!
//! HTTP/1 server built on Hyper and Tokio, fronting a [`Dispatcher`].
//!
//! ## Key Features
//!
//! - One task per connection; dispatch runs on the blocking pool since
//!   handlers are synchronous
//! - Graceful shutdown on Ctrl-C, draining in-flight connections
//! - Request body size limit (413)
//! - Request ids and a middleware chain around dispatch

use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};
use crate::middleware::{Middleware, MiddlewareChain, MiddlewareResult};
use crate::request::Request;
use crate::response::Response;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// HTTP Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub address: SocketAddr,
    /// Enable keep-alive connections
    pub keep_alive: bool,
    /// Shutdown timeout for graceful shutdown (default: 30 seconds)
    pub shutdown_timeout: Duration,
    /// Max request body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 8000).into(),
            keep_alive: true,
            shutdown_timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024,
        }
    }
}

/// Install a JSON `tracing` subscriber
///
/// `RUST_LOG` directives apply on top of `vestibule_core=info`. Does nothing
/// if a global subscriber is already installed.
pub fn init_tracing() {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "vestibule_core=info".parse() {
        filter = filter.add_directive(directive);
    }
    let _ = tracing_subscriber::fmt().with_env_filter(filter).json().try_init();
}

/// HTTP server
pub struct Server {
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
    middleware: MiddlewareChain,
}

impl Server {
    /// Create a server for `dispatcher` with default configuration
    #[must_use]
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            config: ServerConfig::default(),
            dispatcher: Arc::new(dispatcher),
            middleware: MiddlewareChain::new(),
        }
    }

    /// Replace the configuration
    #[must_use]
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Bind the server to an address
    #[must_use]
    pub const fn bind(mut self, addr: SocketAddr) -> Self {
        self.config.address = addr;
        self
    }

    /// Set max request body size
    pub fn set_max_body_size(&mut self, bytes: usize) {
        self.config.max_body_size = bytes;
    }

    /// Add a middleware to the chain
    pub fn add_middleware<M: Middleware + 'static>(&mut self, middleware: M) {
        self.middleware.add(middleware);
    }

    /// Current configuration
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Accept connections until Ctrl-C, then drain
    ///
    /// # Errors
    ///
    /// Returns `Error::BindError` if the listening socket cannot be set up
    /// and `Error::Io` if accepting fails.
    pub async fn serve(&self) -> Result<()> {
        let addr = self.config.address;
        let listener = bind_listener(addr).map_err(|source| Error::BindError {
            address: addr.to_string(),
            source,
        })?;

        info!(
            address = %addr,
            routes = self.dispatcher.routes().len(),
            "Server listening"
        );

        let middleware = Arc::new(self.middleware.clone());
        let active = Arc::new(AtomicUsize::new(0));
        let max_body_size = self.config.max_body_size;
        let keep_alive = self.config.keep_alive;

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    let (stream, remote_addr) = accept_result?;
                    let io = TokioIo::new(stream);

                    let dispatcher = self.dispatcher.clone();
                    let middleware = middleware.clone();
                    let active = active.clone();

                    tokio::task::spawn(async move {
                        active.fetch_add(1, Ordering::Relaxed);

                        let service = service_fn(move |req| {
                            let dispatcher = dispatcher.clone();
                            let middleware = middleware.clone();
                            async move {
                                handle_request(req, dispatcher, &middleware, remote_addr, max_body_size).await
                            }
                        });
                        if let Err(err) = http1::Builder::new()
                            .keep_alive(keep_alive)
                            .serve_connection(io, service)
                            .await
                        {
                            error!(remote = %remote_addr, error = ?err, "Error serving connection");
                        }
                        active.fetch_sub(1, Ordering::Relaxed);
                    });
                }
                () = shutdown_signal() => {
                    info!("Shutdown signal received, stopping server...");
                    break;
                }
            }
        }

        let timeout = self.config.shutdown_timeout;
        let drain = async {
            while active.load(Ordering::Relaxed) > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!(
                remaining = active.load(Ordering::Relaxed),
                "Shutdown timeout reached with connections still open"
            );
        }
        Ok(())
    }

    /// Run a request through the full pipeline without a network stack
    pub async fn test_request(&self, mut req: Request) -> Response {
        if let Some(len) = req.body_bytes().map(<[u8]>::len) {
            if len > self.config.max_body_size {
                return payload_too_large();
            }
        }
        req.set_header("x-client-ip", "test");
        process_request(req, self.dispatcher.clone(), &self.middleware).await
    }
}

fn bind_listener(addr: SocketAddr) -> std::io::Result<tokio::net::TcpListener> {
    let socket = if addr.is_ipv4() {
        tokio::net::TcpSocket::new_v4()?
    } else {
        tokio::net::TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    #[cfg(not(windows))]
    {
        socket.set_reuseport(true)?;
    }
    socket.bind(addr)?;
    socket.listen(1024)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown disabled");
        std::future::pending::<()>().await;
    }
}

/// Core request processing (network agnostic)
async fn process_request(mut req: Request, dispatcher: Arc<Dispatcher>, middleware: &MiddlewareChain) -> Response {
    if req.header("x-request-id").is_none() {
        req.set_header("x-request-id", &generate_request_id());
    }

    let (req, mut response) = match middleware.run_before(&req) {
        MiddlewareResult::Respond(resp) => (req, resp),
        MiddlewareResult::Continue => {
            let (method, path) = (req.method, req.path.clone());
            let request_id = req.header("x-request-id").map(str::to_string);
            let dispatched = tokio::task::spawn_blocking(move || {
                let response = dispatcher.handle(&mut req);
                (req, response)
            })
            .await;
            dispatched.unwrap_or_else(|e| {
                error!(error = %e, "Dispatch task failed");
                let mut failed = Request::new(method, path);
                if let Some(id) = &request_id {
                    failed.set_header("x-request-id", id);
                }
                (failed, Response::text("Internal Server Error").with_status(500))
            })
        }
    };

    if let Some(request_id) = req.header("x-request-id") {
        response.set_header("x-request-id", request_id);
    }
    middleware.run_after(&req, &mut response);
    response
}

async fn handle_request(
    req: hyper::Request<hyper::body::Incoming>,
    dispatcher: Arc<Dispatcher>,
    middleware: &MiddlewareChain,
    remote_addr: SocketAddr,
    max_body_size: usize,
) -> std::result::Result<hyper::Response<Full<Bytes>>, hyper::Error> {
    let mut request = match Request::from_hyper_with_limit(req, max_body_size).await {
        Ok(r) => r,
        Err(e @ Error::PayloadTooLarge { .. }) => {
            warn!(remote = %remote_addr, error = %e, "Rejected request body");
            return Ok(payload_too_large().into_hyper());
        }
        Err(e) => {
            error!(remote = %remote_addr, error = %e, "Failed to parse request");
            return Ok(Response::text("Bad Request").with_status(400).into_hyper());
        }
    };

    request.set_header("x-client-ip", &remote_addr.ip().to_string());
    let response = process_request(request, dispatcher, middleware).await;
    Ok(response.into_hyper())
}

fn payload_too_large() -> Response {
    Response::text("Payload Too Large").with_status(413)
}

static REQUEST_COUNTER: AtomicUsize = AtomicUsize::new(1);

fn generate_request_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let counter = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:x}-{:x}", now.as_nanos(), counter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::BoundArguments;
    use crate::handler::{Controller, Handler, Outcome};
    use crate::middleware::TimingMiddleware;
    use crate::router::{Method, RouteTable};
    use crate::view::ModelView;

    struct Echo;

    impl Controller for Echo {
        fn construct() -> Option<Self> {
            Some(Self)
        }
    }

    fn server() -> Server {
        let table = RouteTable::builder()
            .post(
                "/echo",
                Handler::new("echo", |_: &mut Echo, args: &BoundArguments| -> anyhow::Result<Outcome> {
                    Ok(args.str("msg").unwrap_or_default().into())
                })
                .param::<String>("msg"),
            )
            .build();
        Server::new(Dispatcher::new(table))
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.address.port(), 8000);
        assert!(config.keep_alive);
        assert_eq!(config.max_body_size, 1024 * 1024);
    }

    #[test]
    fn test_request_ids_are_unique() {
        assert_ne!(generate_request_id(), generate_request_id());
    }

    #[tokio::test]
    async fn test_request_pipeline() {
        let mut server = server();
        server.add_middleware(TimingMiddleware::new());
        let req = Request::new(Method::Post, "/echo")
            .with_body("application/x-www-form-urlencoded", "msg=hello+world")
            .unwrap();
        let resp = server.test_request(req).await;
        assert_eq!(resp.status, 200);
        assert!(resp.body_text().ends_with("hello world\n"));
        assert!(resp.header("x-request-id").is_some());
        assert!(resp.header("x-response-time").is_some());
    }

    #[tokio::test]
    async fn test_request_body_limit() {
        let mut server = server();
        server.set_max_body_size(4);
        let req = Request::new(Method::Post, "/echo")
            .with_body("text/plain", "far too long")
            .unwrap();
        assert_eq!(server.test_request(req).await.status, 413);
    }

    #[tokio::test]
    async fn test_after_hooks_run_when_dispatch_panics() {
        let table = RouteTable::builder()
            .post(
                "/page",
                Handler::new("page", |_: &mut Echo, _: &BoundArguments| -> anyhow::Result<Outcome> {
                    Ok(ModelView::new("page.html").into())
                }),
            )
            .build();
        let dispatcher = Dispatcher::new(table).with_views(|_: &str, _: &Request| -> Result<Response> {
            panic!("template engine crashed")
        });
        let mut server = Server::new(dispatcher);
        server.add_middleware(TimingMiddleware::new());

        let req = Request::new(Method::Post, "/page").with_header("x-request-id", "req-1");
        let resp = server.test_request(req).await;
        assert_eq!(resp.status, 500);
        assert_eq!(resp.body_text(), "Internal Server Error");
        assert_eq!(resp.header("x-request-id"), Some("req-1"));
        assert!(resp.header("x-response-time").is_some());

        let resp = server.test_request(Request::new(Method::Post, "/echo")).await;
        assert_eq!(resp.status, 200);
    }

    #[test]
    fn test_blocking_helper_with_tokio_test() {
        let server = server();
        let resp = tokio_test::block_on(server.test_request(Request::new(Method::Get, "/echo")));
        assert_eq!(resp.status, 200);
        assert!(resp.body_text().contains("<h1>Path: /echo</h1>"));
    }
}
