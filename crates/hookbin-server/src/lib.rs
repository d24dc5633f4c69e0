//! Hookbin Server - HTTP API server.
//!
//! This crate provides the HTTP surface of the Hookbin request inspector.
//!
//! ## Endpoints
//!
//! - `ANY /payload/{token}[/{*path}]` - Capture a webhook request
//! - `POST /api/session` - Create a session
//! - `GET|POST|DELETE /api/tokens` - List, create or clear tokens
//! - `GET|DELETE /api/tokens/{token}` - Token details or deletion
//! - `PUT /api/tokens/{token}/response` - Configure the custom response
//! - `GET|POST|DELETE /api/tokens/{token}/requests` - List, ingest or clear requests
//! - `GET|DELETE /api/tokens/{token}/requests/{id}` - Single request
//! - `GET /api/tokens/{token}/requests/{id}/body` - Stored body or preview
//! - `GET /api/tokens/{token}/requests/{id}/raw` - Reconstructed raw HTTP
//! - `GET /api/stream` - Session event stream (SSE)
//! - `GET /api/tokens/{token}/stream` - Token event stream (SSE)
//! - `GET /health` - Liveness and channel counts
//!
//! API calls identify their session with the `X-Session-Id` header or the
//! `session` query parameter.
//!
//! ## Example
//!
//! ```no_run
//! use hookbin_server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = Server::new(ServerConfig::default()).await.unwrap();
//!     server.run().await.unwrap();
//! }
//! ```

mod capture;
pub mod error;
mod handlers;
pub mod ingest;
pub mod models;
mod session;
pub mod state;
mod stream;

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;

use axum::extract::DefaultBodyLimit;
use axum::routing::{any, get, post, put};
use axum::Router;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use hookbin_storage::Database;

pub use error::{ApiError, Result};
pub use ingest::{IngestRequest, IngestService};
pub use state::AppState;

/// Default server port.
pub const DEFAULT_PORT: u16 = 8085;

/// Default server host (localhost only unless configured otherwise).
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default limit for captured request bodies (10 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Default number of events buffered per live stream.
pub const DEFAULT_SSE_BUFFER: usize = 256;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to (default: 127.0.0.1).
    pub host: String,
    /// Port to bind to (default: 8085).
    pub port: u16,
    /// Database path (None = in-memory).
    pub db_path: Option<PathBuf>,
    /// Body directory (None = `bodies/` next to the database).
    pub body_dir: Option<PathBuf>,
    /// Resolve the remote address from proxy headers.
    pub trust_proxy: bool,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
    /// Events buffered per stream before it counts as lagging.
    pub sse_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            db_path: None,
            body_dir: None,
            trust_proxy: false,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            sse_buffer: DEFAULT_SSE_BUFFER,
        }
    }
}

impl ServerConfig {
    /// Creates a config for in-memory testing.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Creates a config with a specific database path.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Sets the host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the body directory.
    pub fn with_body_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.body_dir = Some(dir.into());
        self
    }

    /// Enables or disables proxy header trust.
    pub fn with_trust_proxy(mut self, trust: bool) -> Self {
        self.trust_proxy = trust;
        self
    }

    /// Sets the body size limit.
    pub fn with_max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    /// Sets the per-stream event buffer.
    pub fn with_sse_buffer(mut self, events: usize) -> Self {
        self.sse_buffer = events.max(1);
        self
    }
}

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("failed to bind to {0}: {1}")]
    BindError(SocketAddr, std::io::Error),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] hookbin_storage::StorageError),

    /// Server runtime error.
    #[error("server error: {0}")]
    Runtime(String),
}

/// The HTTP API server.
pub struct Server {
    router: Router,
    addr: SocketAddr,
    state: AppState,
}

impl Server {
    /// Creates a new server with the given configuration.
    pub async fn new(config: ServerConfig) -> std::result::Result<Self, ServerError> {
        let db = match (&config.db_path, &config.body_dir) {
            (Some(path), Some(bodies)) => Database::with_paths(path, bodies)?,
            (Some(path), None) => Database::with_path(path)?,
            (None, _) => Database::in_memory()?,
        };

        Self::with_database(config, db)
    }

    /// Creates a server with an existing database.
    pub fn with_database(
        config: ServerConfig,
        db: Database,
    ) -> std::result::Result<Self, ServerError> {
        let state = AppState::new(db, config.clone());
        Self::with_state(config, state)
    }

    /// Creates a server with custom application state.
    pub fn with_state(
        config: ServerConfig,
        state: AppState,
    ) -> std::result::Result<Self, ServerError> {
        let router = build_router(state.clone());

        let addr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| ServerError::Runtime(format!("invalid address: {}", e)))?;

        Ok(Self {
            router,
            addr,
            state,
        })
    }

    /// Returns the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the shared application state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Runs the server until shutdown.
    pub async fn run(self) -> std::result::Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the server until `shutdown` completes.
    pub async fn run_until<F>(self, shutdown: F) -> std::result::Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("Starting Hookbin server on {}", self.addr);

        let domain = if self.addr.is_ipv6() {
            Domain::IPV6
        } else {
            Domain::IPV4
        };

        // Create socket with SO_REUSEADDR to allow binding even when sockets are lingering
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        socket
            .set_reuse_address(true)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        // Bind and listen
        socket
            .bind(&self.addr.into())
            .map_err(|e| ServerError::BindError(self.addr, e))?;
        socket
            .listen(1024)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        // Set non-blocking for tokio
        socket
            .set_nonblocking(true)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = tokio::net::TcpListener::from_std(std_listener)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        // Peer addresses feed the captured client IP
        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServerError::Runtime(e.to_string()))?;

        info!("Hookbin server stopped");
        Ok(())
    }

    /// Returns the router for testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

/// Builds the full application router.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let max_body = state.config.max_body_bytes;

    let api = Router::new()
        .route("/api/session", post(handlers::create_session))
        .route(
            "/api/tokens",
            get(handlers::list_tokens)
                .post(handlers::create_token)
                .delete(handlers::clear_tokens),
        )
        .route(
            "/api/tokens/{token}",
            get(handlers::get_token).delete(handlers::delete_token),
        )
        .route(
            "/api/tokens/{token}/response",
            put(handlers::update_token_response),
        )
        .route(
            "/api/tokens/{token}/requests",
            get(handlers::list_requests)
                .post(handlers::ingest_request)
                .delete(handlers::clear_requests),
        )
        .route(
            "/api/tokens/{token}/requests/{id}",
            get(handlers::get_request).delete(handlers::delete_request),
        )
        .route(
            "/api/tokens/{token}/requests/{id}/body",
            get(handlers::get_request_body),
        )
        .route(
            "/api/tokens/{token}/requests/{id}/raw",
            get(handlers::get_request_raw),
        )
        .route("/api/stream", get(stream::session_stream))
        .route("/api/tokens/{token}/stream", get(stream::token_stream))
        .route("/health", get(handlers::health))
        .layer(cors);

    // Capture routes answer with whatever the token configured, so no CORS layer
    let capture = Router::new()
        .route("/payload/{token}", any(capture::capture))
        .route("/payload/{token}/{*path}", any(capture::capture));

    api.merge(capture)
        .layer(DefaultBodyLimit::max(max_body))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
