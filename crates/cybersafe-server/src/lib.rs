//! CyberSafe Server - HTTP API server.
//!
//! A thin shim over the ingestion front door and the engine's
//! administrative operations.
//!
//! ## Endpoints
//!
//! - `GET /` - Liveness check
//! - `POST /api/analyze` - Classify scores, queue the safety update
//! - `POST /api/accounts` - Register a monitored account
//! - `POST /api/accounts/{id}/unlock` - Restore full safety
//! - `PUT /api/accounts/{id}/trusted-contact` - Replace the trusted contact
//! - `GET /api/accounts/{id}/dashboard` - Safety, block flag, Medium/High alerts
//! - `GET /api/alerts/{id}` - Full alert history
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use cybersafe_core::{AlertDispatcher, MemoryLedger, SafetyEngine, SafetyPolicy, SafetyWorker, WorkerConfig};
//! use cybersafe_server::{AppState, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = Arc::new(
//!         SafetyEngine::new(Arc::new(MemoryLedger::new()), AlertDispatcher::log_only(), SafetyPolicy::default())
//!             .unwrap(),
//!     );
//!     let worker = SafetyWorker::spawn(engine.clone(), WorkerConfig::default());
//!     let server = Server::with_state(ServerConfig::default(), AppState::new(engine, worker.handle())).unwrap();
//!     server.run(async { let _ = tokio::signal::ctrl_c().await; }).await.unwrap();
//!     worker.shutdown().await;
//! }
//! ```

pub mod error;
mod handlers;
pub mod models;
pub mod state;

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;

use axum::routing::{get, post, put};
use axum::Router;
use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub use error::{ApiError, Result};
pub use state::AppState;

/// Default server port.
pub const DEFAULT_PORT: u16 = 8000;

/// Default server host (localhost only for security).
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default number of records returned by the alerts endpoint.
pub const DEFAULT_ALERTS_LIMIT: usize = 100;

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to (default: 127.0.0.1).
    pub host: String,
    /// Port to bind to (default: 8000).
    pub port: u16,
    /// Database path (None = in-memory).
    pub db_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            db_path: None,
        }
    }
}

impl ServerConfig {
    /// Creates a config with a specific database path.
    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = Some(path.into());
        self
    }

    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }
}

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("failed to bind to {0}: {1}")]
    BindError(SocketAddr, std::io::Error),

    /// Server runtime error.
    #[error("server error: {0}")]
    Runtime(String),
}

/// Builds the API router over the given state.
pub fn router(state: AppState) -> Router {
    // Set up CORS for the browser dashboard
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::root))
        .route("/api/analyze", post(handlers::analyze))
        .route("/api/accounts", post(handlers::open_account))
        .route("/api/accounts/{id}/unlock", post(handlers::unlock_account))
        .route(
            "/api/accounts/{id}/trusted-contact",
            put(handlers::set_trusted_contact),
        )
        .route("/api/accounts/{id}/dashboard", get(handlers::get_dashboard))
        .route("/api/alerts/{id}", get(handlers::get_alerts))
        .layer(cors)
        .with_state(state)
}

/// The HTTP API server.
pub struct Server {
    router: Router,
    addr: SocketAddr,
}

impl Server {
    /// Creates a server with the given application state.
    pub fn with_state(
        config: ServerConfig,
        state: AppState,
    ) -> std::result::Result<Self, ServerError> {
        let addr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| ServerError::Runtime(format!("invalid address: {}", e)))?;

        Ok(Self {
            router: router(state),
            addr,
        })
    }

    /// Returns the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Runs the server until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> std::result::Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("Starting CyberSafe API server on {}", self.addr);

        let domain = if self.addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        // Create socket with SO_REUSEADDR to allow binding even when sockets are lingering
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        socket
            .set_reuse_address(true)
            .map_err(|e| ServerError::BindError(self.addr, e))?;
        socket
            .bind(&self.addr.into())
            .map_err(|e| ServerError::BindError(self.addr, e))?;
        socket
            .listen(128)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        // Set non-blocking for tokio
        socket
            .set_nonblocking(true)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = tokio::net::TcpListener::from_std(std_listener)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Runtime(e.to_string()))?;

        info!("API server stopped");
        Ok(())
    }

    /// Returns the router for testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}
