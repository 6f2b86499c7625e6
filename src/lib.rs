pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod session;

use api::create_api_router;
use axum::Router;
use db::Database;
use jwt::JwtConfig;
use session::{SessionService, TokenPolicy};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Secret for signing credentials
    pub jwt_secret: Vec<u8>,
    /// Issuer claim of credentials
    pub issuer: String,
    /// Audience claim of credentials
    pub audience: String,
    /// Credential and rotation token lifetimes
    pub policy: TokenPolicy,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// How long expired rotation tokens are kept before cleanup deletes them
    pub retention_secs: u64,
}

/// Build the session service shared by every route.
pub fn create_session_service(config: &ServerConfig) -> Arc<SessionService> {
    let jwt = Arc::new(JwtConfig::new(
        &config.jwt_secret,
        &config.issuer,
        &config.audience,
    ));
    Arc::new(SessionService::new(config.db.clone(), jwt, config.policy))
}

/// Create the application router around an existing session service.
pub fn create_router(sessions: Arc<SessionService>, secure_cookies: bool) -> Router {
    Router::new().nest("/api", create_api_router(sessions, secure_cookies))
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    create_router(create_session_service(config), config.secure_cookies)
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(db: &Database, retention_secs: u64) {
    cleanup::run_cleanup(db, retention_secs).await;
    cleanup::spawn_cleanup_scheduler(db.clone(), retention_secs);
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    axum::serve(listener, app).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    init_cleanup(&config.db, config.retention_secs).await;

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
