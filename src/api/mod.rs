mod error;
mod session;
mod tokens;

use axum::Router;
use std::sync::Arc;

use crate::session::SessionService;

/// Create the API router.
pub fn create_api_router(sessions: Arc<SessionService>, secure_cookies: bool) -> Router {
    let session_state = session::SessionState {
        sessions: sessions.clone(),
        secure_cookies,
    };

    let tokens_state = tokens::TokensState {
        sessions,
        secure_cookies,
    };

    Router::new()
        .nest("/session", session::router(session_state))
        .nest("/tokens", tokens::router(tokens_state))
}
