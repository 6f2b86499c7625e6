//! Current session endpoint.
//!
//! - GET `/` - Return the authenticated principal's claims

use axum::{Json, Router, middleware, response::IntoResponse, routing::get};
use serde::Serialize;
use std::sync::Arc;

use crate::auth::{Auth, transparent_refresh};
use crate::impl_has_auth_backend;
use crate::session::SessionService;

#[derive(Clone)]
pub struct SessionState {
    pub sessions: Arc<SessionService>,
    pub secure_cookies: bool,
}

impl_has_auth_backend!(SessionState);

pub fn router(state: SessionState) -> Router {
    Router::new()
        .route("/", get(current_session))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            transparent_refresh::<SessionState>,
        ))
        .with_state(state)
}

#[derive(Serialize)]
struct SessionResponse {
    owner_id: String,
    name: String,
    must_change_password: bool,
    expires_at: u64,
}

/// Sessions flagged for a password change are still reported, so clients can
/// find out they have to change it.
async fn current_session(Auth(auth): Auth) -> impl IntoResponse {
    Json(SessionResponse {
        owner_id: auth.claims.sub,
        name: auth.claims.session.name,
        must_change_password: auth.claims.session.must_change_password,
        expires_at: auth.claims.exp,
    })
}
