//! Session token API endpoints.
//!
//! - POST `/refresh` - Exchange the presented rotation token for a new pair
//! - POST `/logout` - Revoke the presented rotation token and clear cookies
//! - GET `/` - List the caller's active rotation tokens
//! - DELETE `/{id}` - Revoke one of the caller's rotation tokens
//! - POST `/revoke-all` - Revoke every rotation token of the caller
//!
//! `/refresh` and `/logout` take the rotation token directly and are not behind
//! the transparent refresh middleware; the others are.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use super::error::{ApiError, ResultExt};
use crate::auth::{
    ACCESS_COOKIE_NAME, ActiveAuth, Auth, REFRESH_COOKIE_NAME, ROTATION_TRANSPORT,
    append_cleared_cookies, transparent_refresh, write_session,
};
use crate::impl_has_auth_backend;
use crate::jwt::now_secs;
use crate::session::{RotationResult, SessionError, SessionService, digest_token};

const INVALID_REFRESH_TOKEN: &str = "Invalid or expired refresh token";

#[derive(Clone)]
pub struct TokensState {
    pub sessions: Arc<SessionService>,
    pub secure_cookies: bool,
}

impl_has_auth_backend!(TokensState);

pub fn router(state: TokensState) -> Router {
    let protected = Router::new()
        .route("/", get(list_tokens))
        .route("/revoke-all", post(revoke_all))
        .route("/{id}", delete(revoke_token))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            transparent_refresh::<TokensState>,
        ));

    Router::new()
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .merge(protected)
        .with_state(state)
}

#[derive(Serialize)]
struct RefreshResponse {
    expires_in: u64,
    must_change_password: bool,
}

/// Exchange the presented rotation token for a new credential and rotation token.
/// The pair is returned the same way the rotation token arrived (cookies or headers).
async fn refresh(
    State(state): State<TokensState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let (source, rotation_token) = ROTATION_TRANSPORT
        .extract(&headers)
        .ok_or_else(|| ApiError::unauthorized(INVALID_REFRESH_TOKEN))?;

    let outcome = state.sessions.rotate_shared(rotation_token).await;
    let session = match outcome.as_ref() {
        Ok(RotationResult::Success(session)) => session,
        Ok(RotationResult::TokenInvalid | RotationResult::TokenReplayDetected) => {
            return Err(ApiError::unauthorized(INVALID_REFRESH_TOKEN));
        }
        Err(SessionError::StoreUnavailable(e)) => {
            error!(error = %e, "Token store unavailable during refresh");
            return Err(ApiError::service_unavailable("Token store unavailable"));
        }
        Err(e) => {
            error!(error = %e, "Credential refresh failed");
            return Err(ApiError::internal("Failed to issue credential"));
        }
    };

    let mut response = (
        StatusCode::OK,
        Json(RefreshResponse {
            expires_in: session.credential_ttl,
            must_change_password: session.claims.must_change_password,
        }),
    )
        .into_response();
    write_session(
        response.headers_mut(),
        session,
        source,
        state.secure_cookies,
    );

    Ok(response)
}

/// Logout - revoke the presented rotation token and clear both cookies.
async fn logout(
    State(state): State<TokensState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if let Some((_, rotation_token)) = ROTATION_TRANSPORT.extract(&headers) {
        state.sessions.revoke_token(rotation_token).await?;
    }

    Ok(cleared_response(
        Json(serde_json::json!({ "success": true })),
        state.secure_cookies,
    ))
}

#[derive(Serialize)]
struct TokenInfo {
    id: i64,
    issued_at: i64,
    expires_at: i64,
    is_current: bool,
}

#[derive(Serialize)]
struct ListTokensResponse {
    tokens: Vec<TokenInfo>,
}

/// List the caller's active rotation tokens. Token values are never exposed.
async fn list_tokens(
    State(state): State<TokensState>,
    ActiveAuth(auth): ActiveAuth,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let tokens = state
        .sessions
        .db()
        .tokens()
        .list_active_by_owner(auth.owner_id(), now()?)
        .await
        .db_err("Failed to list tokens")?;

    let current = ROTATION_TRANSPORT
        .extract(&headers)
        .map(|(_, token)| digest_token(token));

    let tokens = tokens
        .into_iter()
        .map(|t| TokenInfo {
            is_current: current.as_deref() == Some(t.token_hash.as_str()),
            id: t.id,
            issued_at: t.issued_at,
            expires_at: t.expires_at,
        })
        .collect();

    Ok(Json(ListTokensResponse { tokens }))
}

#[derive(Serialize)]
struct RevokeResponse {
    revoked: bool,
}

/// Revoke one of the caller's rotation tokens by id.
async fn revoke_token(
    State(state): State<TokensState>,
    Auth(auth): Auth,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let tokens = state.sessions.db().tokens();

    // Someone else's token answers exactly like a missing one
    let owned = tokens
        .get_by_id(id)
        .await
        .db_err("Failed to get token")?
        .is_some_and(|token| token.owner_id == auth.owner_id());
    if !owned {
        return Ok(Json(RevokeResponse { revoked: false }));
    }

    let revoked = tokens
        .revoke(id, now()?)
        .await
        .db_err("Failed to revoke token")?;

    Ok(Json(RevokeResponse { revoked }))
}

#[derive(Serialize)]
struct RevokeAllResponse {
    revoked: u64,
}

/// Logout everywhere - revoke the caller's whole session family.
async fn revoke_all(
    State(state): State<TokensState>,
    Auth(auth): Auth,
) -> Result<Response, ApiError> {
    let revoked = state.sessions.revoke_family(auth.owner_id()).await?;
    info!(owner_id = %auth.owner_id(), revoked, "Logged out of all sessions");

    Ok(cleared_response(
        Json(RevokeAllResponse { revoked }),
        state.secure_cookies,
    ))
}

fn cleared_response(body: impl IntoResponse, secure: bool) -> Response {
    let mut response = (StatusCode::OK, body).into_response();
    append_cleared_cookies(
        response.headers_mut(),
        &[ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME],
        secure,
    );
    response
}

fn now() -> Result<i64, ApiError> {
    now_secs().map(|now| now as i64).map_err(|e| {
        error!(error = %e, "Failed to read system time");
        ApiError::internal("Clock error")
    })
}
