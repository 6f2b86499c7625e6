//! Transparent credential refresh.
//!
//! Runs in front of protected routes. When a request carries a rotation token
//! but no usable credential, the token is exchanged (once per token, however
//! many requests carry it concurrently), the request continues with the new
//! credential, and the new pair is written into the response unless the route
//! itself ended the session.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tracing::{debug, error};

use super::state::HasAuthBackend;
use super::transport::{
    CREDENTIAL_TRANSPORT, REFRESH_COOKIE_NAME, ROTATION_TRANSPORT, clears_cookie,
    replace_credential, write_session,
};
use crate::jwt::JwtConfig;
use crate::session::{RotationResult, SessionError};

/// Middleware exchanging a rotation token when the credential is missing or expired.
///
/// Never rejects a request. If the exchange does not succeed, the request goes
/// on unauthenticated and the route's extractor decides.
pub async fn transparent_refresh<S>(
    State(state): State<S>,
    mut request: Request,
    next: Next,
) -> Response
where
    S: HasAuthBackend + Clone + Send + Sync + 'static,
{
    let Some((source, rotation_token)) = ROTATION_TRANSPORT
        .extract(request.headers())
        .map(|(source, token)| (source, token.to_string()))
    else {
        return next.run(request).await;
    };

    if has_valid_credential(request.headers(), state.sessions().jwt()) {
        return next.run(request).await;
    }

    let outcome = state.sessions().rotate_shared(&rotation_token).await;
    let session = match outcome.as_ref() {
        Ok(RotationResult::Success(session)) => session.clone(),
        Ok(RotationResult::TokenInvalid | RotationResult::TokenReplayDetected) => {
            debug!("Rotation token rejected, continuing unauthenticated");
            return next.run(request).await;
        }
        Err(SessionError::StoreUnavailable(e)) => {
            error!(error = %e, "Token store unavailable during refresh");
            return next.run(request).await;
        }
        Err(e) => {
            error!(error = %e, "Credential refresh failed");
            return next.run(request).await;
        }
    };

    replace_credential(request.headers_mut(), &session.credential);
    let mut response = next.run(request).await;

    // Logging out everywhere clears the cookies; the pair minted for this
    // request is already revoked and must not replace them.
    if clears_cookie(response.headers(), REFRESH_COOKIE_NAME) {
        return response;
    }
    write_session(
        response.headers_mut(),
        &session,
        source,
        state.secure_cookies(),
    );

    response
}

fn has_valid_credential(headers: &HeaderMap, jwt: &JwtConfig) -> bool {
    CREDENTIAL_TRANSPORT
        .extract(headers)
        .is_some_and(|(_, credential)| jwt.validate_credential(credential).is_ok())
}
