//! Axum extractors for authentication.
//!
//! These only validate the credential. Exchanging a rotation token happens
//! earlier, in the transparent refresh middleware, which replaces the
//! request credential before the extractors run.

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::debug;

use super::errors::{ApiAuthError, AuthErrorKind};
use super::state::HasAuthBackend;
use super::transport::CREDENTIAL_TRANSPORT;
use super::types::AuthenticatedUser;

fn authenticate_request<S>(parts: &Parts, state: &S) -> Result<AuthenticatedUser, AuthErrorKind>
where
    S: HasAuthBackend,
{
    let (_, credential) =
        CREDENTIAL_TRANSPORT.extract(&parts.headers).ok_or(AuthErrorKind::NotAuthenticated)?;

    let claims = state
        .sessions()
        .jwt()
        .validate_credential(credential)
        .map_err(|e| {
            debug!(error = %e, "Credential rejected");
            AuthErrorKind::InvalidToken
        })?;

    Ok(AuthenticatedUser { claims })
}

/// Extractor for API endpoints that require authentication.
pub struct Auth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for Auth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        authenticate_request(parts, state)
            .map(Auth)
            .map_err(|kind| ApiAuthError::new(kind, state.secure_cookies()))
    }
}

/// Same as `Auth`, but rejects sessions flagged for a mandatory password change.
pub struct ActiveAuth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for ActiveAuth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Auth(user) = Auth::from_request_parts(parts, state).await?;
        if user.must_change_password() {
            return Err(ApiAuthError::new(
                AuthErrorKind::PasswordChangeRequired,
                state.secure_cookies(),
            ));
        }
        Ok(ActiveAuth(user))
    }
}
