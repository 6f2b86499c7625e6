//! Authentication error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use super::transport::{ACCESS_COOKIE_NAME, append_cleared_cookies};

/// Why a request could not be authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    NotAuthenticated,
    InvalidToken,
    PasswordChangeRequired,
}

/// API authentication errors (returns JSON and clears the credential cookie).
///
/// Every cause of a missing session (no credential, expired credential, a
/// rejected or replayed rotation token) answers with the same body.
#[derive(Debug)]
pub struct ApiAuthError {
    pub(super) kind: AuthErrorKind,
    pub(super) secure: bool,
}

impl ApiAuthError {
    pub(super) fn new(kind: AuthErrorKind, secure: bool) -> Self {
        Self { kind, secure }
    }

    fn status_code(&self) -> StatusCode {
        match self.kind {
            AuthErrorKind::NotAuthenticated | AuthErrorKind::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            AuthErrorKind::PasswordChangeRequired => StatusCode::FORBIDDEN,
        }
    }

    fn message(&self) -> &'static str {
        match self.kind {
            AuthErrorKind::NotAuthenticated | AuthErrorKind::InvalidToken => "Not authenticated",
            AuthErrorKind::PasswordChangeRequired => "Password change required",
        }
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        let mut response = (
            self.status_code(),
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response();

        // The rotation token cookie stays: it may still be good on the next request
        if self.status_code() == StatusCode::UNAUTHORIZED {
            append_cleared_cookies(response.headers_mut(), &[ACCESS_COOKIE_NAME], self.secure);
        }

        response
    }
}
