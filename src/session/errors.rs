//! Session error types.

use crate::jwt::JwtError;

/// Unexpected failures while issuing or rotating a session.
///
/// Expected outcomes (unknown, expired, revoked or replayed tokens) are not
/// errors; they are reported through [`super::RotationResult`].
#[derive(Debug)]
pub enum SessionError {
    /// The rotation token store could not be read or written. Safe to retry.
    StoreUnavailable(sqlx::Error),
    /// The credential could not be signed, or the clock is unusable
    Credential(JwtError),
}

impl From<sqlx::Error> for SessionError {
    fn from(e: sqlx::Error) -> Self {
        SessionError::StoreUnavailable(e)
    }
}

impl From<JwtError> for SessionError {
    fn from(e: JwtError) -> Self {
        SessionError::Credential(e)
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::StoreUnavailable(e) => write!(f, "Token store unavailable: {}", e),
            SessionError::Credential(e) => write!(f, "Credential error: {}", e),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::StoreUnavailable(e) => Some(e),
            SessionError::Credential(e) => Some(e),
        }
    }
}
