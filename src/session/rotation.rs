//! Rotation token exchange with one-time use and replay detection.
//!
//! Token lifecycle: `Active -> {Used, Revoked, Expired}` and `Used -> Revoked`
//! when a used token is presented again. Nothing returns to `Active`.

use tracing::{debug, warn};

use super::SessionError;
use super::issuer::{IssuedSession, TokenIssuer, digest_token};
use crate::db::{RotationToken, RotationTokenStore, TokenState};
use crate::jwt::now_secs;

/// Outcome of presenting a rotation token.
#[derive(Debug, Clone)]
pub enum RotationResult {
    /// The token was consumed and exchanged for a fresh pair
    Success(IssuedSession),
    /// Unknown, expired or revoked token
    TokenInvalid,
    /// The token had already been used; the owner's whole session family is revoked
    TokenReplayDetected,
}

impl RotationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, RotationResult::Success(_))
    }
}

/// Validates presented rotation tokens and rotates or revokes.
#[derive(Clone)]
pub struct RotationCoordinator {
    tokens: RotationTokenStore,
    issuer: TokenIssuer,
}

impl RotationCoordinator {
    pub fn new(tokens: RotationTokenStore, issuer: TokenIssuer) -> Self {
        Self { tokens, issuer }
    }

    /// Exchange a rotation token for a new credential / rotation token pair.
    ///
    /// Revoked and expired tokens are rejected before the `used` flag is
    /// looked at. Of any number of concurrent calls with the same token,
    /// exactly one wins the conditional `used` update; the others see the row
    /// as used and take the replay path.
    pub async fn rotate(&self, presented: &str) -> Result<RotationResult, SessionError> {
        let Some(token) = self.tokens.get_by_hash(&digest_token(presented)).await? else {
            debug!("Unknown rotation token presented");
            return Ok(RotationResult::TokenInvalid);
        };

        let now = now_secs()? as i64;
        match token.state(now) {
            TokenState::Revoked | TokenState::Expired => {
                debug!(owner_id = %token.owner_id, token_id = token.id, "Rotation token no longer valid");
                return Ok(RotationResult::TokenInvalid);
            }
            TokenState::Used => return self.replay_detected(&token, now).await,
            TokenState::Active => {}
        }

        if !self.tokens.mark_used(token.id, now).await? {
            // Lost the race against another rotation (or a revocation) of this row
            return match self.tokens.get_by_id(token.id).await? {
                Some(current) if current.used => self.replay_detected(&current, now).await,
                _ => Ok(RotationResult::TokenInvalid),
            };
        }

        let session = self.issuer.issue(&token.owner_id, &token.claims()).await?;
        debug!(owner_id = %token.owner_id, token_id = token.id, "Rotation token exchanged");

        Ok(RotationResult::Success(session))
    }

    async fn replay_detected(
        &self,
        token: &RotationToken,
        now: i64,
    ) -> Result<RotationResult, SessionError> {
        let revoked = self.tokens.revoke_family(&token.owner_id, now).await?;
        warn!(
            owner_id = %token.owner_id,
            token_id = token.id,
            revoked,
            "Rotation token replay detected, session family revoked"
        );
        Ok(RotationResult::TokenReplayDetected)
    }
}
