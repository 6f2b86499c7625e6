//! Session lifecycle: issuance, rotation with replay detection, and
//! session family revocation.
//!
//! A session is a short-lived signed credential plus a long-lived, single-use
//! rotation token. Presenting the rotation token consumes it and yields a new
//! pair; presenting it twice revokes every session of the owner.

mod errors;
mod issuer;
mod rotation;
mod single_flight;

use std::sync::Arc;
use tracing::warn;

use crate::db::Database;
use crate::jwt::{JwtConfig, SessionClaims, now_secs};

pub use errors::SessionError;
pub use issuer::{IssuedSession, ROTATION_TOKEN_DURATION_SECS, TokenIssuer, TokenPolicy, digest_token};
pub use rotation::{RotationCoordinator, RotationResult};
pub use single_flight::SingleFlight;

/// Rotation outcome shared between every request that waited on the same rotation.
pub type SharedRotation = Arc<Result<RotationResult, SessionError>>;

/// Entry point for the login flow, the refresh pipeline and revocation.
pub struct SessionService {
    db: Database,
    jwt: Arc<JwtConfig>,
    issuer: TokenIssuer,
    coordinator: RotationCoordinator,
    in_flight: SingleFlight<SharedRotation>,
}

impl SessionService {
    pub fn new(db: Database, jwt: Arc<JwtConfig>, policy: TokenPolicy) -> Self {
        let issuer = TokenIssuer::new(jwt.clone(), db.tokens(), policy);
        let coordinator = RotationCoordinator::new(db.tokens(), issuer.clone());
        Self {
            db,
            jwt,
            issuer,
            coordinator,
            in_flight: SingleFlight::new(),
        }
    }

    pub fn jwt(&self) -> &JwtConfig {
        &self.jwt
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Start a new session for an authenticated principal.
    pub async fn issue_session(
        &self,
        owner_id: &str,
        claims: &SessionClaims,
    ) -> Result<IssuedSession, SessionError> {
        self.issuer.issue(owner_id, claims).await
    }

    /// Exchange a rotation token directly, bypassing the single-flight guard.
    pub async fn rotate(&self, rotation_token: &str) -> Result<RotationResult, SessionError> {
        self.coordinator.rotate(rotation_token).await
    }

    /// Exchange a rotation token, sharing the result with every concurrent
    /// caller presenting the same token.
    ///
    /// The rotation runs to completion even if this caller goes away, so a
    /// consumed token always yields a pair for whoever is still waiting.
    pub async fn rotate_shared(&self, rotation_token: &str) -> SharedRotation {
        let coordinator = self.coordinator.clone();
        let token = rotation_token.to_string();
        self.in_flight
            .execute(&digest_token(rotation_token), || async move {
                Arc::new(coordinator.rotate(&token).await)
            })
            .await
    }

    /// Revoke every rotation token of `owner_id`. Returns how many were revoked.
    pub async fn revoke_family(&self, owner_id: &str) -> Result<u64, SessionError> {
        let revoked = self
            .db
            .tokens()
            .revoke_family(owner_id, now_secs()? as i64)
            .await?;
        warn!(owner_id = %owner_id, revoked, "Session family revoked");
        Ok(revoked)
    }

    /// Revoke a single presented rotation token (logout of one session).
    pub async fn revoke_token(&self, rotation_token: &str) -> Result<bool, SessionError> {
        Ok(self
            .db
            .tokens()
            .revoke_by_hash(&digest_token(rotation_token), now_secs()? as i64)
            .await?)
    }
}
