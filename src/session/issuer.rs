//! Session issuance: one signed credential plus one persisted rotation token.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use super::SessionError;
use crate::db::RotationTokenStore;
use crate::jwt::{CREDENTIAL_DURATION_SECS, JwtConfig, SessionClaims, now_secs};

/// Default rotation token lifetime: 2 weeks
pub const ROTATION_TOKEN_DURATION_SECS: u64 = 14 * 24 * 60 * 60;

/// Rotation token entropy in bytes (256 bits).
const ROTATION_TOKEN_BYTES: usize = 32;

/// Lifetimes for the two halves of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    /// Credential lifetime in seconds
    pub credential_ttl: u64,
    /// Rotation token lifetime in seconds
    pub rotation_ttl: u64,
}

impl TokenPolicy {
    /// Build a policy, rejecting a zero credential lifetime or one that is not
    /// shorter than the rotation token lifetime.
    pub fn new(credential_ttl: u64, rotation_ttl: u64) -> Result<Self, String> {
        if credential_ttl == 0 {
            return Err("Credential TTL must be greater than zero".to_string());
        }
        if credential_ttl >= rotation_ttl {
            return Err(format!(
                "Credential TTL ({}s) must be shorter than rotation TTL ({}s)",
                credential_ttl, rotation_ttl
            ));
        }
        Ok(Self {
            credential_ttl,
            rotation_ttl,
        })
    }
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            credential_ttl: CREDENTIAL_DURATION_SECS,
            rotation_ttl: ROTATION_TOKEN_DURATION_SECS,
        }
    }
}

/// A freshly minted credential / rotation token pair.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    /// Owner the session belongs to
    pub owner_id: String,
    /// Signed credential (JWT)
    pub credential: String,
    /// Opaque rotation token plaintext. Only its digest is stored.
    pub rotation_token: String,
    /// Credential duration in seconds
    pub credential_ttl: u64,
    /// Rotation token duration in seconds
    pub rotation_ttl: u64,
    /// Credential expiration (Unix seconds)
    pub credential_expires_at: u64,
    /// Rotation token expiration (Unix seconds)
    pub rotation_expires_at: u64,
    /// Claims carried by the credential
    pub claims: SessionClaims,
}

/// Mints session pairs.
#[derive(Clone)]
pub struct TokenIssuer {
    jwt: Arc<JwtConfig>,
    tokens: RotationTokenStore,
    policy: TokenPolicy,
}

impl TokenIssuer {
    pub fn new(jwt: Arc<JwtConfig>, tokens: RotationTokenStore, policy: TokenPolicy) -> Self {
        Self {
            jwt,
            tokens,
            policy,
        }
    }

    /// Persist a new rotation token for `owner_id` and sign a matching credential.
    pub async fn issue(
        &self,
        owner_id: &str,
        claims: &SessionClaims,
    ) -> Result<IssuedSession, SessionError> {
        let now = now_secs()?;
        let rotation_token = generate_rotation_token();
        let rotation_expires_at = now + self.policy.rotation_ttl;

        self.tokens
            .create(
                owner_id,
                &digest_token(&rotation_token),
                claims,
                now as i64,
                rotation_expires_at as i64,
            )
            .await?;

        let credential =
            self.jwt
                .generate_credential(owner_id, claims, self.policy.credential_ttl)?;

        Ok(IssuedSession {
            owner_id: owner_id.to_string(),
            credential: credential.token,
            rotation_token,
            credential_ttl: credential.duration,
            rotation_ttl: self.policy.rotation_ttl,
            credential_expires_at: credential.expires_at,
            rotation_expires_at,
            claims: claims.clone(),
        })
    }
}

/// Generate a high-entropy opaque rotation token, URL-safe base64 encoded.
fn generate_rotation_token() -> String {
    let mut bytes = [0u8; ROTATION_TOKEN_BYTES];
    rand::RngCore::fill_bytes(&mut rand::rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Digest under which a rotation token is stored and looked up.
pub fn digest_token(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, TokenState};

    fn claims() -> SessionClaims {
        SessionClaims {
            name: "Alice".to_string(),
            must_change_password: true,
        }
    }

    async fn issuer() -> (TokenIssuer, Database, Arc<JwtConfig>) {
        let db = Database::open(":memory:").await.unwrap();
        let jwt = Arc::new(JwtConfig::new(b"test-secret", "sessionrelay", "api"));
        let issuer = TokenIssuer::new(jwt.clone(), db.tokens(), TokenPolicy::default());
        (issuer, db, jwt)
    }

    #[test]
    fn test_policy_validation() {
        assert!(TokenPolicy::new(0, 100).is_err());
        assert!(TokenPolicy::new(100, 100).is_err());
        assert!(TokenPolicy::new(200, 100).is_err());

        let policy = TokenPolicy::new(60, 3600).unwrap();
        assert_eq!(policy.credential_ttl, 60);
        assert_eq!(policy.rotation_ttl, 3600);
    }

    #[test]
    fn test_rotation_token_entropy() {
        let token = generate_rotation_token();
        let decoded = URL_SAFE_NO_PAD.decode(&token).unwrap();
        assert_eq!(decoded.len(), ROTATION_TOKEN_BYTES);
        assert_ne!(token, generate_rotation_token());
    }

    #[test]
    fn test_digest_is_stable_and_distinct() {
        assert_eq!(digest_token("abc"), digest_token("abc"));
        assert_ne!(digest_token("abc"), digest_token("abd"));
        assert_ne!(digest_token("abc"), "abc");
    }

    #[tokio::test]
    async fn test_issue_persists_digest_and_signs_credential() {
        let (issuer, db, jwt) = issuer().await;

        let session = issuer.issue("owner-1", &claims()).await.unwrap();

        let stored = db
            .tokens()
            .get_by_hash(&digest_token(&session.rotation_token))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.owner_id, "owner-1");
        assert_eq!(stored.claims(), claims());
        assert_eq!(stored.expires_at, session.rotation_expires_at as i64);
        assert_eq!(stored.state(stored.issued_at), TokenState::Active);

        // The plaintext never reaches the store
        assert!(
            db.tokens()
                .get_by_hash(&session.rotation_token)
                .await
                .unwrap()
                .is_none()
        );

        let credential = jwt.validate_credential(&session.credential).unwrap();
        assert_eq!(credential.sub, "owner-1");
        assert_eq!(credential.session, claims());
        assert_eq!(session.credential_ttl, CREDENTIAL_DURATION_SECS);
        assert_eq!(session.rotation_ttl, ROTATION_TOKEN_DURATION_SECS);
    }

    #[tokio::test]
    async fn test_issue_surfaces_store_failure() {
        let (issuer, db, _) = issuer().await;
        db.pool().close().await;

        let result = issuer.issue("owner-1", &claims()).await;
        assert!(matches!(result, Err(SessionError::StoreUnavailable(_))));
    }
}
