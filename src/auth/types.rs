//! Authentication user types.

use crate::jwt::CredentialClaims;

/// Authenticated principal extracted from a validated credential.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// Claims from the credential
    pub claims: CredentialClaims,
}

impl AuthenticatedUser {
    pub fn owner_id(&self) -> &str {
        &self.claims.sub
    }

    pub fn must_change_password(&self) -> bool {
        self.claims.session.must_change_password
    }
}
