//! Signed credential generation and validation.
//!
//! Credentials are short-lived HS256 JWTs. They are never stored server-side;
//! the signature, issuer, audience and expiry are checked on every request.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Default credential lifetime: 5 minutes
pub const CREDENTIAL_DURATION_SECS: u64 = 5 * 60;

/// Free-form session claims carried by every credential of a session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Display name shown by clients
    pub name: String,
    /// Whether the owner must change their password before doing anything else
    #[serde(default)]
    pub must_change_password: bool,
}

/// JWT claims for credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialClaims {
    /// Subject (owner id)
    pub sub: String,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    #[serde(flatten)]
    pub session: SessionClaims,
}

/// Result of generating a credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCredential {
    /// The JWT string
    pub token: String,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Credential duration in seconds
    pub duration: u64,
}

/// Configuration for JWT operations.
#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
}

impl JwtConfig {
    /// Create a new JWT configuration with the given secret, issuer and audience.
    pub fn new(secret: &[u8], issuer: &str, audience: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.to_string(),
            audience: audience.to_string(),
        }
    }

    /// Generate a credential for `subject` valid for `duration` seconds.
    pub fn generate_credential(
        &self,
        subject: &str,
        session: &SessionClaims,
        duration: u64,
    ) -> Result<IssuedCredential, JwtError> {
        let now = now_secs()?;
        let exp = now + duration;

        let claims = CredentialClaims {
            sub: subject.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now,
            exp,
            session: session.clone(),
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(IssuedCredential {
            token,
            expires_at: exp,
            duration,
        })
    }

    /// Validate and decode a credential.
    ///
    /// A credential whose `exp` equals the current second is already expired.
    pub fn validate_credential(&self, token: &str) -> Result<CredentialClaims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        let token_data =
            jsonwebtoken::decode::<CredentialClaims>(token, &self.decoding_key, &validation)
                .map_err(|e| match e.kind() {
                    ErrorKind::ExpiredSignature => JwtError::Expired,
                    _ => JwtError::Decoding(e),
                })?;

        // jsonwebtoken only rejects exp < now
        if token_data.claims.exp <= now_secs()? {
            return Err(JwtError::Expired);
        }

        Ok(token_data.claims)
    }
}

/// Current Unix time in seconds.
pub fn now_secs() -> Result<u64, JwtError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| JwtError::TimeError)
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Bad signature, malformed structure, wrong issuer or audience
    Decoding(jsonwebtoken::errors::Error),
    /// Token is past its expiry
    Expired,
    /// System time error
    TimeError,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Decoding(e) => write!(f, "Failed to decode token: {}", e),
            JwtError::Expired => write!(f, "Token expired"),
            JwtError::TimeError => write!(f, "System time error"),
        }
    }
}

impl std::error::Error for JwtError {}
