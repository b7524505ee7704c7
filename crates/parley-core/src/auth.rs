//! Connection-time credential verification.
//!
//! Credentials are HS256 JSON Web Tokens carrying `userId` and `username`.
//! Verification is pure: it either yields an [`Identity`] or refuses.

use crate::model::Identity;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

/// Default credential lifetime (24 hours).
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

/// Authentication errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No credential was presented.
    #[error("Access token required")]
    Missing,

    /// Credential is malformed or its signature does not verify.
    #[error("Invalid token")]
    Invalid,

    /// Credential is past its expiry.
    #[error("Token expired")]
    Expired,

    /// Credential could not be signed.
    #[error("Failed to sign token: {0}")]
    Signing(String),
}

impl AuthError {
    /// Short label for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::Missing => "missing",
            AuthError::Invalid => "invalid",
            AuthError::Expired => "expired",
            AuthError::Signing(_) => "signing",
        }
    }
}

/// Token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub iat: i64,
    pub exp: i64,
}

/// Verifies and issues signed credentials.
pub struct AuthGate {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    token_ttl_secs: i64,
}

impl AuthGate {
    /// Create a gate for the given shared secret.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
        }
    }

    /// Set the lifetime of issued tokens.
    #[must_use]
    pub fn with_token_ttl(mut self, secs: i64) -> Self {
        self.token_ttl_secs = secs;
        self
    }

    /// Allow this much clock skew when checking expiry.
    #[must_use]
    pub fn with_leeway(mut self, secs: u64) -> Self {
        self.validation.leeway = secs;
        self
    }

    /// Verify a presented credential.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Missing`] for an absent or blank token,
    /// [`AuthError::Expired`] past expiry and [`AuthError::Invalid`] otherwise.
    pub fn verify(&self, token: Option<&str>) -> Result<Identity, AuthError> {
        let token = token.map(str::trim).filter(|t| !t.is_empty());
        let Some(token) = token else {
            return Err(AuthError::Missing);
        };

        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            trace!(error = %e, "Token rejected");
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid,
            }
        })?;

        let claims = data.claims;
        if claims.user_id.is_empty() {
            return Err(AuthError::Invalid);
        }

        Ok(Identity::new(claims.user_id, claims.username))
    }

    /// Issue a token for an identity using the configured lifetime.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn issue(&self, identity: &Identity) -> Result<String, AuthError> {
        let expires_at = Utc::now() + chrono::Duration::seconds(self.token_ttl_secs);
        self.issue_with_expiry(identity, expires_at)
    }

    /// Issue a token that expires at a specific instant.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn issue_with_expiry(
        &self,
        identity: &Identity,
        expires_at: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let claims = Claims {
            user_id: identity.user_id.clone(),
            username: identity.username.clone(),
            iat: Utc::now().timestamp(),
            exp: expires_at.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }
}
