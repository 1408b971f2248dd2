//! Credential verification.

use std::collections::HashSet;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Token type accepted for notification sessions.
pub const DEFAULT_TOKEN_TYPE: &str = "access";

/// The oracle could not give an answer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("auth oracle unavailable: {0}")]
    Unavailable(String),

    #[error("failed to issue token: {0}")]
    Issue(String),
}

/// Verifies bearer credentials.
#[async_trait]
pub trait AuthOracle: Send + Sync {
    /// Returns the credential's subject, or `None` if the credential is
    /// malformed, expired, badly signed or of the wrong type.
    async fn verify_and_decode(&self, credential: &str) -> Result<Option<String>, OracleError>;

    /// Whether the credential has been revoked (e.g. by logout).
    async fn is_revoked(&self, credential: &str) -> Result<bool, OracleError>;

    /// Marks the credential as revoked. Oracles backed by a read-only
    /// source refuse.
    async fn revoke(&self, _credential: &str) -> Result<(), OracleError> {
        Err(OracleError::Unavailable(
            "revocation not supported".to_string(),
        ))
    }
}

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub exp: i64,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

/// HS256 JWT oracle with an in-process revocation list.
pub struct JwtAuthOracle {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    token_type: String,
    revoked: RwLock<HashSet<String>>,
}

impl JwtAuthOracle {
    pub fn new(secret: &[u8]) -> Self {
        Self::with_token_type(secret, DEFAULT_TOKEN_TYPE)
    }

    pub fn with_token_type(secret: &[u8], token_type: impl Into<String>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            token_type: token_type.into(),
            revoked: RwLock::new(HashSet::new()),
        }
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// Mints a token of the configured type for `subject`.
    pub fn issue(&self, subject: &str, ttl: Duration) -> Result<String, OracleError> {
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = TokenClaims {
            sub: subject.to_string(),
            exp: Utc::now().timestamp().saturating_add(ttl),
            token_type: Some(self.token_type.clone()),
        };
        self.sign(&claims)
    }

    /// Signs arbitrary claims with this oracle's key.
    pub fn sign(&self, claims: &TokenClaims) -> Result<String, OracleError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| OracleError::Issue(e.to_string()))
    }
}

#[async_trait]
impl AuthOracle for JwtAuthOracle {
    async fn verify_and_decode(&self, credential: &str) -> Result<Option<String>, OracleError> {
        let data = match decode::<TokenClaims>(credential, &self.decoding, &self.validation) {
            Ok(data) => data,
            Err(e) => {
                debug!(error = %e, "Credential rejected");
                return Ok(None);
            }
        };

        let claims = data.claims;
        if claims.token_type.as_deref() != Some(self.token_type.as_str()) {
            debug!(token_type = ?claims.token_type, "Credential has wrong token type");
            return Ok(None);
        }
        if claims.sub.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(claims.sub))
    }

    async fn is_revoked(&self, credential: &str) -> Result<bool, OracleError> {
        let revoked = self
            .revoked
            .read()
            .map_err(|_| OracleError::Unavailable("revocation list poisoned".to_string()))?;
        Ok(revoked.contains(credential))
    }

    async fn revoke(&self, credential: &str) -> Result<(), OracleError> {
        let mut revoked = self
            .revoked
            .write()
            .map_err(|_| OracleError::Unavailable("revocation list poisoned".to_string()))?;
        if revoked.insert(credential.to_string()) {
            debug!(revoked = revoked.len(), "Credential revoked");
        }
        Ok(())
    }
}
