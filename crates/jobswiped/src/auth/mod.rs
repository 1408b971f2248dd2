//! Authentication Gate.
//!
//! Turns an opaque bearer credential into the [`Identity`] a session is
//! registered under. Steps run in a fixed order and short-circuit:
//!
//! 1. verify and decode the credential (oracle)
//! 2. reject revoked credentials (oracle)
//! 3. parse the subject as a principal id
//! 4. look the principal up (store)
//! 5. resolve the owner: company affiliation wins, otherwise the user
//!
//! An oracle or store error is an authentication failure. The gate never
//! admits on an indeterminate result.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use jobswipe_core::{Identity, Principal};

mod oracle;
mod store;

pub use oracle::{AuthOracle, JwtAuthOracle, OracleError, TokenClaims, DEFAULT_TOKEN_TYPE};
pub use store::{InMemoryPrincipalStore, PrincipalStore, StoreError};

/// Why a credential was rejected.
///
/// Callers treat every variant the same way; the distinction is for logs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("credential is invalid or expired")]
    InvalidCredential,

    #[error("credential has been revoked")]
    Revoked,

    #[error("credential subject is not a principal id: {0}")]
    MalformedSubject(String),

    #[error("unknown principal {0}")]
    UnknownPrincipal(Uuid),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Cheap-to-clone authentication gate shared by every connection.
#[derive(Clone)]
pub struct AuthGate {
    oracle: Arc<dyn AuthOracle>,
    store: Arc<dyn PrincipalStore>,
}

impl AuthGate {
    pub fn new(oracle: Arc<dyn AuthOracle>, store: Arc<dyn PrincipalStore>) -> Self {
        Self { oracle, store }
    }

    /// Resolves `credential` to an identity or rejects it.
    pub async fn authenticate(&self, credential: &str) -> Result<Identity, AuthError> {
        let subject = self
            .oracle
            .verify_and_decode(credential)
            .await?
            .ok_or(AuthError::InvalidCredential)?;

        if self.oracle.is_revoked(credential).await? {
            return Err(AuthError::Revoked);
        }

        let principal_id =
            Uuid::parse_str(&subject).map_err(|_| AuthError::MalformedSubject(subject.clone()))?;

        // The store is only borrowed for this lookup.
        let principal = self
            .store
            .find_principal_by_id(principal_id)
            .await?
            .ok_or(AuthError::UnknownPrincipal(principal_id))?;

        let identity = principal.identity();
        debug!(principal = %principal_id, identity = %identity, "Credential accepted");
        Ok(identity)
    }

    /// Whether an already-admitted session's credential is still good.
    ///
    /// Re-runs verification and the revocation check. Any error counts
    /// as no longer valid.
    pub async fn revalidate(&self, credential: &str) -> bool {
        match self.oracle.verify_and_decode(credential).await {
            Ok(Some(_)) => {}
            Ok(None) => return false,
            Err(e) => {
                warn!(error = %e, "Oracle error during revalidation");
                return false;
            }
        }

        match self.oracle.is_revoked(credential).await {
            Ok(revoked) => !revoked,
            Err(e) => {
                warn!(error = %e, "Oracle error during revalidation");
                false
            }
        }
    }

    /// Revokes a credential, e.g. on logout.
    ///
    /// New handshakes with it fail at once; live sessions using it are
    /// closed on their next heartbeat.
    pub async fn revoke(&self, credential: &str) -> Result<(), AuthError> {
        self.oracle.revoke(credential).await?;
        Ok(())
    }

    /// Adds or updates a principal in the store.
    pub async fn enroll(&self, principal: Principal) -> Result<(), AuthError> {
        let id = principal.id;
        self.store.upsert(principal).await?;
        debug!(principal = %id, "Principal enrolled");
        Ok(())
    }
}
