//! Principal lookup.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use jobswipe_core::Principal;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("failed to read principals file: {0}")]
    Io(String),

    #[error("failed to parse principals file: {0}")]
    Parse(String),

    #[error("principal store unavailable: {0}")]
    Unavailable(String),
}

/// Account store consulted once per handshake.
///
/// Implementations must not hand out anything that outlives the call.
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    async fn find_principal_by_id(&self, id: Uuid) -> Result<Option<Principal>, StoreError>;

    /// Inserts or replaces a principal. Read-only stores refuse.
    async fn upsert(&self, _principal: Principal) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("store is read-only".to_string()))
    }
}

/// Principals held in memory.
#[derive(Debug, Default)]
pub struct InMemoryPrincipalStore {
    principals: RwLock<HashMap<Uuid, Principal>>,
}

impl InMemoryPrincipalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_principals(principals: impl IntoIterator<Item = Principal>) -> Self {
        let map = principals.into_iter().map(|p| (p.id, p)).collect();
        Self {
            principals: RwLock::new(map),
        }
    }

    /// Loads a JSON array of principals, e.g.
    /// `[{"id":"...","organization_id":"..."}]`.
    pub fn from_file(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Io(format!("{}: {e}", path.display())))?;
        let principals: Vec<Principal> =
            serde_json::from_str(&content).map_err(|e| StoreError::Parse(e.to_string()))?;
        Ok(Self::from_principals(principals))
    }

    pub fn len(&self) -> usize {
        self.principals.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PrincipalStore for InMemoryPrincipalStore {
    async fn find_principal_by_id(&self, id: Uuid) -> Result<Option<Principal>, StoreError> {
        let principals = self
            .principals
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(principals.get(&id).cloned())
    }

    async fn upsert(&self, principal: Principal) -> Result<(), StoreError> {
        let mut principals = self
            .principals
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        principals.insert(principal.id, principal);
        Ok(())
    }
}
