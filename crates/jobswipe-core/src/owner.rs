//! Owner identities: who a live connection belongs to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

// ============================================================================
// Owner Type
// ============================================================================

/// Whether an identity is an end-user job seeker or a company account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerType {
    /// An individual job seeker
    User,

    /// A company account (any user affiliated with an organization)
    Company,
}

impl OwnerType {
    /// Wire name, also used as the prefix of the `<type>_id` field in
    /// the `authenticated` acknowledgment.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Company => "company",
        }
    }
}

impl fmt::Display for OwnerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "USER"),
            Self::Company => write!(f, "COMPANY"),
        }
    }
}

impl FromStr for OwnerType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "company" => Ok(Self::Company),
            _ => Err(DomainError::InvalidOwnerType {
                value: s.to_string(),
            }),
        }
    }
}

// ============================================================================
// Owner Id
// ============================================================================

/// Identifier of a user or company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(Uuid);

impl OwnerId {
    pub const fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Parses an owner id from its hyphenated string form.
    pub fn parse(s: &str) -> DomainResult<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| DomainError::InvalidIdentifier {
                field: "owner_id".to_string(),
                value: s.to_string(),
            })
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for OwnerId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

// ============================================================================
// Identity
// ============================================================================

/// The (owner type, owner id) pair every live session is bucketed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity {
    pub owner_type: OwnerType,
    pub owner_id: OwnerId,
}

impl Identity {
    pub fn new(owner_type: OwnerType, owner_id: impl Into<OwnerId>) -> Self {
        Self {
            owner_type,
            owner_id: owner_id.into(),
        }
    }

    pub fn user(id: impl Into<OwnerId>) -> Self {
        Self::new(OwnerType::User, id)
    }

    pub fn company(id: impl Into<OwnerId>) -> Self {
        Self::new(OwnerType::Company, id)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner_type.as_str(), self.owner_id)
    }
}
