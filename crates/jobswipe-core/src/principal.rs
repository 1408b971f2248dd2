//! Principals as resolved from the account store.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::owner::Identity;

/// A known account, as far as notification routing cares.
///
/// Company staff are regular accounts carrying an `organization_id`;
/// their sessions are routed to the company, not to themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    #[serde(default, alias = "company_id", skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<Uuid>,
}

impl Principal {
    pub fn user(id: Uuid) -> Self {
        Self {
            id,
            organization_id: None,
        }
    }

    pub fn company_member(id: Uuid, organization_id: Uuid) -> Self {
        Self {
            id,
            organization_id: Some(organization_id),
        }
    }

    /// The identity this principal's sessions are registered under.
    pub fn identity(&self) -> Identity {
        match self.organization_id {
            Some(org) => Identity::company(org),
            None => Identity::user(self.id),
        }
    }
}
