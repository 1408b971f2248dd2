//! Notification payloads handed to the delivery core.
//!
//! Notifications are persisted by the notification store before they get
//! here; this crate only describes their shape for live delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::owner::{Identity, OwnerType};

/// Kind of notification, as stored and as sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    /// An application changed stage
    ApplicationUpdate,

    /// A company received a new application
    NewApplication,

    /// A job matched the user's profile
    JobMatch,

    /// Direct message
    Message,

    /// Platform announcement
    System,

    /// Promotional content
    Promotion,
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ApplicationUpdate => "APPLICATION_UPDATE",
            Self::NewApplication => "NEW_APPLICATION",
            Self::JobMatch => "JOB_MATCH",
            Self::Message => "MESSAGE",
            Self::System => "SYSTEM",
            Self::Promotion => "PROMOTION",
        };
        write!(f, "{name}")
    }
}

/// A persisted notification, as delivered to live sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<Uuid>,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    #[serde(default)]
    pub job_id: Option<Uuid>,
    #[serde(default)]
    pub application_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
}

impl Notification {
    /// Creates an unread notification without a recipient.
    pub fn new(kind: NotificationType, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: None,
            company_id: None,
            title: title.into(),
            message: message.into(),
            kind,
            job_id: None,
            application_id: None,
            created_at: Utc::now(),
            is_read: false,
        }
    }

    #[must_use]
    pub fn with_job(mut self, job_id: Uuid) -> Self {
        self.job_id = Some(job_id);
        self
    }

    #[must_use]
    pub fn with_application(mut self, application_id: Uuid) -> Self {
        self.application_id = Some(application_id);
        self
    }
}

/// A notification addressed to one identity.
///
/// This is also the body producers post to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub target: Identity,
    pub notification: Notification,
}

impl NotificationEvent {
    /// Addresses a notification to an identity, filling in the matching
    /// recipient field.
    pub fn new(target: Identity, mut notification: Notification) -> Self {
        let id = *target.owner_id.as_uuid();
        match target.owner_type {
            OwnerType::User => notification.user_id = Some(id),
            OwnerType::Company => notification.company_id = Some(id),
        }
        Self {
            target,
            notification,
        }
    }

    pub fn for_user(user_id: Uuid, notification: Notification) -> Self {
        Self::new(Identity::user(user_id), notification)
    }

    pub fn for_company(company_id: Uuid, notification: Notification) -> Self {
        Self::new(Identity::company(company_id), notification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_type_wire_names() {
        let json = serde_json::to_string(&NotificationType::ApplicationUpdate).unwrap();
        assert_eq!(json, "\"APPLICATION_UPDATE\"");
        assert_eq!(NotificationType::JobMatch.to_string(), "JOB_MATCH");
    }

    #[test]
    fn test_notification_serializes_type_field() {
        let job = Uuid::new_v4();
        let n = Notification::new(NotificationType::JobMatch, "New match", "A job matches you")
            .with_job(job);
        let value = serde_json::to_value(&n).unwrap();
        assert_eq!(value["type"], "JOB_MATCH");
        assert_eq!(value["job_id"], job.to_string());
        assert_eq!(value["is_read"], false);
        assert!(value.get("user_id").is_none());
    }

    #[test]
    fn test_event_fills_recipient() {
        let company = Uuid::new_v4();
        let event = NotificationEvent::for_company(
            company,
            Notification::new(NotificationType::NewApplication, "t", "m"),
        );
        assert_eq!(event.target, Identity::company(company));
        assert_eq!(event.notification.company_id, Some(company));
        assert_eq!(event.notification.user_id, None);
    }

    #[test]
    fn test_event_from_producer_json() {
        let user = Uuid::new_v4();
        let id = Uuid::new_v4();
        let raw = format!(
            r#"{{
                "target": {{"owner_type": "user", "owner_id": "{user}"}},
                "notification": {{
                    "id": "{id}",
                    "title": "Status changed",
                    "message": "You moved to interview",
                    "type": "APPLICATION_UPDATE",
                    "created_at": "2024-05-01T12:00:00Z"
                }}
            }}"#
        );

        let event: NotificationEvent = serde_json::from_str(&raw).unwrap();
        assert_eq!(event.target, Identity::user(user));
        assert_eq!(event.notification.id, id);
        assert_eq!(event.notification.kind, NotificationType::ApplicationUpdate);
        assert!(!event.notification.is_read);
    }
}
