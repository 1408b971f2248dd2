//! jobswipe Core - Shared types for real-time notification delivery
//!
//! This crate provides the domain types shared between the wire
//! protocol (jobswipe-protocol) and the daemon (jobswiped).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod notification;
pub mod owner;
pub mod principal;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use notification::{Notification, NotificationEvent, NotificationType};
pub use owner::{Identity, OwnerId, OwnerType};
pub use principal::Principal;
