//! jobswipe notification daemon - connection registry and WebSocket delivery
//!
//! This crate provides the real-time delivery core:
//! - `registry` - Connection registry actor mapping identities to live sessions
//! - `auth` - Authentication gate turning bearer credentials into identities
//! - `server` - WebSocket listener and per-connection protocol handler
//! - `heartbeat` - Per-session liveness pings
//! - `config` - TOML and environment configuration
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      jobswiped                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │  NotifyServer   │────▶│     RegistryActor           │   │
//! │  │  (axum /ws)     │     │  (identity -> sessions)     │   │
//! │  └────────┬────────┘     └──────────────▲──────────────┘   │
//! │           │                             │                   │
//! │           │ connections                 │ send_to/broadcast │
//! │           ▼                             │                   │
//! │  ┌─────────────────┐     ┌──────────────┴──────────────┐   │
//! │  │ConnectionHandler│     │   event producers           │   │
//! │  │ + Heartbeat     │     │   (after persisting)        │   │
//! │  └────────┬────────┘     └─────────────────────────────┘   │
//! │           │ authenticate                                    │
//! │           ▼                                                 │
//! │  ┌─────────────────┐                                        │
//! │  │    AuthGate     │                                        │
//! │  └─────────────────┘                                        │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod auth;
pub mod config;
pub mod heartbeat;
pub mod registry;
pub mod server;

#[cfg(test)]
pub(crate) mod test_support;
