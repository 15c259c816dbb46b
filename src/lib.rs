//! Credential and topic authorization for an MQTT broker
//!
//! This crate supplies the security hooks a broker core calls during a
//! client's lifetime:
//!
//! - **Authentication**: an ordered chain of authenticators at CONNECT;
//!   anonymous policy plus `user-device` / `password-key` verification
//!   against bcrypt hashes
//! - **Topic authorization**: taboo topics and per-user, per-device ACL
//!   patterns with MQTT `+` and `#` wildcards
//! - **Registration**: onboarding of users, devices and ACL entries at
//!   runtime, persisted to a YAML or JSON credential file on flush
//!
//! # Architecture
//!
//! [`BrokerAuth`] owns a shared [`store::CredentialStore`] and implements
//! [`hooks::BrokerHooks`]. The broker core calls the hooks directly; nothing
//! in this crate speaks the MQTT wire protocol.
//!
//! # Example Configuration
//!
//! ```yaml
//! auth:
//!   allow-anonymous: false
//!   password-file: /etc/mqtt/credentials.yaml
//! topic-check:
//!   enabled: true
//!   plugins: [taboo, acl]
//! registration:
//!   topic: registration
//! ```

pub mod acl;
pub mod auth;
pub mod config;
pub mod error;
pub mod hooks;
pub mod mqtt;
pub mod registration;
pub mod session;
pub mod store;

// Re-export main types
pub use config::BrokerAuthConfig;
pub use error::{Error, Result};
pub use hooks::{BrokerAuth, BrokerHooks, MessageOutcome};
pub use session::Session;
