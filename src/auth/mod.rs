//! Authentication module
//!
//! Connection-time checks. Every enabled authenticator must allow the
//! session; a deny or an abstain from any of them rejects the connection.

mod anonymous;
mod credentials;

pub use anonymous::AnonymousAuthenticator;
pub use credentials::{hash_secret, verify_secret, CredentialsAuthenticator};

use crate::config::{AuthConfig, AuthPlugin};
use crate::error::{Error, Result};
use crate::session::Session;
use crate::store::CredentialStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Verdict of a single authenticator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    Allow,
    Deny,
    /// The authenticator has nothing to say about this session
    Abstain,
}

/// Result of authentication
#[derive(Debug, Clone)]
pub struct AuthResult {
    pub decision: AuthDecision,
    /// Reason for the decision, for logging only
    pub reason: Option<String>,
}

impl AuthResult {
    pub fn allow() -> Self {
        Self {
            decision: AuthDecision::Allow,
            reason: None,
        }
    }

    pub fn deny(reason: &str) -> Self {
        Self {
            decision: AuthDecision::Deny,
            reason: Some(reason.to_string()),
        }
    }

    pub fn abstain(reason: &str) -> Self {
        Self {
            decision: AuthDecision::Abstain,
            reason: Some(reason.to_string()),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.decision == AuthDecision::Allow
    }
}

/// Authentication provider trait
#[async_trait]
pub trait AuthenticatorProvider: Send + Sync {
    /// Authenticate a connecting session
    ///
    /// Errors are logged by the chain and count as a denial.
    async fn authenticate(&self, session: &Session) -> Result<AuthResult>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Ordered authenticator chain
#[derive(Default, Clone)]
pub struct Authenticator {
    providers: Vec<Arc<dyn AuthenticatorProvider>>,
}

impl Authenticator {
    pub fn new(providers: Vec<Arc<dyn AuthenticatorProvider>>) -> Self {
        Self { providers }
    }

    /// Build the chain from the `auth` section
    ///
    /// Authenticators whose configuration is missing are skipped with a
    /// warning rather than blocking every connection.
    pub fn from_config(config: Option<&AuthConfig>, store: Arc<CredentialStore>) -> Self {
        let Some(config) = config else {
            warn!(error = %Error::ConfigMissing("auth"), "Authentication disabled");
            return Self::default();
        };

        let mut providers: Vec<Arc<dyn AuthenticatorProvider>> = Vec::new();
        for plugin in &config.plugins {
            match plugin {
                AuthPlugin::Anonymous => {
                    providers.push(Arc::new(AnonymousAuthenticator::new(config.allow_anonymous)));
                }
                AuthPlugin::File => {
                    if config.password_file.is_none() {
                        warn!("'password-file' not found in 'auth' configuration, file authentication skipped");
                        continue;
                    }
                    providers.push(Arc::new(CredentialsAuthenticator::new(Arc::clone(&store))));
                }
            }
        }

        Self { providers }
    }

    /// Run every provider in order
    ///
    /// The first non-allow verdict ends the evaluation.
    pub async fn authenticate(&self, session: &Session) -> AuthResult {
        for provider in &self.providers {
            let result = match provider.authenticate(session).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(
                        provider = %provider.name(),
                        client_id = %session.client_id,
                        error = %e,
                        "Authentication provider error"
                    );
                    return AuthResult::deny("Authentication provider error");
                }
            };

            if !result.is_allowed() {
                debug!(
                    provider = %provider.name(),
                    client_id = %session.client_id,
                    decision = ?result.decision,
                    reason = ?result.reason,
                    "Authentication failed"
                );
                return AuthResult::deny(result.reason.as_deref().unwrap_or("Authentication failed"));
            }
        }

        debug!(client_id = %session.client_id, username = ?session.username(), "Authentication successful");
        AuthResult::allow()
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }
}
