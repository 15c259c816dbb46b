//! Anonymous connection policy

use super::{AuthResult, AuthenticatorProvider};
use crate::error::Result;
use crate::session::Session;
use async_trait::async_trait;
use tracing::debug;

/// Allows everyone when anonymous access is on, otherwise only sessions
/// that present a non-empty username
#[derive(Debug, Clone, Copy)]
pub struct AnonymousAuthenticator {
    allow_anonymous: bool,
}

impl AnonymousAuthenticator {
    pub fn new(allow_anonymous: bool) -> Self {
        Self { allow_anonymous }
    }
}

impl Default for AnonymousAuthenticator {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl AuthenticatorProvider for AnonymousAuthenticator {
    async fn authenticate(&self, session: &Session) -> Result<AuthResult> {
        if self.allow_anonymous {
            debug!(client_id = %session.client_id, "Configuration allows anonymous connections");
            return Ok(AuthResult::allow());
        }

        if session.username().is_some() {
            Ok(AuthResult::allow())
        } else {
            Ok(AuthResult::deny("Anonymous connections not allowed"))
        }
    }

    fn name(&self) -> &str {
        "anonymous"
    }
}
