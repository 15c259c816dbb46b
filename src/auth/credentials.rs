//! Credential-file authentication
//!
//! Clients connect with username `user-device` and password `password-key`.
//! Both the account password and the device key must verify against the
//! hashes held in the credential store.

use super::{AuthResult, AuthenticatorProvider};
use crate::error::{Error, Result};
use crate::session::{split_identity, Session};
use crate::store::CredentialStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Authenticates `user-device` sessions against the credential store
pub struct CredentialsAuthenticator {
    store: Arc<CredentialStore>,
}

impl CredentialsAuthenticator {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self { store }
    }

    /// Copy the password and device key hashes out of the store
    async fn lookup_hashes(&self, username: &str, device: &str) -> Option<(String, String)> {
        let credentials = self.store.read().await;
        let user = credentials.get(username)?;
        let device = user.devices.get(device)?;
        Some((user.password.clone(), device.key.clone()))
    }
}

#[async_trait]
impl AuthenticatorProvider for CredentialsAuthenticator {
    async fn authenticate(&self, session: &Session) -> Result<AuthResult> {
        let Some(identity) = session.username() else {
            return Ok(AuthResult::abstain("No username provided"));
        };

        let (username, device) = split_identity(identity)?;
        let secret = session
            .password
            .as_deref()
            .ok_or_else(|| Error::MalformedCredential("no password provided".into()))?;
        let (password, device_key) = split_identity(secret)?;

        let Some((password_hash, key_hash)) = self.lookup_hashes(username, device).await else {
            debug!(username = %username, device = %device, "Unknown user or device");
            return Ok(AuthResult::deny("Unknown user or device"));
        };

        if password_hash.is_empty() || key_hash.is_empty() {
            debug!(username = %username, device = %device, "No hash stored for user or device");
            return Ok(AuthResult::deny("Missing credential hash"));
        }

        let user_ok = verify_secret(password, &password_hash).await;
        let device_ok = verify_secret(device_key, &key_hash).await;

        if user_ok && device_ok {
            Ok(AuthResult::allow())
        } else {
            Ok(AuthResult::deny("Invalid credentials"))
        }
    }

    fn name(&self) -> &str {
        "credentials-file"
    }
}

/// Hash a secret for storage
///
/// bcrypt is CPU bound, so the work runs on the blocking pool.
pub async fn hash_secret(secret: &str, cost: u32) -> Result<String> {
    let secret = secret.to_string();
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(secret, cost)).await??;
    Ok(hash)
}

/// Verify a secret against a stored hash. Malformed hashes never verify.
pub async fn verify_secret(secret: &str, hash: &str) -> bool {
    let secret = secret.to_string();
    let hash = hash.to_string();

    match tokio::task::spawn_blocking(move || bcrypt::verify(secret, &hash)).await {
        Ok(Ok(valid)) => valid,
        Ok(Err(e)) => {
            warn!(error = %e, "Secret verification error");
            false
        }
        Err(e) => {
            warn!(error = %e, "Secret verification task failed");
            false
        }
    }
}
