//! Read-only view of a connected client as seen by the authorization hooks

use crate::error::{Error, Result};

/// Delimiter between account and device in usernames and passwords.
///
/// Only the first occurrence splits; later dashes stay in the second part.
/// Account names containing a dash therefore cannot be expressed. This is a
/// known limitation of the credential string format.
pub const IDENTITY_DELIMITER: char = '-';

/// Identity of one connected client, owned by the broker core
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Client ID from CONNECT
    pub client_id: String,
    /// Username from CONNECT (if provided)
    pub username: Option<String>,
    /// Password from CONNECT (if provided)
    pub password: Option<String>,
    /// Remote peer address or certificate identity
    pub peer: String,
}

impl Session {
    pub fn anonymous(client_id: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            ..Default::default()
        }
    }

    pub fn with_credentials(client_id: &str, username: &str, password: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            username: Some(username.to_string()),
            password: Some(password.to_string()),
            peer: String::new(),
        }
    }

    /// Username, treating an empty string the same as an absent one
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref().filter(|u| !u.is_empty())
    }
}

/// Split `first-second` on the first delimiter
///
/// Used for both `username-deviceId` and `password-deviceKey`.
pub fn split_identity(value: &str) -> Result<(&str, &str)> {
    match value.split_once(IDENTITY_DELIMITER) {
        Some((first, second)) if !first.is_empty() && !second.is_empty() => Ok((first, second)),
        _ => Err(Error::MalformedCredential(format!(
            "expected two '{}'-separated fields",
            IDENTITY_DELIMITER
        ))),
    }
}
