//! Runtime onboarding of users, devices and ACL entries
//!
//! Every operation validates and mutates under the store's exclusive lock,
//! so concurrent registrations of one username cannot both succeed. Changes
//! stay in memory until [`Registrar::flush`] unless ACL persistence is on.

use crate::acl::Action;
use crate::auth::hash_secret;
use crate::error::{Error, Result};
use crate::mqtt::topic;
use crate::session::IDENTITY_DELIMITER;
use crate::store::{CredentialStore, UserRecord};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

const PAYLOAD_FORMAT: &str = "expected '<username>/<password> <deviceId>/<deviceKey>'";

/// Decoded registration payload: `<username>/<password> <deviceId>/<deviceKey>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationPayload {
    pub username: String,
    pub password: String,
    pub device_id: String,
    pub device_key: String,
}

impl RegistrationPayload {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(payload)
            .map_err(|_| Error::MalformedPayload("payload is not valid UTF-8".into()))?;

        // Exactly one space between the fields, no other whitespace anywhere
        let Some((account, device)) = text.split_once(' ') else {
            return Err(Error::MalformedPayload(PAYLOAD_FORMAT.into()));
        };
        if account.contains(char::is_whitespace) || device.contains(char::is_whitespace) {
            return Err(Error::MalformedPayload(PAYLOAD_FORMAT.into()));
        }

        let (username, password) = split_pair(account)?;
        let (device_id, device_key) = split_pair(device)?;

        // `user-device` / `password-key` logins split on the first dash
        if username.contains(IDENTITY_DELIMITER) || password.contains(IDENTITY_DELIMITER) {
            return Err(Error::MalformedPayload(format!(
                "username and password must not contain '{}'",
                IDENTITY_DELIMITER
            )));
        }

        Ok(Self {
            username: username.to_string(),
            password: password.to_string(),
            device_id: device_id.to_string(),
            device_key: device_key.to_string(),
        })
    }
}

fn split_pair(field: &str) -> Result<(&str, &str)> {
    match field.split_once('/') {
        Some((first, second)) if !first.is_empty() && !second.is_empty() => Ok((first, second)),
        _ => Err(Error::MalformedPayload(PAYLOAD_FORMAT.into())),
    }
}

/// ACL entries to add to one user in a single all-or-nothing step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AclBatch {
    pub publish_all: Vec<String>,
    pub subscribe_all: Vec<String>,
    /// Publish patterns keyed by device ID
    pub publish: BTreeMap<String, Vec<String>>,
    /// Subscribe patterns keyed by device ID
    pub subscribe: BTreeMap<String, Vec<String>>,
}

impl AclBatch {
    pub fn is_empty(&self) -> bool {
        self.patterns().next().is_none()
    }

    /// Every pattern in the batch, all four categories
    pub fn patterns(&self) -> impl Iterator<Item = &String> {
        self.publish_all
            .iter()
            .chain(&self.subscribe_all)
            .chain(self.publish.values().flatten())
            .chain(self.subscribe.values().flatten())
    }

    fn devices(&self) -> impl Iterator<Item = &String> {
        self.publish.keys().chain(self.subscribe.keys())
    }
}

/// Registration service over a shared credential store
pub struct Registrar {
    store: Arc<CredentialStore>,
    hash_cost: u32,
    persist_on_change: bool,
}

impl Registrar {
    pub fn new(store: Arc<CredentialStore>, hash_cost: u32) -> Self {
        Self {
            store,
            hash_cost,
            persist_on_change: false,
        }
    }

    /// Flush the store after every successful ACL batch
    pub fn with_persist_on_change(mut self, persist: bool) -> Self {
        self.persist_on_change = persist;
        self
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Create a user and its first device from a registration payload
    pub async fn register(&self, payload: &[u8]) -> Result<(String, String)> {
        let request = RegistrationPayload::parse(payload)?;

        // Fail fast before hashing; the authoritative check runs under the write lock
        if self.store.read().await.contains(&request.username) {
            return Err(Error::DuplicateUser(request.username));
        }

        let password_hash = hash_secret(&request.password, self.hash_cost).await?;
        let key_hash = hash_secret(&request.device_key, self.hash_cost).await?;

        let mut credentials = self.store.write().await;
        if credentials.contains(&request.username) {
            return Err(Error::DuplicateUser(request.username));
        }

        let mut user = UserRecord::new(password_hash);
        user.add_device(&request.device_id, key_hash);
        credentials.insert(&request.username, user);

        info!(username = %request.username, device = %request.device_id, "Registered user");
        Ok((request.username, request.device_id))
    }

    /// Add a device to an existing user
    pub async fn register_device(
        &self,
        username: &str,
        device_id: &str,
        device_key: &str,
    ) -> Result<(String, String)> {
        if device_id.is_empty() || device_key.is_empty() {
            return Err(Error::MalformedPayload("device ID and key must not be empty".into()));
        }

        Self::check_new_device(self.store.read().await.get(username), username, device_id)?;
        let key_hash = hash_secret(device_key, self.hash_cost).await?;

        let mut credentials = self.store.write().await;
        Self::check_new_device(credentials.get(username), username, device_id)?;
        if let Some(user) = credentials.get_mut(username) {
            user.add_device(device_id, key_hash);
        }

        info!(username = %username, device = %device_id, "Registered device");
        Ok((username.to_string(), device_id.to_string()))
    }

    fn check_new_device(user: Option<&UserRecord>, username: &str, device_id: &str) -> Result<()> {
        let user = user.ok_or_else(|| Error::UnknownUser(username.to_string()))?;
        if user.has_device(device_id) {
            return Err(Error::DuplicateDevice {
                username: username.to_string(),
                device: device_id.to_string(),
            });
        }
        Ok(())
    }

    /// Append a batch of ACL patterns to a user
    ///
    /// The whole batch is validated before anything is written: if any
    /// pattern already exists in its target list (or repeats inside the
    /// batch), nothing is added.
    pub async fn add_user_acl(&self, username: &str, batch: &AclBatch) -> Result<()> {
        let mut credentials = self.store.write().await;

        let user = credentials
            .get_mut(username)
            .ok_or_else(|| Error::UnknownUser(username.to_string()))?;

        validate_batch(username, user, batch)?;
        apply_batch(user, batch);

        info!(
            username = %username,
            patterns = batch.patterns().count(),
            "Added ACL entries"
        );

        if self.persist_on_change {
            if let Err(e) = self.store.persist(&credentials).await {
                warn!(username = %username, error = %e, "Failed to persist ACL change");
            }
        }
        Ok(())
    }

    /// Write the store to disk
    pub async fn flush(&self) -> Result<()> {
        self.store.save().await
    }
}

fn validate_batch(username: &str, user: &UserRecord, batch: &AclBatch) -> Result<()> {
    if let Some(device) = batch.devices().find(|d| !user.has_device(d)) {
        return Err(Error::UnknownDevice {
            username: username.to_string(),
            device: device.clone(),
        });
    }

    if let Some(pattern) = batch.patterns().find(|p| !topic::is_valid_filter(p)) {
        return Err(Error::MalformedPayload(format!("invalid topic filter '{}'", pattern)));
    }

    check_no_overlap(username, user.shared_patterns(Action::Publish), &batch.publish_all)?;
    check_no_overlap(username, user.shared_patterns(Action::Subscribe), &batch.subscribe_all)?;
    for (device, patterns) in &batch.publish {
        check_no_overlap(username, user.device_patterns(device, Action::Publish), patterns)?;
    }
    for (device, patterns) in &batch.subscribe {
        check_no_overlap(username, user.device_patterns(device, Action::Subscribe), patterns)?;
    }
    Ok(())
}

fn check_no_overlap(username: &str, existing: &[String], proposed: &[String]) -> Result<()> {
    let mut seen: HashSet<&str> = existing.iter().map(String::as_str).collect();
    for pattern in proposed {
        if !seen.insert(pattern) {
            return Err(Error::DuplicateAclEntry {
                username: username.to_string(),
                pattern: pattern.clone(),
            });
        }
    }
    Ok(())
}

fn apply_batch(user: &mut UserRecord, batch: &AclBatch) {
    user.acl_publish_all.extend(batch.publish_all.iter().cloned());
    user.acl_subscribe_all.extend(batch.subscribe_all.iter().cloned());
    for (device, patterns) in &batch.publish {
        user.acl_publish
            .entry(device.clone())
            .or_default()
            .extend(patterns.iter().cloned());
    }
    for (device, patterns) in &batch.subscribe {
        user.acl_subscribe
            .entry(device.clone())
            .or_default()
            .extend(patterns.iter().cloned());
    }
}
