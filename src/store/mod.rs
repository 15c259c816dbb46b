//! Credential store
//!
//! Holds every user, their devices, secret hashes and ACL patterns. The
//! store is loaded once at startup, mutated only by the registration
//! service and written back on flush.

pub mod file;

use crate::acl::Action;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// A device owned by a user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Hash of the device key
    pub key: String,
}

/// One user account as stored on disk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserRecord {
    /// Hash of the account password
    pub password: String,
    pub devices: BTreeMap<String, DeviceRecord>,
    /// Publish patterns granted to every device of the user
    pub acl_publish_all: Vec<String>,
    /// Subscribe patterns granted to every device of the user
    pub acl_subscribe_all: Vec<String>,
    pub acl_publish: BTreeMap<String, Vec<String>>,
    pub acl_subscribe: BTreeMap<String, Vec<String>>,
}

impl UserRecord {
    pub fn new(password_hash: String) -> Self {
        Self {
            password: password_hash,
            ..Default::default()
        }
    }

    /// Add a device together with its empty per-device ACL lists
    pub fn add_device(&mut self, device_id: &str, key_hash: String) {
        self.devices
            .insert(device_id.to_string(), DeviceRecord { key: key_hash });
        self.acl_publish.entry(device_id.to_string()).or_default();
        self.acl_subscribe.entry(device_id.to_string()).or_default();
    }

    pub fn has_device(&self, device_id: &str) -> bool {
        self.devices.contains_key(device_id)
    }

    /// Patterns that apply to every device for `action`
    pub fn shared_patterns(&self, action: Action) -> &[String] {
        match action {
            Action::Publish => &self.acl_publish_all,
            Action::Subscribe => &self.acl_subscribe_all,
        }
    }

    /// Patterns that apply to one device only for `action`
    pub fn device_patterns(&self, device_id: &str, action: Action) -> &[String] {
        let per_device = match action {
            Action::Publish => &self.acl_publish,
            Action::Subscribe => &self.acl_subscribe,
        };
        per_device.get(device_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Effective pattern set: shared patterns followed by the device's own
    pub fn patterns<'a>(
        &'a self,
        device_id: Option<&'a str>,
        action: Action,
    ) -> impl Iterator<Item = &'a str> + 'a {
        let device = device_id
            .map(|d| self.device_patterns(d, action))
            .unwrap_or_default();

        self.shared_patterns(action)
            .iter()
            .chain(device.iter())
            .map(String::as_str)
    }
}

/// Every account known to the broker, keyed by username
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials {
    users: BTreeMap<String, UserRecord>,
}

impl Credentials {
    pub fn get(&self, username: &str) -> Option<&UserRecord> {
        self.users.get(username)
    }

    pub(crate) fn get_mut(&mut self, username: &str) -> Option<&mut UserRecord> {
        self.users.get_mut(username)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }

    pub(crate) fn insert(&mut self, username: &str, user: UserRecord) {
        self.users.insert(username.to_string(), user);
    }

    pub fn usernames(&self) -> impl Iterator<Item = &str> {
        self.users.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl FromIterator<(String, UserRecord)> for Credentials {
    fn from_iter<I: IntoIterator<Item = (String, UserRecord)>>(iter: I) -> Self {
        Self {
            users: iter.into_iter().collect(),
        }
    }
}

/// Shared, lock-guarded credential store backed by an optional file
///
/// Readers (authentication and topic checks) share the lock; every
/// read-validate-mutate sequence holds it exclusively, file writes included.
#[derive(Debug, Default)]
pub struct CredentialStore {
    path: Option<PathBuf>,
    state: RwLock<Credentials>,
}

impl CredentialStore {
    /// Create a store that is never written to disk
    pub fn in_memory(credentials: Credentials) -> Self {
        Self {
            path: None,
            state: RwLock::new(credentials),
        }
    }

    /// Open the store at `path`, starting empty if the file is missing or unreadable
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let credentials = match Self::load(&path).await {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load credentials, starting empty");
                Credentials::default()
            }
        };

        Self {
            path: Some(path),
            state: RwLock::new(credentials),
        }
    }

    /// Load credentials from `path`. A missing file is an empty store.
    pub async fn load(path: &Path) -> Result<Credentials> {
        match file::read_document::<Credentials>(path).await? {
            Some(credentials) => {
                info!(path = %path.display(), users = credentials.len(), "Loaded credentials");
                Ok(credentials)
            }
            None => {
                debug!(path = %path.display(), "Credentials file not found, starting empty");
                Ok(Credentials::default())
            }
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(crate) async fn read(&self) -> RwLockReadGuard<'_, Credentials> {
        self.state.read().await
    }

    pub(crate) async fn write(&self) -> RwLockWriteGuard<'_, Credentials> {
        self.state.write().await
    }

    /// Copy of the current in-memory state
    pub async fn snapshot(&self) -> Credentials {
        self.state.read().await.clone()
    }

    /// Copy of one user record
    pub async fn user(&self, username: &str) -> Option<UserRecord> {
        self.state.read().await.get(username).cloned()
    }

    pub async fn user_count(&self) -> usize {
        self.state.read().await.len()
    }

    /// Write the current state to disk under the exclusive lock
    pub async fn save(&self) -> Result<()> {
        let guard = self.state.write().await;
        self.persist(&guard).await
    }

    /// Replace the in-memory state with the file contents
    pub async fn reload(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut guard = self.state.write().await;
        *guard = Self::load(path).await?;
        Ok(())
    }

    /// Write `credentials` to disk. Callers hold the write guard they pass in.
    pub(crate) async fn persist(&self, credentials: &Credentials) -> Result<()> {
        let Some(path) = &self.path else {
            debug!("Credential store has no backing file, skipping save");
            return Ok(());
        };

        file::write_document(path, credentials).await?;
        info!(path = %path.display(), users = credentials.len(), "Saved credentials");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_user() -> UserRecord {
        let mut user = UserRecord::new("pwhash".into());
        user.add_device("phone", "keyhash".into());
        user.acl_publish_all.push("alice/out/#".into());
        user.acl_subscribe_all.push("alice/in/#".into());
        user.acl_publish
            .get_mut("phone")
            .unwrap()
            .push("alice/phone/+".into());
        user.acl_subscribe
            .get_mut("phone")
            .unwrap()
            .push("broadcast/#".into());
        user
    }

    #[test]
    fn test_add_device_creates_empty_acl_lists() {
        let mut user = UserRecord::new("h".into());
        user.add_device("d1", "k".into());

        assert!(user.has_device("d1"));
        assert_eq!(user.acl_publish.get("d1"), Some(&Vec::new()));
        assert_eq!(user.acl_subscribe.get("d1"), Some(&Vec::new()));
    }

    #[test]
    fn test_effective_patterns_union() {
        let user = sample_user();

        let publish: Vec<_> = user.patterns(Some("phone"), Action::Publish).collect();
        assert_eq!(publish, vec!["alice/out/#", "alice/phone/+"]);

        let subscribe: Vec<_> = user.patterns(Some("phone"), Action::Subscribe).collect();
        assert_eq!(subscribe, vec!["alice/in/#", "broadcast/#"]);

        let no_device: Vec<_> = user.patterns(None, Action::Publish).collect();
        assert_eq!(no_device, vec!["alice/out/#"]);

        let other_device: Vec<_> = user.patterns(Some("tablet"), Action::Publish).collect();
        assert_eq!(other_device, vec!["alice/out/#"]);
    }

    #[test]
    fn test_deserialize_record_format() {
        let yaml = r#"
alice:
  password: "$2b$04$hash"
  devices:
    phone:
      key: "$2b$04$key"
  acl_publish_all: ["a/#"]
  acl_subscribe_all: []
  acl_publish:
    phone: ["a/phone"]
  acl_subscribe:
    phone: []
bob:
  password: "$2b$04$other"
"#;
        let credentials: Credentials = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(credentials.len(), 2);

        let alice = credentials.get("alice").unwrap();
        assert_eq!(alice.devices["phone"].key, "$2b$04$key");
        assert_eq!(alice.device_patterns("phone", Action::Publish), ["a/phone"]);

        let bob = credentials.get("bob").unwrap();
        assert!(bob.devices.is_empty());
        assert!(bob.acl_publish_all.is_empty());
    }

    #[tokio::test]
    async fn test_open_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::open(dir.path().join("creds.yaml")).await;
        assert_eq!(store.user_count().await, 0);
    }

    #[tokio::test]
    async fn test_open_malformed_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("creds.yaml");
        std::fs::write(&path, "alice: 42").unwrap();

        assert!(CredentialStore::load(&path).await.is_err());

        let store = CredentialStore::open(&path).await;
        assert_eq!(store.user_count().await, 0);
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("creds.yaml");

        let store = CredentialStore::open(&path).await;
        store.write().await.insert("alice", sample_user());
        let before = store.snapshot().await;

        store.save().await.unwrap();

        let loaded = CredentialStore::load(&path).await.unwrap();
        assert_eq!(loaded, before);
    }

    #[tokio::test]
    async fn test_save_keeps_backup_of_previous_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("creds.json");

        let store = CredentialStore::open(&path).await;
        store.write().await.insert("alice", sample_user());
        store.save().await.unwrap();
        let first = store.snapshot().await;

        store.write().await.insert("bob", UserRecord::new("h".into()));
        store.save().await.unwrap();

        let backup = CredentialStore::load(&file::backup_path(&path)).await.unwrap();
        assert_eq!(backup, first);
        assert_eq!(CredentialStore::load(&path).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_in_memory_save_is_noop() {
        let store = CredentialStore::in_memory(Credentials::default());
        assert!(store.path().is_none());
        store.save().await.unwrap();
    }

    #[tokio::test]
    async fn test_reload_replaces_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("creds.yaml");

        let store = CredentialStore::open(&path).await;
        store.write().await.insert("alice", sample_user());
        store.save().await.unwrap();

        store.write().await.insert("bob", UserRecord::new("h".into()));
        assert_eq!(store.user_count().await, 2);

        store.reload().await.unwrap();
        assert_eq!(store.user_count().await, 1);
        assert!(store.user("alice").await.is_some());
    }
}
