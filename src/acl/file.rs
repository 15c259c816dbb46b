//! Single-list ACL file
//!
//! ```yaml
//! acl:
//!   alice: ["alice/#", "public/+"]
//!   anonymous: ["public/#"]
//! ```
//!
//! Patterns apply to both publish and subscribe.

use super::ANONYMOUS_USER;
use crate::error::Result;
use crate::mqtt::topic;
use crate::session::{split_identity, Session};
use crate::store::file;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// ACL file document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AclFile {
    /// Map of username to allowed topic patterns
    pub acl: BTreeMap<String, Vec<String>>,
}

/// ACL file cached in memory, optionally re-read on every check
#[derive(Debug)]
pub struct AclTable {
    path: PathBuf,
    hot_reload: bool,
    table: RwLock<AclFile>,
}

impl AclTable {
    /// Load the ACL file; a missing or unreadable file gives an empty table
    pub async fn open(path: impl Into<PathBuf>, hot_reload: bool) -> Self {
        let path = path.into();
        let table = match file::read_document::<AclFile>(&path).await {
            Ok(Some(table)) => table,
            Ok(None) => {
                warn!(path = %path.display(), "ACL file not found, all topics denied");
                AclFile::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load ACL file, all topics denied");
                AclFile::default()
            }
        };

        Self {
            path,
            hot_reload,
            table: RwLock::new(table),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file. The previous table is kept if the file is missing or invalid.
    pub async fn reload(&self) -> Result<()> {
        match file::read_document::<AclFile>(&self.path).await? {
            Some(table) => *self.table.write() = table,
            None => debug!(path = %self.path.display(), "ACL file vanished, keeping previous table"),
        }
        Ok(())
    }

    /// Check `topic` against the patterns of the session's user
    ///
    /// Entries are looked up by the full username first, then by the account
    /// part of a `user-device` name. Sessions without a username use the
    /// `anonymous` entry.
    pub async fn allows(&self, session: &Session, topic: &str) -> bool {
        if self.hot_reload {
            if let Err(e) = self.reload().await {
                warn!(path = %self.path.display(), error = %e, "Failed to hot reload ACL file");
            }
        }
        self.lookup(session, topic)
    }

    fn lookup(&self, session: &Session, topic: &str) -> bool {
        let table = self.table.read();

        let patterns = match session.username() {
            None => table.acl.get(ANONYMOUS_USER),
            Some(username) => table.acl.get(username).or_else(|| {
                split_identity(username)
                    .ok()
                    .and_then(|(account, _)| table.acl.get(account))
            }),
        };

        patterns.is_some_and(|list| list.iter().any(|pattern| topic::matches(topic, pattern)))
    }
}
