//! ACL topic filter

use super::{Action, AclTable, TopicFilter, ANONYMOUS_USER};
use crate::mqtt::topic;
use crate::session::{split_identity, Session};
use crate::store::CredentialStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Where the allowed patterns come from
pub enum PatternSource {
    /// Per-user and per-device lists in the credential store
    Store(Arc<CredentialStore>),
    /// Single-list ACL file
    File(AclTable),
}

/// Allows a topic only if it matches one of the session's patterns
pub struct AclFilter {
    source: PatternSource,
}

impl AclFilter {
    pub fn new(source: PatternSource) -> Self {
        Self { source }
    }

    async fn store_allows(
        store: &CredentialStore,
        session: &Session,
        topic: &str,
        action: Action,
    ) -> bool {
        let (account, device) = match session.username() {
            None => (ANONYMOUS_USER, None),
            Some(username) => match split_identity(username) {
                Ok((account, device)) => (account, Some(device)),
                Err(_) => (username, None),
            },
        };

        let credentials = store.read().await;
        let Some(user) = credentials.get(account) else {
            debug!(username = %account, "No ACL entry for user");
            return false;
        };

        let allowed = user
            .patterns(device, action)
            .any(|pattern| topic::matches(topic, pattern));

        debug!(
            username = %account,
            device = ?device,
            topic = %topic,
            action = ?action,
            allowed,
            "ACL checked"
        );
        allowed
    }
}

#[async_trait]
impl TopicFilter for AclFilter {
    async fn filter(&self, session: &Session, topic: &str, action: Action) -> bool {
        if topic.is_empty() {
            return false;
        }

        match &self.source {
            PatternSource::Store(store) => Self::store_allows(store, session, topic, action).await,
            PatternSource::File(table) => table.allows(session, topic).await,
        }
    }

    fn name(&self) -> &str {
        "acl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Credentials, UserRecord};

    fn store() -> Arc<CredentialStore> {
        let mut alice = UserRecord::new("h".into());
        alice.add_device("phone", "k".into());
        alice.add_device("tv", "k".into());
        alice.acl_publish_all.push("alice/status".into());
        alice.acl_subscribe_all.push("alice/cmd/+".into());
        alice.acl_publish.get_mut("phone").unwrap().push("alice/phone/#".into());
        alice.acl_subscribe.get_mut("tv").unwrap().push("media/#".into());

        let mut anonymous = UserRecord::new(String::new());
        anonymous.acl_subscribe_all.push("public/#".into());

        let credentials: Credentials = [
            ("alice".to_string(), alice),
            (ANONYMOUS_USER.to_string(), anonymous),
        ]
        .into_iter()
        .collect();

        Arc::new(CredentialStore::in_memory(credentials))
    }

    fn filter() -> AclFilter {
        AclFilter::new(PatternSource::Store(store()))
    }

    #[tokio::test]
    async fn test_shared_patterns_apply_to_every_device() {
        let phone = Session::with_credentials("c1", "alice-phone", "pw-k");
        let tv = Session::with_credentials("c2", "alice-tv", "pw-k");

        assert!(filter().filter(&phone, "alice/status", Action::Publish).await);
        assert!(filter().filter(&tv, "alice/status", Action::Publish).await);
        assert!(filter().filter(&tv, "alice/cmd/power", Action::Subscribe).await);
    }

    #[tokio::test]
    async fn test_device_patterns_stay_with_device() {
        let phone = Session::with_credentials("c1", "alice-phone", "pw-k");
        let tv = Session::with_credentials("c2", "alice-tv", "pw-k");

        assert!(filter().filter(&phone, "alice/phone/gps", Action::Publish).await);
        assert!(!filter().filter(&tv, "alice/phone/gps", Action::Publish).await);
        assert!(filter().filter(&tv, "media/movies", Action::Subscribe).await);
        assert!(!filter().filter(&phone, "media/movies", Action::Subscribe).await);
    }

    #[tokio::test]
    async fn test_direction_is_respected() {
        let phone = Session::with_credentials("c1", "alice-phone", "pw-k");

        assert!(!filter().filter(&phone, "alice/status", Action::Subscribe).await);
        assert!(!filter().filter(&phone, "alice/cmd/power", Action::Publish).await);
    }

    #[tokio::test]
    async fn test_anonymous_uses_anonymous_record() {
        let anon = Session::anonymous("c1");

        assert!(filter().filter(&anon, "public/news", Action::Subscribe).await);
        assert!(!filter().filter(&anon, "public/news", Action::Publish).await);
    }

    #[tokio::test]
    async fn test_unknown_user_denied() {
        let mallory = Session::with_credentials("c1", "mallory-laptop", "pw-k");
        assert!(!filter().filter(&mallory, "alice/status", Action::Publish).await);
    }

    #[tokio::test]
    async fn test_username_without_device_uses_shared_lists() {
        let alice = Session::with_credentials("c1", "alice", "pw");

        assert!(filter().filter(&alice, "alice/status", Action::Publish).await);
        assert!(!filter().filter(&alice, "alice/phone/gps", Action::Publish).await);
    }

    #[tokio::test]
    async fn test_empty_topic_denied() {
        let phone = Session::with_credentials("c1", "alice-phone", "pw-k");
        assert!(!filter().filter(&phone, "", Action::Publish).await);
    }
}
