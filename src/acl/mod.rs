//! Topic authorization
//!
//! Decides whether a session may publish to or subscribe on a topic. Filters
//! run in order and all of them must allow; the first denial wins. With no
//! filter enabled every request is allowed.

mod file;
mod filter;
mod taboo;

pub use file::{AclFile, AclTable};
pub use filter::{AclFilter, PatternSource};
pub use taboo::TabooFilter;

use crate::config::{TopicCheckConfig, TopicPlugin};
use crate::error::Error;
use crate::session::Session;
use crate::store::CredentialStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Username whose patterns apply to sessions without credentials
pub const ANONYMOUS_USER: &str = "anonymous";

/// Operation being authorized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Publish,
    Subscribe,
}

impl Action {
    pub fn from_publish(is_publish: bool) -> Self {
        if is_publish {
            Self::Publish
        } else {
            Self::Subscribe
        }
    }
}

/// A single topic check
#[async_trait]
pub trait TopicFilter: Send + Sync {
    /// Return true if `session` may perform `action` on `topic`
    async fn filter(&self, session: &Session, topic: &str, action: Action) -> bool;

    /// Filter name for logging
    fn name(&self) -> &str;
}

/// Ordered chain of topic filters
#[derive(Default, Clone)]
pub struct TopicAuthorizer {
    filters: Vec<Arc<dyn TopicFilter>>,
}

impl TopicAuthorizer {
    pub fn new(filters: Vec<Arc<dyn TopicFilter>>) -> Self {
        Self { filters }
    }

    /// Build the filter chain from the `topic-check` section
    ///
    /// A missing or disabled section produces an empty chain, which allows
    /// everything.
    pub async fn from_config(
        config: Option<&TopicCheckConfig>,
        store: Arc<CredentialStore>,
    ) -> Self {
        let Some(config) = config else {
            warn!(error = %Error::ConfigMissing("topic-check"), "Topic filtering disabled");
            return Self::default();
        };

        if !config.enabled {
            debug!("'topic-check' disabled in configuration");
            return Self::default();
        }

        let mut filters: Vec<Arc<dyn TopicFilter>> = Vec::new();
        for plugin in &config.plugins {
            match plugin {
                TopicPlugin::Taboo => {
                    filters.push(Arc::new(TabooFilter::new(
                        config.taboo.iter().cloned(),
                        &config.admin_user,
                    )));
                }
                TopicPlugin::Acl => {
                    let source = match &config.acl.file {
                        Some(path) => PatternSource::File(
                            AclTable::open(path, config.acl.hot_reload).await,
                        ),
                        None => PatternSource::Store(Arc::clone(&store)),
                    };
                    filters.push(Arc::new(AclFilter::new(source)));
                }
            }
        }

        Self { filters }
    }

    /// Evaluate every filter in order; the first denial short-circuits
    pub async fn authorize(&self, session: &Session, topic: &str, action: Action) -> bool {
        for filter in &self.filters {
            if !filter.filter(session, topic, action).await {
                debug!(
                    filter = %filter.name(),
                    client_id = %session.client_id,
                    topic = %topic,
                    action = ?action,
                    "Topic denied"
                );
                return false;
            }
        }
        true
    }

    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Credentials;

    struct Fixed(bool);

    #[async_trait]
    impl TopicFilter for Fixed {
        async fn filter(&self, _session: &Session, _topic: &str, _action: Action) -> bool {
            self.0
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn chain(decisions: &[bool]) -> TopicAuthorizer {
        let filters: Vec<Arc<dyn TopicFilter>> = decisions
            .iter()
            .map(|d| Arc::new(Fixed(*d)) as Arc<dyn TopicFilter>)
            .collect();
        TopicAuthorizer::new(filters)
    }

    fn empty_store() -> Arc<CredentialStore> {
        Arc::new(CredentialStore::in_memory(Credentials::default()))
    }

    #[tokio::test]
    async fn test_no_filters_allows_everything() {
        let authorizer = TopicAuthorizer::default();
        let session = Session::anonymous("c1");

        assert!(authorizer.authorize(&session, "any/topic", Action::Publish).await);
        assert!(authorizer.authorize(&session, "#", Action::Subscribe).await);
        assert!(authorizer.authorize(&session, "", Action::Publish).await);
    }

    #[tokio::test]
    async fn test_all_filters_must_allow() {
        let session = Session::anonymous("c1");

        assert!(chain(&[true, true]).authorize(&session, "t", Action::Publish).await);
        assert!(!chain(&[true, false]).authorize(&session, "t", Action::Publish).await);
        assert!(!chain(&[false, true]).authorize(&session, "t", Action::Publish).await);
    }

    #[tokio::test]
    async fn test_missing_section_builds_empty_chain() {
        let authorizer = TopicAuthorizer::from_config(None, empty_store()).await;
        assert_eq!(authorizer.filter_count(), 0);
    }

    #[tokio::test]
    async fn test_disabled_section_builds_empty_chain() {
        let config = TopicCheckConfig::default();
        let authorizer = TopicAuthorizer::from_config(Some(&config), empty_store()).await;
        assert_eq!(authorizer.filter_count(), 0);

        let session = Session::anonymous("c1");
        assert!(authorizer.authorize(&session, "prohibited", Action::Publish).await);
    }

    #[tokio::test]
    async fn test_enabled_section_builds_configured_filters() {
        let config = TopicCheckConfig {
            enabled: true,
            ..Default::default()
        };
        let authorizer = TopicAuthorizer::from_config(Some(&config), empty_store()).await;
        assert_eq!(authorizer.filter_count(), 2);

        // Empty store: ACL filter denies everything
        let session = Session::anonymous("c1");
        assert!(!authorizer.authorize(&session, "a/b", Action::Publish).await);
    }

    #[test]
    fn test_action_from_publish_flag() {
        assert_eq!(Action::from_publish(true), Action::Publish);
        assert_eq!(Action::from_publish(false), Action::Subscribe);
    }
}
