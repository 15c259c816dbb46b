//! Fixed topic denylist

use super::{Action, TopicFilter};
use crate::session::Session;
use async_trait::async_trait;
use std::collections::HashSet;

/// Denies an exact list of topics to everyone except the admin user
///
/// Comparison is literal: wildcards in the list have no special meaning.
#[derive(Debug, Clone)]
pub struct TabooFilter {
    taboo: HashSet<String>,
    admin_user: String,
}

impl TabooFilter {
    pub fn new(taboo: impl IntoIterator<Item = String>, admin_user: &str) -> Self {
        Self {
            taboo: taboo.into_iter().collect(),
            admin_user: admin_user.to_string(),
        }
    }

    fn is_admin(&self, session: &Session) -> bool {
        session.username() == Some(self.admin_user.as_str())
    }
}

#[async_trait]
impl TopicFilter for TabooFilter {
    async fn filter(&self, session: &Session, topic: &str, _action: Action) -> bool {
        if topic.is_empty() {
            return false;
        }
        self.is_admin(session) || !self.taboo.contains(topic)
    }

    fn name(&self) -> &str {
        "taboo"
    }
}
