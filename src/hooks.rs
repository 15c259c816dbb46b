//! Broker hook surface
//!
//! The broker core calls these hooks directly at CONNECT, PUBLISH,
//! SUBSCRIBE, on registration traffic and at shutdown. Validation failures
//! become a `false`/`None` result plus a log entry; only persistence errors
//! at shutdown are returned to the caller.

use crate::acl::{Action, TopicAuthorizer};
use crate::auth::Authenticator;
use crate::config::BrokerAuthConfig;
use crate::error::Result;
use crate::registration::{AclBatch, Registrar};
use crate::session::Session;
use crate::store::{CredentialStore, Credentials};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened to a published message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Not registration traffic; deliver as usual
    Passthrough,
    /// Registration payload accepted
    Registered { username: String, device_id: String },
    /// Registration payload refused
    Rejected,
}

/// Statically typed hooks invoked by the broker core
#[async_trait]
pub trait BrokerHooks: Send + Sync {
    /// Decide whether a connecting session is accepted
    async fn on_connect(&self, session: &Session) -> bool;

    /// Decide whether a session may publish to (or subscribe on) a topic
    async fn on_authorize(&self, session: &Session, topic: &str, is_publish: bool) -> bool;

    async fn on_register(&self, payload: &[u8]) -> Option<(String, String)>;

    async fn on_register_device(
        &self,
        username: &str,
        device_id: &str,
        device_key: &str,
    ) -> Option<(String, String)>;

    async fn on_add_user_acl(&self, username: &str, batch: &AclBatch) -> bool;

    /// Inspect a delivered PUBLISH; registration payloads are consumed here
    async fn on_message(&self, session: &Session, topic: &str, payload: &[u8]) -> MessageOutcome;

    /// Flush the credential store. Must complete before the process exits.
    async fn on_shutdown(&self) -> Result<()>;
}

/// Authentication, topic authorization and registration for one broker
pub struct BrokerAuth {
    config: RwLock<BrokerAuthConfig>,
    store: Arc<CredentialStore>,
    authenticator: RwLock<Arc<Authenticator>>,
    authorizer: RwLock<Arc<TopicAuthorizer>>,
    registrar: RwLock<Arc<Registrar>>,
}

impl BrokerAuth {
    /// Build with the default (permissive) configuration and an in-memory store
    pub async fn new() -> Self {
        Self::with_config(BrokerAuthConfig::default()).await
    }

    /// Build every component from `config`
    ///
    /// The credential store is opened from `auth.password-file` when set,
    /// otherwise it lives in memory only.
    pub async fn with_config(config: BrokerAuthConfig) -> Self {
        let store = match config.password_file() {
            Some(path) => Arc::new(CredentialStore::open(path).await),
            None => {
                debug!("No password file configured, credential store is in memory only");
                Arc::new(CredentialStore::in_memory(Credentials::default()))
            }
        };

        let authenticator = Authenticator::from_config(config.auth.as_ref(), Arc::clone(&store));
        let authorizer =
            TopicAuthorizer::from_config(config.topic_check.as_ref(), Arc::clone(&store)).await;
        let registrar = Self::build_registrar(&config, &store);
        let users = store.user_count().await;

        info!(
            authenticators = authenticator.provider_count(),
            topic_filters = authorizer.filter_count(),
            users,
            "Broker authorization initialized"
        );

        Self {
            config: RwLock::new(config),
            store,
            authenticator: RwLock::new(Arc::new(authenticator)),
            authorizer: RwLock::new(Arc::new(authorizer)),
            registrar: RwLock::new(Arc::new(registrar)),
        }
    }

    fn build_registrar(config: &BrokerAuthConfig, store: &Arc<CredentialStore>) -> Registrar {
        Registrar::new(Arc::clone(store), config.hash_cost())
            .with_persist_on_change(config.registration.persist_on_change)
    }

    /// Rebuild the authenticator chain, the topic filters and the registrar
    ///
    /// The credential store, and with it every registered user, is kept.
    pub async fn reconfigure(&self, config: BrokerAuthConfig) -> anyhow::Result<()> {
        config.validate()?;

        if config.password_file() != self.store.path() {
            warn!("Changing 'auth.password-file' requires a restart, keeping the current store");
        }

        let authenticator = Authenticator::from_config(config.auth.as_ref(), Arc::clone(&self.store));
        let authorizer =
            TopicAuthorizer::from_config(config.topic_check.as_ref(), Arc::clone(&self.store)).await;
        let registrar = Self::build_registrar(&config, &self.store);

        *self.authenticator.write() = Arc::new(authenticator);
        *self.authorizer.write() = Arc::new(authorizer);
        *self.registrar.write() = Arc::new(registrar);
        *self.config.write() = config;

        info!("Broker authorization reconfigured");
        Ok(())
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn registrar(&self) -> Arc<Registrar> {
        Arc::clone(&self.registrar.read())
    }

    fn is_registration_topic(&self, topic: &str) -> bool {
        let config = self.config.read();
        let reserved = config.registration.topic.as_str();
        topic
            .strip_prefix(reserved)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }
}

#[async_trait]
impl BrokerHooks for BrokerAuth {
    async fn on_connect(&self, session: &Session) -> bool {
        info!(
            client_id = %session.client_id,
            username = ?session.username(),
            peer = %session.peer,
            "MQTT CONNECT"
        );

        let authenticator = Arc::clone(&self.authenticator.read());
        let result = authenticator.authenticate(session).await;

        if !result.is_allowed() {
            warn!(
                client_id = %session.client_id,
                reason = ?result.reason,
                "Authentication failed"
            );
            return false;
        }

        debug!(client_id = %session.client_id, "CONNECT allowed");
        true
    }

    async fn on_authorize(&self, session: &Session, topic: &str, is_publish: bool) -> bool {
        let action = Action::from_publish(is_publish);
        let authorizer = Arc::clone(&self.authorizer.read());
        let allowed = authorizer.authorize(session, topic, action).await;

        if !allowed {
            warn!(
                client_id = %session.client_id,
                username = ?session.username(),
                topic = %topic,
                action = ?action,
                "Topic access denied"
            );
        }
        allowed
    }

    async fn on_register(&self, payload: &[u8]) -> Option<(String, String)> {
        match self.registrar().register(payload).await {
            Ok(ids) => Some(ids),
            Err(e) => {
                warn!(error = %e, "Registration rejected");
                None
            }
        }
    }

    async fn on_register_device(
        &self,
        username: &str,
        device_id: &str,
        device_key: &str,
    ) -> Option<(String, String)> {
        match self
            .registrar()
            .register_device(username, device_id, device_key)
            .await
        {
            Ok(ids) => Some(ids),
            Err(e) => {
                warn!(username = %username, device = %device_id, error = %e, "Device registration rejected");
                None
            }
        }
    }

    async fn on_add_user_acl(&self, username: &str, batch: &AclBatch) -> bool {
        match self.registrar().add_user_acl(username, batch).await {
            Ok(()) => true,
            Err(e) => {
                warn!(username = %username, error = %e, "ACL update rejected");
                false
            }
        }
    }

    async fn on_message(&self, session: &Session, topic: &str, payload: &[u8]) -> MessageOutcome {
        if !self.is_registration_topic(topic) {
            return MessageOutcome::Passthrough;
        }

        debug!(client_id = %session.client_id, topic = %topic, "Registration message");
        match self.on_register(payload).await {
            Some((username, device_id)) => MessageOutcome::Registered {
                username,
                device_id,
            },
            None => MessageOutcome::Rejected,
        }
    }

    async fn on_shutdown(&self) -> Result<()> {
        info!("Flushing credential store");
        self.registrar().flush().await
    }
}
