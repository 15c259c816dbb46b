//! Configuration types for the broker authorization plugins
//!
//! Mirrors the broker's `auth`, `topic-check` and `registration` sections.
//! A missing `auth` or `topic-check` section is not an error: the feature
//! falls back to its permissive default and a warning is logged.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration consumed by [`crate::BrokerAuth`]
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct BrokerAuthConfig {
    /// Connection authentication
    pub auth: Option<AuthConfig>,

    /// Publish/subscribe topic filtering
    pub topic_check: Option<TopicCheckConfig>,

    /// Runtime onboarding of users and devices
    pub registration: RegistrationConfig,
}

impl BrokerAuthConfig {
    /// Reject values that can only be a configuration mistake
    pub fn validate(&self) -> Result<()> {
        if let Some(auth) = &self.auth {
            if !(MIN_HASH_COST..=MAX_HASH_COST).contains(&auth.hash_cost) {
                bail!(
                    "auth.hash-cost must be between {} and {}, got {}",
                    MIN_HASH_COST,
                    MAX_HASH_COST,
                    auth.hash_cost
                );
            }
        }
        if self.registration.topic.is_empty() {
            bail!("registration.topic must not be empty");
        }
        Ok(())
    }

    /// Path of the credential file, if one is configured
    pub fn password_file(&self) -> Option<&Path> {
        self.auth.as_ref()?.password_file.as_deref()
    }

    /// Cost factor for newly computed hashes
    pub fn hash_cost(&self) -> u32 {
        self.auth
            .as_ref()
            .map_or_else(default_hash_cost, |auth| auth.hash_cost)
    }
}

// ============================================================================
// Authentication Configuration
// ============================================================================

const MIN_HASH_COST: u32 = 4;
const MAX_HASH_COST: u32 = 31;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AuthConfig {
    /// Authenticators, evaluated in order; all must allow
    pub plugins: Vec<AuthPlugin>,

    /// Allow connections without a username
    pub allow_anonymous: bool,

    /// Credential file (YAML, or JSON with a `.json` extension)
    pub password_file: Option<PathBuf>,

    /// bcrypt cost for newly registered secrets
    pub hash_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            plugins: vec![AuthPlugin::Anonymous, AuthPlugin::File],
            allow_anonymous: true,
            password_file: None,
            hash_cost: default_hash_cost(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthPlugin {
    /// Allow-anonymous policy check
    Anonymous,
    /// `user-device` / `password-key` verification against the credential store
    File,
}

// ============================================================================
// Topic Check Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TopicCheckConfig {
    /// Enable topic filtering. When false every topic is allowed.
    pub enabled: bool,

    /// Filters, evaluated in order; all must allow
    pub plugins: Vec<TopicPlugin>,

    /// Topics nobody but the admin user may use
    pub taboo: Vec<String>,

    /// Username exempt from the taboo list
    pub admin_user: String,

    /// ACL source
    pub acl: AclFileConfig,
}

impl Default for TopicCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            plugins: vec![TopicPlugin::Taboo, TopicPlugin::Acl],
            taboo: default_taboo(),
            admin_user: default_admin_user(),
            acl: AclFileConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TopicPlugin {
    Taboo,
    Acl,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct AclFileConfig {
    /// Single-list ACL file (`acl: { user: [pattern] }`). When absent the
    /// per-user and per-device lists of the credential store are used.
    pub file: Option<PathBuf>,

    /// Re-read the ACL file on every check
    pub hot_reload: bool,
}

// ============================================================================
// Registration Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RegistrationConfig {
    /// Reserved topic carrying registration payloads. Subtopics match too.
    pub topic: String,

    /// Write the credential file after every successful ACL change
    pub persist_on_change: bool,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            topic: default_registration_topic(),
            persist_on_change: false,
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Load and validate a configuration file (YAML, or JSON by extension)
pub fn load_config(path: &Path) -> Result<BrokerAuthConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;

    let is_json = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    let config: BrokerAuthConfig = if is_json {
        serde_json::from_str(&contents).context("Failed to parse JSON configuration")?
    } else {
        serde_yaml::from_str(&contents).context("Failed to parse YAML configuration")?
    };

    config.validate()?;
    Ok(config)
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_hash_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

fn default_taboo() -> Vec<String> {
    ["prohibited", "top-secret", "data/classified"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_admin_user() -> String {
    "admin".to_string()
}

fn default_registration_topic() -> String {
    "registration".to_string()
}
