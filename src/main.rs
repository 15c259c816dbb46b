//! Credential administration CLI
//!
//! Runs the same registration and authorization operations the broker hooks
//! use, against the credential file named in the configuration.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use sentinel_mqtt_broker_auth::acl::Action;
use sentinel_mqtt_broker_auth::config::load_config;
use sentinel_mqtt_broker_auth::mqtt::is_valid_topic;
use sentinel_mqtt_broker_auth::registration::AclBatch;
use sentinel_mqtt_broker_auth::{BrokerAuth, BrokerAuthConfig, BrokerHooks, Session};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Credential and topic authorization admin tool
#[derive(Parser, Debug)]
#[command(name = "sentinel-mqtt-auth")]
#[command(author = "Sentinel Contributors")]
#[command(version)]
#[command(about = "Manage MQTT broker credentials and check access", long_about = None)]
struct Args {
    /// Configuration file path (YAML, or JSON by extension)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Enable JSON log format
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a user and its first device from "<user>/<password> <device>/<key>"
    Register { payload: String },

    /// Add a device to an existing user
    AddDevice {
        username: String,
        device_id: String,
        device_key: String,
    },

    /// Add ACL patterns to a user, all or nothing
    AddAcl {
        username: String,

        /// Publish pattern for every device
        #[arg(long)]
        publish_all: Vec<String>,

        /// Subscribe pattern for every device
        #[arg(long)]
        subscribe_all: Vec<String>,

        /// Publish pattern for one device, as DEVICE=PATTERN
        #[arg(long, value_parser = parse_device_pattern)]
        publish: Vec<(String, String)>,

        /// Subscribe pattern for one device, as DEVICE=PATTERN
        #[arg(long, value_parser = parse_device_pattern)]
        subscribe: Vec<(String, String)>,
    },

    /// Check a username and password as CONNECT would
    Authenticate { username: String, password: String },

    /// Check topic access as PUBLISH or SUBSCRIBE would
    Authorize {
        topic: String,

        /// Username of the session; anonymous when omitted
        #[arg(long)]
        username: Option<String>,

        /// Check publish access instead of subscribe
        #[arg(long)]
        publish: bool,
    },
}

fn parse_device_pattern(value: &str) -> std::result::Result<(String, String), String> {
    match value.split_once('=') {
        Some((device, pattern)) if !device.is_empty() && !pattern.is_empty() => {
            Ok((device.to_string(), pattern.to_string()))
        }
        _ => Err(format!("expected DEVICE=PATTERN, got '{}'", value)),
    }
}

fn group_by_device(entries: Vec<(String, String)>) -> BTreeMap<String, Vec<String>> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (device, pattern) in entries {
        grouped.entry(device).or_default().push(pattern);
    }
    grouped
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.json_logs {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    // Load configuration
    let config = if let Some(config_path) = &args.config {
        info!(path = %config_path.display(), "Loading configuration from file");
        load_config(config_path)?
    } else {
        BrokerAuthConfig::default()
    };

    let broker = BrokerAuth::with_config(config).await;
    let registrar = broker.registrar();

    let mutated = match args.command {
        Command::Register { payload } => {
            let (username, device_id) = registrar.register(payload.as_bytes()).await?;
            println!("registered {}-{}", username, device_id);
            true
        }
        Command::AddDevice {
            username,
            device_id,
            device_key,
        } => {
            let (username, device_id) = registrar
                .register_device(&username, &device_id, &device_key)
                .await?;
            println!("registered {}-{}", username, device_id);
            true
        }
        Command::AddAcl {
            username,
            publish_all,
            subscribe_all,
            publish,
            subscribe,
        } => {
            let batch = AclBatch {
                publish_all,
                subscribe_all,
                publish: group_by_device(publish),
                subscribe: group_by_device(subscribe),
            };
            if batch.is_empty() {
                bail!("no ACL patterns given");
            }
            registrar.add_user_acl(&username, &batch).await?;
            println!("added {} ACL entries for {}", batch.patterns().count(), username);
            true
        }
        Command::Authenticate { username, password } => {
            let session = Session::with_credentials("sentinel-mqtt-auth", &username, &password);
            if !broker.on_connect(&session).await {
                bail!("authentication denied for '{}'", username);
            }
            println!("allowed");
            false
        }
        Command::Authorize {
            topic,
            username,
            publish,
        } => {
            if publish && !is_valid_topic(&topic) {
                bail!("'{}' is not a valid topic name to publish to", topic);
            }
            let mut session = Session::anonymous("sentinel-mqtt-auth");
            session.username = username;
            let action = Action::from_publish(publish);
            if !broker.on_authorize(&session, &topic, publish).await {
                bail!("{:?} denied on '{}'", action, topic);
            }
            println!("allowed");
            false
        }
    };

    if mutated {
        if broker.store().path().is_none() {
            warn!("No 'auth.password-file' configured, changes are not saved");
        }
        broker.on_shutdown().await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_pattern() {
        assert_eq!(
            parse_device_pattern("phone=alice/phone/#").unwrap(),
            ("phone".to_string(), "alice/phone/#".to_string())
        );
        assert!(parse_device_pattern("phone").is_err());
        assert!(parse_device_pattern("=a/b").is_err());
        assert!(parse_device_pattern("phone=").is_err());
    }

    #[test]
    fn test_group_by_device() {
        let grouped = group_by_device(vec![
            ("phone".into(), "a".into()),
            ("tablet".into(), "b".into()),
            ("phone".into(), "c".into()),
        ]);
        assert_eq!(grouped["phone"], ["a", "c"]);
        assert_eq!(grouped["tablet"], ["b"]);
    }

    #[test]
    fn test_cli_parses_add_acl() {
        let args = Args::try_parse_from([
            "sentinel-mqtt-auth",
            "add-acl",
            "alice",
            "--publish-all",
            "alice/#",
            "--subscribe",
            "phone=alice/phone/in",
        ])
        .unwrap();

        match args.command {
            Command::AddAcl {
                username,
                publish_all,
                subscribe,
                ..
            } => {
                assert_eq!(username, "alice");
                assert_eq!(publish_all, ["alice/#"]);
                assert_eq!(subscribe, [("phone".to_string(), "alice/phone/in".to_string())]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
