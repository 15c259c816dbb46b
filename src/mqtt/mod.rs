//! MQTT protocol helpers
//!
//! Only topic handling lives here; packet framing belongs to the broker core.

pub mod topic;

pub use topic::{is_valid_filter, is_valid_topic, matches};
