//! MQTT topic pattern matching
//!
//! ACL entries are MQTT topic filters. `+` stands for exactly one level,
//! `#` for the current level and everything after it.

const SEPARATOR: char = '/';
const SINGLE_LEVEL: &str = "+";
const MULTI_LEVEL: &str = "#";

/// Check whether a concrete topic matches an ACL pattern
///
/// Levels are compared pairwise. A `+` level consumes exactly one topic
/// level, including an empty one. A `#` level in last position matches
/// whatever remains, zero levels included. A `#` anywhere else never
/// matches. Everything else compares byte for byte and both sides must
/// run out together.
///
/// # Examples
/// ```
/// use sentinel_mqtt_broker_auth::mqtt::topic;
///
/// assert!(topic::matches("a/b/c", "a/+/c"));
/// assert!(topic::matches("a", "a/#"));
/// assert!(!topic::matches("a/b/c", "a/+"));
/// ```
pub fn matches(topic: &str, pattern: &str) -> bool {
    let mut topic_levels = topic.split(SEPARATOR);
    let mut pattern_levels = pattern.split(SEPARATOR).peekable();

    while let Some(level) = pattern_levels.next() {
        if level == MULTI_LEVEL {
            return pattern_levels.peek().is_none();
        }

        match topic_levels.next() {
            Some(_) if level == SINGLE_LEVEL => {}
            Some(topic_level) if topic_level == level => {}
            _ => return false,
        }
    }

    topic_levels.next().is_none()
}

/// Check if a pattern is a well-formed MQTT topic filter
///
/// `#` must be alone in the last level, `+` must be alone in its level
/// and no level may be empty.
pub fn is_valid_filter(filter: &str) -> bool {
    if filter.is_empty() {
        return false;
    }

    let levels: Vec<&str> = filter.split(SEPARATOR).collect();
    let last = levels.len() - 1;

    levels.iter().enumerate().all(|(i, level)| {
        !level.is_empty()
            && (!level.contains('#') || (*level == MULTI_LEVEL && i == last))
            && (!level.contains('+') || *level == SINGLE_LEVEL)
    })
}

/// Check if a topic name is valid for publishing (no wildcards, no empty levels)
pub fn is_valid_topic(topic: &str) -> bool {
    !topic.is_empty()
        && !topic.contains(['+', '#'])
        && topic.split(SEPARATOR).all(|level| !level.is_empty())
}
