//! ID generation utilities for Remindr
//!
//! Provides functions for generating unique identifiers for triggers, task
//! results, and alerts.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

/// Generate a unique trigger ID
///
/// Format: `trig-{timestamp_ms}-{random_hex}`
/// Example: `trig-1738300800123-a1b2`
pub fn generate_trigger_id() -> String {
    let timestamp = now_ms();
    let random: u16 = rand::rng().random();
    format!("trig-{}-{:04x}", timestamp, random)
}

/// Generate a task result ID for a firing of the given trigger
///
/// Format: `res-{trigger_suffix}-{timestamp_ms}-{random_hex}`
pub fn generate_result_id(trigger_id: &str) -> String {
    let suffix = trigger_id.split('-').next_back().unwrap_or(trigger_id);
    let timestamp = now_ms();
    let random: u16 = rand::rng().random();
    format!("res-{}-{}-{:04x}", suffix, timestamp, random)
}

/// Generate an alert ID
///
/// Format: `alert-{timestamp_ms}-{random_hex}`
pub fn generate_alert_id() -> String {
    let timestamp = now_ms();
    let random: u16 = rand::rng().random();
    format!("alert-{}-{:04x}", timestamp, random)
}
