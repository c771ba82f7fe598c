//! Millisecond clock for the daemon driver.
//!
//! The router core never reads a clock itself; `Router::update` takes the
//! current time as an argument so tests can drive time explicitly. The
//! daemon uses this helper to supply it.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix time in milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
