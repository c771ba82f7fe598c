//! Small shared utilities: conn-id allocation and the daemon clock.

pub mod conn;
pub mod time;
