/*!
 * Core Module
 * Result taxonomy, timestamps and build-time limits
 */

pub mod errors;
pub mod limits;
pub mod time;

// Re-export for convenience
pub use errors::*;
pub use limits::{poll_interval, POLL_INTERVAL_NS};
pub use time::Timespec;
