//! Transparency module for the Synheart Tracker.
//!
//! Tracks how many signals were captured and what happened to their
//! envelopes, since delivery itself is never acknowledged.

pub mod log;

// Re-export commonly used types
pub use log::{create_shared_log, SharedTransparencyLog, TransparencyLog, TransparencyStats};
