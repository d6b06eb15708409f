//! Signal collection for the Synheart Tracker.
//!
//! This module models the host environment the agent observes (an event
//! target and a session history) and provides the capture handlers that
//! turn signals into report records.

pub mod capture;
pub mod navigation;
pub mod target;
pub mod types;

// Re-export commonly used types
pub use capture::{
    capture_events, forward_panics, observe_failures, report_tagged_interactions, RecordSink,
};
pub use navigation::{
    notify_navigation, History, HistoryEntry, HistoryError, MemoryHistory, NavigationKind,
    TrackedHistory,
};
pub use target::{EventTarget, Handler, ListenerId};
pub use types::{Element, Event, EventKind, Rejection, TRACKING_MARKER_ATTRIBUTE};
