//! Synheart Tracker - non-blocking interaction and failure telemetry.
//!
//! The agent observes signals fired by its host (navigation changes,
//! pointer interactions on tagged elements, uncaught errors, unhandled
//! rejections), turns each one into a report record, merges it with the
//! agent's identity state and hands the resulting JSON envelope to a
//! fire-and-forget transport.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Synheart Tracker                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐          │
//! │  │ EventTarget  │──▶│   Capture    │──▶│  Dispatcher  │──▶ Beacon │
//! │  │  (signals)   │   │  handlers    │   │ (+ state)    │          │
//! │  └──────────────┘   └──────────────┘   └──────────────┘          │
//! │         ▲                                     │                  │
//! │  ┌──────────────┐                      ┌──────────────┐          │
//! │  │TrackedHistory│                      │ Transparency │          │
//! │  │ (pushState)  │                      │     Log      │          │
//! │  └──────────────┘                      └──────────────┘          │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use synheart_tracker::{
//!     install, Element, Event, EventTarget, History, MemoryHistory, MemoryTransport,
//!     TrackerOptions, TRACKING_MARKER_ATTRIBUTE,
//! };
//!
//! let target = EventTarget::new();
//! let transport = Arc::new(MemoryTransport::new());
//! let options = TrackerOptions::new("https://collector.example/beacon")
//!     .history_tracker(true)
//!     .dom_tracker(true);
//!
//! let history = MemoryHistory::new(target.clone(), "https://app.example/");
//! let (tracker, mut history) = install(options, &target, transport.clone(), history).unwrap();
//!
//! history.push_state(serde_json::Value::Null, Some("/pricing")).unwrap();
//! let button = Element::new("button").with_attribute(TRACKING_MARKER_ATTRIBUTE, "signup");
//! target.dispatch_event(&Event::pointer("click", button));
//!
//! assert_eq!(transport.len(), 2);
//! tracker.shutdown();
//! ```

pub mod agent;
pub mod collector;
pub mod config;
pub mod replay;
pub mod report;
pub mod transparency;
pub mod transport;

// Re-export key types at crate root for convenience
pub use agent::{install, Tracker, TrackerError, HASH_TARGET_KEY, HISTORY_TARGET_KEY};
pub use collector::{
    forward_panics, notify_navigation, Element, Event, EventTarget, History, HistoryError,
    MemoryHistory, NavigationKind, Rejection, TrackedHistory, TRACKING_MARKER_ATTRIBUTE,
};
pub use config::{Config, ConfigError, TrackerOptions, TrackerState};
pub use replay::{HostSignal, Replayer};
pub use report::{Envelope, ReportRecord};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};
pub use transport::{Beacon, BeaconConfig, MemoryTransport, Transport, TransportError};

// Beacon re-exports (when enabled)
#[cfg(feature = "beacon")]
pub use transport::BeaconTransport;

/// Agent version, sent as `sdkVersion`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
