//! The tracker agent: installation and public operations.
//!
//! Construction validates the options, then wires one subscription group per
//! enabled flag in a fixed order (history, hash, DOM, failures). Flags are
//! never consulted again; they only decide which subscriptions exist.

use crate::collector::capture::{
    capture_events, observe_failures, report_tagged_interactions, RecordSink,
};
use crate::collector::navigation::{History, TrackedHistory};
use crate::collector::target::{EventTarget, ListenerId};
use crate::collector::types::{HASH_EVENTS, HISTORY_EVENTS};
use crate::config::{ConfigError, TrackerOptions, TrackerState};
use crate::report::{Dispatcher, ReportRecord};
use crate::transparency::{create_shared_log, SharedTransparencyLog, TransparencyStats};
use crate::transport::Transport;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, MutexGuard};

/// Target key for history page views.
pub const HISTORY_TARGET_KEY: &str = "history-pv";

/// Target key for hash page views.
pub const HASH_TARGET_KEY: &str = "hash-pv";

/// Tracker error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    Config(ConfigError),
}

impl std::fmt::Display for TrackerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackerError::Config(e) => write!(f, "Tracker configuration error: {e}"),
        }
    }
}

impl std::error::Error for TrackerError {}

impl From<ConfigError> for TrackerError {
    fn from(e: ConfigError) -> Self {
        TrackerError::Config(e)
    }
}

/// State shared between the agent and its signal handlers.
struct Shared {
    state: Mutex<TrackerState>,
    dispatcher: Dispatcher,
    log: SharedTransparencyLog,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The state lock is released before the record is serialized or sent,
    /// so a panic forwarded from either step can report through here again.
    fn dispatch<R: Serialize + ?Sized>(&self, record: &R) -> bool {
        let state = self.state().clone();
        self.dispatcher.report(&state, record)
    }
}

impl RecordSink for Shared {
    fn report(&self, record: ReportRecord) {
        self.log.record_signal_captured();
        self.dispatch(&record);
    }
}

/// An installed telemetry agent.
pub struct Tracker {
    shared: Arc<Shared>,
    target: EventTarget,
    listeners: Mutex<Vec<ListenerId>>,
}

impl Tracker {
    /// Validate `options` and install capture subscriptions on `target`.
    ///
    /// Hosts whose navigation API should be observed use [`install`], which
    /// wraps the history before the subscriptions exist.
    pub fn new(
        options: TrackerOptions,
        target: &EventTarget,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, TrackerError> {
        let state = TrackerState::from_options(options)?;
        let log = create_shared_log();

        let tracker = Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                dispatcher: Dispatcher::new(transport, log.clone()),
                log,
            }),
            target: target.clone(),
            listeners: Mutex::new(Vec::new()),
        };
        tracker.install();
        Ok(tracker)
    }

    fn install(&self) {
        let state = self.shared.state().clone();
        let target = &self.target;
        let mut listeners = Vec::new();

        if state.history_tracker {
            listeners.extend(capture_events(
                target,
                self.shared.clone(),
                &HISTORY_EVENTS,
                HISTORY_TARGET_KEY,
                None,
            ));
        }

        if state.hash_tracker {
            listeners.extend(capture_events(
                target,
                self.shared.clone(),
                &HASH_EVENTS,
                HASH_TARGET_KEY,
                None,
            ));
        }

        if state.dom_tracker {
            listeners.extend(report_tagged_interactions(target, self.shared.clone()));
        }

        if state.js_error {
            listeners.extend(observe_failures(target, self.shared.clone()));
        }

        tracing::info!(
            url = %state.request_url,
            history = state.history_tracker,
            hash = state.hash_tracker,
            dom = state.dom_tracker,
            js_error = state.js_error,
            subscriptions = listeners.len(),
            "Tracker installed"
        );
        *self.listeners() = listeners;
    }

    /// Dispatch a caller-built payload immediately.
    ///
    /// Object payloads contribute their keys to the envelope; anything else
    /// is sent under `data`. Returns whether the transport accepted it.
    pub fn send_tracker<T: Serialize + ?Sized>(&self, data: &T) -> bool {
        self.shared.dispatch(data)
    }

    /// Set the identifier sent with every later envelope.
    pub fn set_user_id(&self, uuid: impl Into<String>) {
        self.shared.state().set_uuid(uuid.into());
    }

    /// Set the context sent with every later envelope.
    pub fn set_extras(&self, extra: Map<String, Value>) {
        self.shared.state().set_extra(extra);
    }

    /// Remove every subscription this agent installed.
    ///
    /// Returns how many were removed. `send_tracker` keeps working.
    pub fn shutdown(&self) -> usize {
        let listeners = std::mem::take(&mut *self.listeners());
        let removed = listeners
            .into_iter()
            .filter(|id| self.target.remove_event_listener(*id))
            .count();
        tracing::info!(removed, "Tracker shut down");
        removed
    }

    /// Snapshot of the current configuration state.
    pub fn options(&self) -> TrackerState {
        self.shared.state().clone()
    }

    pub fn stats(&self) -> TransparencyStats {
        self.shared.log.stats()
    }

    /// Human-readable delivery statistics.
    pub fn summary(&self) -> String {
        self.shared.log.summary()
    }

    /// Number of live signal subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.listeners().len()
    }

    fn listeners(&self) -> MutexGuard<'_, Vec<ListenerId>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("state", &*self.shared.state())
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

/// Wrap `history` so programmatic navigation is observable, then install a
/// tracker on `target`.
pub fn install<H: History>(
    options: TrackerOptions,
    target: &EventTarget,
    transport: Arc<dyn Transport>,
    history: H,
) -> Result<(Tracker, TrackedHistory<H>), TrackerError> {
    let history = TrackedHistory::new(history, target.clone());
    let tracker = Tracker::new(options, target, transport)?;
    Ok((tracker, history))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::{Element, Event, TRACKING_MARKER_ATTRIBUTE};
    use crate::transport::MemoryTransport;
    use serde_json::json;

    fn tracker(options: TrackerOptions) -> (Tracker, EventTarget, Arc<MemoryTransport>) {
        let target = EventTarget::new();
        let transport = Arc::new(MemoryTransport::new());
        let tracker = Tracker::new(options, &target, transport.clone()).unwrap();
        (tracker, target, transport)
    }

    #[test]
    fn test_subscriptions_follow_flags() {
        let (none, _, _) = tracker(TrackerOptions::new("https://x.test"));
        assert_eq!(none.subscription_count(), 0);

        let (history, target, _) =
            tracker(TrackerOptions::new("https://x.test").history_tracker(true));
        assert_eq!(history.subscription_count(), 3);
        assert_eq!(target.listener_count("popstate"), 1);
        assert_eq!(target.listener_count("hashchange"), 0);

        let (all, _, _) = tracker(
            TrackerOptions::new("https://x.test")
                .history_tracker(true)
                .hash_tracker(true)
                .dom_tracker(true)
                .js_error(true),
        );
        assert_eq!(all.subscription_count(), 3 + 1 + 8 + 2);
    }

    #[test]
    fn test_missing_request_url_is_rejected() {
        let err = Tracker::new(
            TrackerOptions::default().js_error(true),
            &EventTarget::new(),
            Arc::new(MemoryTransport::new()),
        )
        .unwrap_err();
        assert_eq!(err, TrackerError::Config(ConfigError::MissingRequestUrl));
    }

    #[test]
    fn test_captured_signal_is_counted() {
        let (tracker, target, transport) =
            tracker(TrackerOptions::new("https://x.test").dom_tracker(true));
        let button = Element::new("button").with_attribute(TRACKING_MARKER_ATTRIBUTE, "cta");

        target.dispatch_event(&Event::pointer("mouseover", button));

        let stats = tracker.stats();
        assert_eq!(stats.signals_captured, 1);
        assert_eq!(stats.beacons_queued, 1);
        assert_eq!(transport.envelopes()[0]["event"], "mouseover");
    }

    #[test]
    fn test_send_tracker_is_not_a_capture() {
        let (tracker, _, transport) = tracker(TrackerOptions::new("https://x.test"));
        assert!(tracker.send_tracker(&json!({"foo": 1})));

        assert_eq!(tracker.stats().signals_captured, 0);
        assert_eq!(transport.envelopes()[0]["foo"], 1);
    }

    #[test]
    fn test_shutdown_removes_subscriptions() {
        let (tracker, target, transport) =
            tracker(TrackerOptions::new("https://x.test").hash_tracker(true).js_error(true));
        assert_eq!(tracker.shutdown(), 3);
        assert_eq!(tracker.subscription_count(), 0);
        assert_eq!(tracker.shutdown(), 0);

        target.dispatch_event(&Event::new("hashchange"));
        target.dispatch_event(&Event::error("late"));
        assert!(transport.is_empty());
    }
}
