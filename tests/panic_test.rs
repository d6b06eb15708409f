//! Panics forwarded as uncaught errors.
//!
//! Kept in its own test binary because it replaces the process panic hook.
//! Every registered target sees every panic, so each test only looks at the
//! messages it caused.

use serde::{Serialize, Serializer};
use serde_json::{json, Value};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use synheart_tracker::{forward_panics, EventTarget, MemoryTransport, Tracker, TrackerOptions};

fn failure_tracker() -> (Tracker, EventTarget, Arc<MemoryTransport>) {
    let target = EventTarget::new();
    let transport = Arc::new(MemoryTransport::new());
    let tracker = Tracker::new(
        TrackerOptions::new("https://x.test").js_error(true),
        &target,
        transport.clone(),
    )
    .unwrap();
    (tracker, target, transport)
}

fn errors_with(transport: &MemoryTransport, messages: &[&str]) -> Vec<Value> {
    transport
        .envelopes()
        .into_iter()
        .filter(|e| {
            e["message"]
                .as_str()
                .is_some_and(|message| messages.contains(&message))
        })
        .collect()
}

struct Exploding;

impl Serialize for Exploding {
    fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
        panic!("serializer exploded");
    }
}

#[test]
fn test_panics_are_reported_as_errors() {
    let (_tracker, target, transport) = failure_tracker();

    forward_panics(target.clone());
    forward_panics(target.clone());

    let literal = catch_unwind(|| panic!("disk full"));
    assert!(literal.is_err());
    let formatted = catch_unwind(|| panic!("quota {} exceeded", 3));
    assert!(formatted.is_err());

    let envelopes = errors_with(&transport, &["disk full", "quota 3 exceeded"]);
    assert_eq!(envelopes.len(), 2);
    assert_eq!(envelopes[0]["event"], "error");
    assert_eq!(envelopes[0]["targetKey"], "message");
    assert_eq!(envelopes[0]["message"], "disk full");
    assert_eq!(envelopes[1]["message"], "quota 3 exceeded");
}

#[test]
fn test_panicking_payload_is_reported_and_tracker_stays_usable() {
    let (tracker, target, transport) = failure_tracker();
    forward_panics(target);

    let result = catch_unwind(AssertUnwindSafe(|| tracker.send_tracker(&Exploding)));
    assert!(result.is_err());

    let envelopes = errors_with(&transport, &["serializer exploded"]);
    assert_eq!(envelopes.len(), 1);
    assert_eq!(envelopes[0]["event"], "error");
    assert_eq!(envelopes[0]["requestUrl"], "https://x.test");

    tracker.set_user_id("after-panic");
    assert!(tracker.send_tracker(&json!({"step": "next"})));
    let later = transport
        .envelopes()
        .into_iter()
        .find(|e| e["step"] == "next")
        .unwrap();
    assert_eq!(later["uuid"], "after-panic");
}
