//! Capture handlers: turn fired signals into report records.
//!
//! Every function here subscribes on an [`EventTarget`] and returns the ids
//! of the handlers it registered, so the owner can remove them later.

use crate::collector::target::{EventTarget, ListenerId};
use crate::collector::types::{
    Event, EventKind, ERROR_EVENT, POINTER_EVENTS, REJECTION_EVENT,
};
use crate::report::ReportRecord;
use serde_json::Value;
use std::cell::Cell;
use std::sync::{Arc, Mutex, MutexGuard, Once};

/// Target key shared by failure reports.
pub const FAILURE_TARGET_KEY: &str = "message";

/// Receiver of captured records.
pub trait RecordSink: Send + Sync + 'static {
    fn report(&self, record: ReportRecord);
}

/// Report every firing of each signal in `names` under one target key.
pub fn capture_events<S: RecordSink>(
    target: &EventTarget,
    sink: Arc<S>,
    names: &[&str],
    target_key: &str,
    data: Option<Value>,
) -> Vec<ListenerId> {
    names
        .iter()
        .map(|name| {
            let sink = sink.clone();
            let target_key = target_key.to_string();
            let data = data.clone();
            target.add_event_listener(name, move |event: &Event| {
                sink.report(
                    ReportRecord::new(event.name(), target_key.clone()).with_data(data.clone()),
                );
            })
        })
        .collect()
}

/// Report pointer interactions whose origin element carries a tracking
/// marker. Unmarked elements are ignored.
pub fn report_tagged_interactions<S: RecordSink>(
    target: &EventTarget,
    sink: Arc<S>,
) -> Vec<ListenerId> {
    POINTER_EVENTS
        .iter()
        .map(|name| {
            let sink = sink.clone();
            target.add_event_listener(name, move |event: &Event| {
                let Some(marker) = event.target().and_then(|element| element.tracking_marker())
                else {
                    return;
                };
                sink.report(ReportRecord::new(event.name(), marker));
            })
        })
        .collect()
}

/// Report uncaught errors and unhandled rejections.
pub fn observe_failures<S: RecordSink>(target: &EventTarget, sink: Arc<S>) -> Vec<ListenerId> {
    let error_sink = sink.clone();
    let error = target.add_event_listener(ERROR_EVENT, move |event: &Event| {
        if let EventKind::Error { message } = event.kind() {
            error_sink.report(
                ReportRecord::new("error", FAILURE_TARGET_KEY).with_message(message.clone()),
            );
        }
    });

    let rejection = target.add_event_listener(REJECTION_EVENT, move |event: &Event| {
        if let EventKind::Rejection(rejection) = event.kind() {
            let message = rejection.catch(rejection_message);
            sink.report(ReportRecord::new("promise", FAILURE_TARGET_KEY).with_message(message));
        }
    });

    vec![error, rejection]
}

/// Human-readable text for a rejection reason.
///
/// Strings are used verbatim, error-like objects contribute their
/// `message`, anything else is rendered as JSON.
pub fn rejection_message(reason: &Value) -> String {
    match reason {
        Value::String(text) => text.clone(),
        Value::Object(map) => match map.get("message") {
            Some(Value::String(message)) => message.clone(),
            _ => reason.to_string(),
        },
        other => other.to_string(),
    }
}

thread_local! {
    static FORWARDING_PANIC: Cell<bool> = const { Cell::new(false) };
}

static PANIC_HOOK: Once = Once::new();
static PANIC_TARGETS: Mutex<Vec<EventTarget>> = Mutex::new(Vec::new());

fn panic_targets() -> MutexGuard<'static, Vec<EventTarget>> {
    PANIC_TARGETS
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Forward panics to `target` as `error` signals.
///
/// The process panic hook is replaced once; later calls only register
/// further targets, and registering the same target again is a no-op, so
/// each panic is reported at most once per target. The previously
/// installed hook still runs first. Handlers for `error` must not panic
/// themselves: a panic inside a panic hook aborts.
pub fn forward_panics(target: EventTarget) {
    {
        let mut targets = panic_targets();
        if targets.iter().any(|known| known.same_target(&target)) {
            return;
        }
        targets.push(target);
    }

    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            previous(info);

            if FORWARDING_PANIC.with(|flag| flag.replace(true)) {
                return;
            }
            let payload = info.payload();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic".to_string());

            // Handlers may register targets, so dispatch outside the lock.
            let targets = panic_targets().clone();
            for target in targets {
                target.dispatch_event(&Event::error(message.clone()));
            }
            FORWARDING_PANIC.with(|flag| flag.set(false));
        }));
    });
}
