//! Signal types delivered by the host environment.
//!
//! A signal is a named notification (`click`, `popstate`, `error`, ...)
//! optionally carrying details such as the element an interaction happened
//! on or the failure that escaped the host.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Attribute an element carries to opt into interaction reporting.
pub const TRACKING_MARKER_ATTRIBUTE: &str = "target-key";

/// Pointer signals inspected for tracking markers.
pub const POINTER_EVENTS: [&str; 8] = [
    "click",
    "dblclick",
    "contextmenu",
    "mousedown",
    "mouseup",
    "mouseenter",
    "mouseout",
    "mouseover",
];

/// Signals grouped under the history page-view category.
pub const HISTORY_EVENTS: [&str; 3] = ["pushState", "replaceState", "popstate"];

/// Signals grouped under the hash page-view category.
pub const HASH_EVENTS: [&str; 1] = ["hashchange"];

/// Uncaught synchronous failure.
pub const ERROR_EVENT: &str = "error";

/// Unhandled asynchronous rejection.
pub const REJECTION_EVENT: &str = "unhandledrejection";

/// An element in the host's UI tree.
///
/// Only the tag and attributes are modelled; that is all the agent inspects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub tag: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: HashMap::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// The element's tracking marker, if present and non-empty.
    pub fn tracking_marker(&self) -> Option<&str> {
        self.get_attribute(TRACKING_MARKER_ATTRIBUTE)
            .filter(|value| !value.is_empty())
    }
}

/// An asynchronous operation that failed without a failure handler.
///
/// The reason is only reachable through [`Rejection::catch`], which also
/// marks the rejection as handled.
#[derive(Debug, Clone)]
pub struct Rejection {
    reason: Arc<Value>,
    handled: Arc<AtomicBool>,
}

impl Rejection {
    pub fn new(reason: impl Into<Value>) -> Self {
        Self {
            reason: Arc::new(reason.into()),
            handled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Attach a failure handler. The operation has already failed, so the
    /// handler runs immediately with the failure value.
    pub fn catch<F, R>(&self, handler: F) -> R
    where
        F: FnOnce(&Value) -> R,
    {
        self.handled.store(true, Ordering::SeqCst);
        handler(&self.reason)
    }

    pub fn is_handled(&self) -> bool {
        self.handled.load(Ordering::SeqCst)
    }
}

/// Details attached to a signal.
#[derive(Debug, Clone)]
pub enum EventKind {
    /// No payload beyond the name (navigation notifications, hash changes).
    Plain,
    /// Interaction on an origin element.
    Pointer { target: Element },
    /// Uncaught synchronous failure.
    Error { message: String },
    /// Unhandled asynchronous rejection.
    Rejection(Rejection),
}

/// A signal fired on the global event target.
#[derive(Debug, Clone)]
pub struct Event {
    name: String,
    kind: EventKind,
}

impl Event {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EventKind::Plain,
        }
    }

    /// A pointer signal whose origin is `target`.
    pub fn pointer(name: impl Into<String>, target: Element) -> Self {
        Self {
            name: name.into(),
            kind: EventKind::Pointer { target },
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            name: ERROR_EVENT.to_string(),
            kind: EventKind::Error {
                message: message.into(),
            },
        }
    }

    pub fn unhandled_rejection(rejection: Rejection) -> Self {
        Self {
            name: REJECTION_EVENT.to_string(),
            kind: EventKind::Rejection(rejection),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// The most specific element the interaction occurred on.
    pub fn target(&self) -> Option<&Element> {
        match &self.kind {
            EventKind::Pointer { target } => Some(target),
            _ => None,
        }
    }
}
