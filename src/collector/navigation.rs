//! Navigation signal synthesis.
//!
//! Traversal (back/forward) emits `popstate` natively, but programmatic
//! `pushState`/`replaceState` emit nothing. [`TrackedHistory`] decorates a
//! host history so those calls also fire a notification named after the
//! primitive on the global event target.

use crate::collector::target::EventTarget;
use crate::collector::types::Event;
use serde_json::Value;
use std::ops::{Deref, DerefMut};

/// Programmatic navigation primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationKind {
    PushState,
    ReplaceState,
}

impl NavigationKind {
    /// Name of the synthesized signal.
    pub fn event_name(self) -> &'static str {
        match self {
            NavigationKind::PushState => "pushState",
            NavigationKind::ReplaceState => "replaceState",
        }
    }
}

/// Fire the notification for a programmatic navigation.
///
/// Hosts that have no history object to wrap call this after each
/// programmatic navigation.
pub fn notify_navigation(target: &EventTarget, kind: NavigationKind) {
    target.dispatch_event(&Event::new(kind.event_name()));
}

/// Navigation errors raised by a history implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    /// The new URL is not same-origin with the current one.
    CrossOrigin(String),
    /// The URL could not be resolved.
    InvalidUrl(String),
}

impl std::fmt::Display for HistoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HistoryError::CrossOrigin(url) => {
                write!(f, "Cannot navigate to cross-origin URL: {url}")
            }
            HistoryError::InvalidUrl(url) => write!(f, "Invalid URL: {url}"),
        }
    }
}

impl std::error::Error for HistoryError {}

/// A host's programmatic navigation API.
pub trait History {
    fn push_state(&mut self, state: Value, url: Option<&str>) -> Result<(), HistoryError>;
    fn replace_state(&mut self, state: Value, url: Option<&str>) -> Result<(), HistoryError>;
}

/// Decorator that makes programmatic navigation observable.
///
/// Calls pass through to the wrapped history unchanged; a successful call
/// is followed by a `pushState`/`replaceState` signal. Other methods of the
/// wrapped history are reachable through `Deref`.
pub struct TrackedHistory<H> {
    inner: H,
    target: EventTarget,
}

impl<H: History> TrackedHistory<H> {
    pub fn new(inner: H, target: EventTarget) -> Self {
        Self { inner, target }
    }

    pub fn into_inner(self) -> H {
        self.inner
    }
}

impl<H: History> History for TrackedHistory<H> {
    fn push_state(&mut self, state: Value, url: Option<&str>) -> Result<(), HistoryError> {
        self.inner.push_state(state, url)?;
        notify_navigation(&self.target, NavigationKind::PushState);
        Ok(())
    }

    fn replace_state(&mut self, state: Value, url: Option<&str>) -> Result<(), HistoryError> {
        self.inner.replace_state(state, url)?;
        notify_navigation(&self.target, NavigationKind::ReplaceState);
        Ok(())
    }
}

impl<H> Deref for TrackedHistory<H> {
    type Target = H;

    fn deref(&self) -> &H {
        &self.inner
    }
}

impl<H> DerefMut for TrackedHistory<H> {
    fn deref_mut(&mut self) -> &mut H {
        &mut self.inner
    }
}

/// One session history entry.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub url: String,
    pub state: Value,
}

/// In-memory session history for hosts without a native one.
///
/// Traversal fires `popstate`, and `hashchange` when the fragment changes,
/// on the supplied event target. Programmatic navigation fires nothing.
#[derive(Debug)]
pub struct MemoryHistory {
    entries: Vec<HistoryEntry>,
    index: usize,
    target: EventTarget,
}

impl MemoryHistory {
    pub fn new(target: EventTarget, initial_url: impl Into<String>) -> Self {
        Self {
            entries: vec![HistoryEntry {
                url: initial_url.into(),
                state: Value::Null,
            }],
            index: 0,
            target,
        }
    }

    pub fn current(&self) -> &HistoryEntry {
        &self.entries[self.index]
    }

    pub fn url(&self) -> &str {
        &self.current().url
    }

    pub fn state(&self) -> &Value {
        &self.current().state
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn back(&mut self) -> bool {
        self.go(-1)
    }

    pub fn forward(&mut self) -> bool {
        self.go(1)
    }

    /// Move `delta` entries through the session history.
    ///
    /// Returns false, firing nothing, when the move would leave the history.
    pub fn go(&mut self, delta: isize) -> bool {
        let Some(next) = self.index.checked_add_signed(delta) else {
            return false;
        };
        if delta == 0 || next >= self.entries.len() {
            return false;
        }

        let previous = fragment(&self.entries[self.index].url).map(str::to_string);
        self.index = next;
        self.target.dispatch_event(&Event::new("popstate"));
        if fragment(&self.entries[self.index].url) != previous.as_deref() {
            self.target.dispatch_event(&Event::new("hashchange"));
        }
        true
    }

    /// Navigate to a fragment of the current document.
    pub fn set_hash(&mut self, hash: &str) {
        let hash = hash.trim_start_matches('#');
        if fragment(self.url()) == Some(hash) {
            return;
        }
        let url = format!("{}#{}", strip_fragment(self.url()), hash);
        self.push_entry(Value::Null, url);
        self.target.dispatch_event(&Event::new("popstate"));
        self.target.dispatch_event(&Event::new("hashchange"));
    }

    fn push_entry(&mut self, state: Value, url: String) {
        self.entries.truncate(self.index + 1);
        self.entries.push(HistoryEntry { url, state });
        self.index = self.entries.len() - 1;
    }

    fn resolve(&self, url: Option<&str>) -> Result<String, HistoryError> {
        let current = self.url();
        let Some(url) = url else {
            return Ok(current.to_string());
        };
        let current_origin =
            origin(current).ok_or_else(|| HistoryError::InvalidUrl(current.to_string()))?;

        let absolute = if url.starts_with("//") {
            let scheme_len = current_origin.find("://").map_or(0, |end| end + 1);
            Some(format!("{}{url}", &current_origin[..scheme_len]))
        } else if has_scheme(url) {
            Some(url.to_string())
        } else {
            None
        };
        if let Some(absolute) = absolute {
            return match origin(&absolute) {
                Some(other) if other == current_origin => Ok(absolute),
                Some(_) => Err(HistoryError::CrossOrigin(url.to_string())),
                None => Err(HistoryError::InvalidUrl(url.to_string())),
            };
        }

        let resolved = if url.starts_with('/') {
            format!("{current_origin}{url}")
        } else if url.starts_with('#') {
            format!("{}{url}", strip_fragment(current))
        } else if url.starts_with('?') {
            let base = strip_fragment(current);
            let base = base.split('?').next().unwrap_or(base);
            format!("{base}{url}")
        } else {
            let base = strip_fragment(current);
            let base = base.split('?').next().unwrap_or(base);
            let path_start = current_origin.len();
            match base[path_start..].rfind('/') {
                Some(slash) => format!("{}{url}", &base[..path_start + slash + 1]),
                None => format!("{current_origin}/{url}"),
            }
        };
        Ok(resolved)
    }
}

impl History for MemoryHistory {
    fn push_state(&mut self, state: Value, url: Option<&str>) -> Result<(), HistoryError> {
        let url = self.resolve(url)?;
        self.push_entry(state, url);
        Ok(())
    }

    fn replace_state(&mut self, state: Value, url: Option<&str>) -> Result<(), HistoryError> {
        let url = self.resolve(url)?;
        self.entries[self.index] = HistoryEntry { url, state };
        Ok(())
    }
}

/// Whether `url` starts with `scheme://`, where the scheme is a letter
/// followed by letters, digits, `+`, `-` or `.`.
fn has_scheme(url: &str) -> bool {
    let Some(scheme_end) = url.find("://") else {
        return false;
    };
    let mut scheme = url[..scheme_end].chars();
    scheme.next().is_some_and(|c| c.is_ascii_alphabetic())
        && scheme.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// `scheme://authority` of an absolute URL.
fn origin(url: &str) -> Option<&str> {
    if !has_scheme(url) {
        return None;
    }
    let scheme_end = url.find("://")?;
    let rest = &url[scheme_end + 3..];
    let authority_len = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    if authority_len == 0 {
        return None;
    }
    Some(&url[..scheme_end + 3 + authority_len])
}

fn fragment(url: &str) -> Option<&str> {
    url.split_once('#').map(|(_, hash)| hash)
}

fn strip_fragment(url: &str) -> &str {
    url.split_once('#').map_or(url, |(base, _)| base)
}
