//! Scripted host signals.
//!
//! A replay script is JSON lines, one [`HostSignal`] per line, e.g.
//!
//! ```text
//! {"type": "pushState", "url": "/checkout"}
//! {"type": "pointer", "event": "click", "element": {"tag": "button", "attributes": {"target-key": "buy"}}}
//! {"type": "error", "message": "boom"}
//! ```
//!
//! [`Replayer`] drives an in-memory host (event target plus session history)
//! with a tracker installed, which is how the CLI exercises the pipeline.

use crate::agent::{install, Tracker, TrackerError};
use crate::collector::navigation::{History, HistoryError, MemoryHistory, TrackedHistory};
use crate::collector::target::EventTarget;
use crate::collector::types::{Element, Event, Rejection};
use crate::config::TrackerOptions;
use crate::transport::Transport;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::BufRead;
use std::sync::Arc;

/// One scripted action of the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostSignal {
    PushState {
        #[serde(default)]
        state: Value,
        #[serde(default)]
        url: Option<String>,
    },
    ReplaceState {
        #[serde(default)]
        state: Value,
        #[serde(default)]
        url: Option<String>,
    },
    Back,
    Forward,
    Go {
        delta: isize,
    },
    SetHash {
        hash: String,
    },
    Pointer {
        event: String,
        #[serde(default)]
        element: Element,
    },
    Error {
        message: String,
    },
    Rejection {
        reason: Value,
    },
    Track {
        data: Value,
    },
    SetUserId {
        uuid: String,
    },
    SetExtras {
        extra: Map<String, Value>,
    },
}

/// Replay error types.
#[derive(Debug)]
pub enum ReplayError {
    Io(String),
    Parse { line: usize, message: String },
    Navigation(HistoryError),
}

impl std::fmt::Display for ReplayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplayError::Io(e) => write!(f, "IO error: {e}"),
            ReplayError::Parse { line, message } => {
                write!(f, "Parse error on line {line}: {message}")
            }
            ReplayError::Navigation(e) => write!(f, "Navigation error: {e}"),
        }
    }
}

impl std::error::Error for ReplayError {}

impl From<HistoryError> for ReplayError {
    fn from(e: HistoryError) -> Self {
        ReplayError::Navigation(e)
    }
}

/// Read a JSON-lines script. Blank lines and `//` comments are skipped.
pub fn read_script<R: BufRead>(reader: R) -> Result<Vec<HostSignal>, ReplayError> {
    let mut signals = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| ReplayError::Io(e.to_string()))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("//") {
            continue;
        }
        let signal = serde_json::from_str(trimmed).map_err(|e| ReplayError::Parse {
            line: index + 1,
            message: e.to_string(),
        })?;
        signals.push(signal);
    }
    Ok(signals)
}

/// An in-memory host with a tracker installed.
pub struct Replayer {
    target: EventTarget,
    history: TrackedHistory<MemoryHistory>,
    tracker: Tracker,
}

impl Replayer {
    pub fn new(
        options: TrackerOptions,
        transport: Arc<dyn Transport>,
        initial_url: &str,
    ) -> Result<Self, TrackerError> {
        let target = EventTarget::new();
        let history = MemoryHistory::new(target.clone(), initial_url);
        let (tracker, history) = install(options, &target, transport, history)?;
        Ok(Self {
            target,
            history,
            tracker,
        })
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn history(&self) -> &MemoryHistory {
        &self.history
    }

    /// Perform one host action.
    pub fn apply(&mut self, signal: HostSignal) -> Result<(), ReplayError> {
        match signal {
            HostSignal::PushState { state, url } => {
                self.history.push_state(state, url.as_deref())?;
            }
            HostSignal::ReplaceState { state, url } => {
                self.history.replace_state(state, url.as_deref())?;
            }
            HostSignal::Back => {
                self.history.back();
            }
            HostSignal::Forward => {
                self.history.forward();
            }
            HostSignal::Go { delta } => {
                self.history.go(delta);
            }
            HostSignal::SetHash { hash } => self.history.set_hash(&hash),
            HostSignal::Pointer { event, element } => {
                self.target.dispatch_event(&Event::pointer(event, element));
            }
            HostSignal::Error { message } => {
                self.target.dispatch_event(&Event::error(message));
            }
            HostSignal::Rejection { reason } => {
                self.target
                    .dispatch_event(&Event::unhandled_rejection(Rejection::new(reason)));
            }
            HostSignal::Track { data } => {
                self.tracker.send_tracker(&data);
            }
            HostSignal::SetUserId { uuid } => self.tracker.set_user_id(uuid),
            HostSignal::SetExtras { extra } => self.tracker.set_extras(extra),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use serde_json::json;

    #[test]
    fn test_read_script_skips_blank_and_comments() {
        let script = r#"
// open the checkout
{"type": "pushState", "url": "/checkout"}

{"type": "pointer", "event": "click", "element": {"tag": "button", "attributes": {"target-key": "buy"}}}
{"type": "go", "delta": -1}
"#;
        let signals = read_script(script.as_bytes()).unwrap();
        assert_eq!(signals.len(), 3);
        assert_eq!(
            signals[0],
            HostSignal::PushState {
                state: Value::Null,
                url: Some("/checkout".to_string())
            }
        );
        assert_eq!(signals[2], HostSignal::Go { delta: -1 });
    }

    #[test]
    fn test_read_script_reports_line() {
        let err = read_script("{\"type\": \"back\"}\n{\"type\": \"warp\"}".as_bytes()).unwrap_err();
        assert!(matches!(err, ReplayError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_replay_drives_tracker() {
        let transport = Arc::new(MemoryTransport::new());
        let options = TrackerOptions::new("https://x.test")
            .history_tracker(true)
            .hash_tracker(true)
            .dom_tracker(true)
            .js_error(true);
        let mut replayer = Replayer::new(options, transport.clone(), "https://app.test/").unwrap();

        let script = vec![
            HostSignal::SetUserId {
                uuid: "u-9".to_string(),
            },
            HostSignal::PushState {
                state: json!({"step": 1}),
                url: Some("/cart".to_string()),
            },
            HostSignal::SetHash {
                hash: "summary".to_string(),
            },
            HostSignal::Rejection {
                reason: json!("network down"),
            },
            HostSignal::Track {
                data: json!({"plan": "pro"}),
            },
        ];
        for signal in script {
            replayer.apply(signal).unwrap();
        }

        assert_eq!(replayer.history().url(), "https://app.test/cart#summary");

        let envelopes = transport.envelopes();
        let events: Vec<&str> = envelopes
            .iter()
            .filter_map(|e| e["event"].as_str())
            .collect();
        assert_eq!(events, vec!["pushState", "popstate", "hashchange", "promise"]);
        assert_eq!(envelopes[4]["plan"], "pro");
        assert!(envelopes.iter().all(|e| e["uuid"] == "u-9"));
    }

    #[test]
    fn test_cross_origin_navigation_is_an_error() {
        let mut replayer = Replayer::new(
            TrackerOptions::new("https://x.test").history_tracker(true),
            Arc::new(MemoryTransport::new()),
            "https://app.test/",
        )
        .unwrap();

        let err = replayer
            .apply(HostSignal::PushState {
                state: Value::Null,
                url: Some("https://other.test/".to_string()),
            })
            .unwrap_err();
        assert!(matches!(err, ReplayError::Navigation(HistoryError::CrossOrigin(_))));
    }
}
