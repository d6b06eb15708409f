//! Fire-and-forget delivery of serialized envelopes.
//!
//! [`Transport::send_beacon`] must return immediately: it either queues the
//! beacon for independent delivery or refuses it. Nothing is awaited,
//! acknowledged or retried.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Content type attached to every beacon body.
pub const CONTENT_TYPE: &str = "application/json";

/// One queued delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Beacon {
    pub url: String,
    pub content_type: String,
    pub body: String,
}

impl Beacon {
    pub fn json(url: impl Into<String>, body: String) -> Self {
        Self {
            url: url.into(),
            content_type: CONTENT_TYPE.to_string(),
            body,
        }
    }
}

/// A non-blocking send primitive.
pub trait Transport: Send + Sync {
    /// Queue `beacon` for delivery. Returns false if it was refused.
    fn send_beacon(&self, beacon: Beacon) -> bool;
}

/// Beacon delivery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BeaconConfig {
    /// Beacons waiting for the worker before new ones are refused
    pub queue_capacity: usize,
    /// Largest accepted body, in bytes
    pub max_payload_bytes: usize,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            max_payload_bytes: 64 * 1024,
            timeout_ms: 10_000,
        }
    }
}

/// Transport error types.
#[derive(Debug)]
pub enum TransportError {
    /// HTTP client could not be built
    Client(String),
    /// Async runtime could not be built
    Runtime(String),
    /// Delivery worker could not be started
    Worker(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Client(msg) => write!(f, "Beacon client error: {msg}"),
            TransportError::Runtime(msg) => write!(f, "Beacon runtime error: {msg}"),
            TransportError::Worker(msg) => write!(f, "Beacon worker error: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Transport that keeps beacons in memory instead of sending them.
///
/// Useful for tests and for hosts that forward telemetry themselves.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    beacons: Mutex<Vec<Beacon>>,
    max_payload_bytes: Option<usize>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse bodies larger than `limit` bytes, like a real beacon would.
    pub fn with_payload_limit(limit: usize) -> Self {
        Self {
            beacons: Mutex::new(Vec::new()),
            max_payload_bytes: Some(limit),
        }
    }

    pub fn beacons(&self) -> Vec<Beacon> {
        self.lock().clone()
    }

    /// Bodies of every accepted beacon, parsed back into JSON.
    pub fn envelopes(&self) -> Vec<serde_json::Value> {
        self.lock()
            .iter()
            .filter_map(|beacon| serde_json::from_str(&beacon.body).ok())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Beacon>> {
        self.beacons
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Transport for MemoryTransport {
    fn send_beacon(&self, beacon: Beacon) -> bool {
        if let Some(limit) = self.max_payload_bytes {
            if beacon.body.len() > limit {
                return false;
            }
        }
        self.lock().push(beacon);
        true
    }
}

#[cfg(feature = "beacon")]
pub use http::BeaconTransport;

#[cfg(feature = "beacon")]
mod http {
    use super::{Beacon, BeaconConfig, Transport, TransportError};
    use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
    use std::sync::Mutex;
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    /// HTTP beacon transport.
    ///
    /// `send_beacon` only enqueues; a dedicated worker thread drives a
    /// current-thread tokio runtime and POSTs beacons in submission order.
    pub struct BeaconTransport {
        config: BeaconConfig,
        sender: Mutex<Option<Sender<Beacon>>>,
        worker: Mutex<Option<JoinHandle<()>>>,
    }

    impl BeaconTransport {
        /// Build the HTTP client and start the delivery worker.
        pub fn spawn(config: BeaconConfig) -> Result<Self, TransportError> {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_millis(config.timeout_ms))
                .build()
                .map_err(|e| TransportError::Client(e.to_string()))?;

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| TransportError::Runtime(format!("Failed to create runtime: {e}")))?;

            // Bounded so a stalled endpoint cannot grow memory without limit
            let (sender, receiver) = bounded(config.queue_capacity.max(1));

            let worker = thread::Builder::new()
                .name("beacon-worker".to_string())
                .spawn(move || deliver_all(runtime, client, receiver))
                .map_err(|e| TransportError::Worker(e.to_string()))?;

            Ok(Self {
                config,
                sender: Mutex::new(Some(sender)),
                worker: Mutex::new(Some(worker)),
            })
        }

        pub fn config(&self) -> &BeaconConfig {
            &self.config
        }

        /// Stop accepting beacons and wait until the queue is drained.
        pub fn shutdown(&self) {
            self.sender
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take();
            let worker = self
                .worker
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take();
            if let Some(handle) = worker {
                if handle.join().is_err() {
                    tracing::warn!("Beacon worker panicked during shutdown");
                }
            }
        }
    }

    impl Transport for BeaconTransport {
        fn send_beacon(&self, beacon: Beacon) -> bool {
            if beacon.body.len() > self.config.max_payload_bytes {
                tracing::warn!(
                    bytes = beacon.body.len(),
                    limit = self.config.max_payload_bytes,
                    "Beacon exceeds payload limit; refused"
                );
                return false;
            }

            let sender = self
                .sender
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let Some(sender) = sender.as_ref() else {
                return false;
            };

            match sender.try_send(beacon) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!("Beacon queue full; refused");
                    false
                }
                Err(TrySendError::Disconnected(_)) => false,
            }
        }
    }

    fn deliver_all(
        runtime: tokio::runtime::Runtime,
        client: reqwest::Client,
        receiver: Receiver<Beacon>,
    ) {
        // Ends once every sender is gone and the queue is empty
        for beacon in receiver.iter() {
            runtime.block_on(deliver(&client, beacon));
        }
    }

    async fn deliver(client: &reqwest::Client, beacon: Beacon) {
        let result = client
            .post(&beacon.url)
            .header("Content-Type", beacon.content_type)
            .body(beacon.body)
            .send()
            .await;

        match result {
            Ok(response) => {
                tracing::debug!(url = %beacon.url, status = %response.status(), "Beacon delivered")
            }
            Err(e) => tracing::debug!(url = %beacon.url, "Beacon delivery failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_transport_records_beacons() {
        let transport = MemoryTransport::new();
        assert!(transport.send_beacon(Beacon::json("https://x.test", r#"{"a":1}"#.to_string())));

        let beacons = transport.beacons();
        assert_eq!(beacons.len(), 1);
        assert_eq!(beacons[0].content_type, CONTENT_TYPE);
        assert_eq!(transport.envelopes()[0]["a"], 1);
    }

    #[test]
    fn test_memory_transport_payload_limit() {
        let transport = MemoryTransport::with_payload_limit(4);
        assert!(!transport.send_beacon(Beacon::json("https://x.test", "12345".to_string())));
        assert!(transport.send_beacon(Beacon::json("https://x.test", "1234".to_string())));
        assert_eq!(transport.len(), 1);
    }

    #[test]
    fn test_beacon_config_defaults() {
        let config = BeaconConfig::default();
        assert_eq!(config.max_payload_bytes, 65_536);
        assert!(config.queue_capacity > 0);
    }

    #[cfg(feature = "beacon")]
    #[test]
    fn test_beacon_transport_refuses_oversize_and_after_shutdown() {
        let transport = BeaconTransport::spawn(BeaconConfig {
            max_payload_bytes: 8,
            ..BeaconConfig::default()
        })
        .unwrap();

        let oversize = Beacon::json("http://127.0.0.1:9/", "0123456789".to_string());
        assert!(!transport.send_beacon(oversize));

        transport.shutdown();
        assert!(!transport.send_beacon(Beacon::json("http://127.0.0.1:9/", "{}".to_string())));
    }
}
