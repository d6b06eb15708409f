//! Delivery transparency log.
//!
//! Counts what the agent captured and what it handed to the transport, so
//! silently dropped telemetry is at least visible to the host.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Delivery statistics for one agent.
#[derive(Debug)]
pub struct TransparencyLog {
    /// Signals turned into report records
    signals_captured: AtomicU64,
    /// Envelopes accepted by the transport
    beacons_queued: AtomicU64,
    /// Envelopes refused by the transport or not serializable
    beacons_dropped: AtomicU64,
    /// When the agent was installed
    session_start: DateTime<Utc>,
}

impl TransparencyLog {
    pub fn new() -> Self {
        Self {
            signals_captured: AtomicU64::new(0),
            beacons_queued: AtomicU64::new(0),
            beacons_dropped: AtomicU64::new(0),
            session_start: Utc::now(),
        }
    }

    pub fn record_signal_captured(&self) {
        self.signals_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_beacon_queued(&self) {
        self.beacons_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_beacon_dropped(&self) {
        self.beacons_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            signals_captured: self.signals_captured.load(Ordering::Relaxed),
            beacons_queued: self.beacons_queued.load(Ordering::Relaxed),
            beacons_dropped: self.beacons_dropped.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Delivery Statistics:\n\
             - Signals captured: {}\n\
             - Beacons queued: {}\n\
             - Beacons dropped: {}\n\
             - Session duration: {} seconds\n\
             \n\
             Delivery is best-effort: queued beacons are not acknowledged.",
            stats.signals_captured,
            stats.beacons_queued,
            stats.beacons_dropped,
            stats.session_duration_secs
        )
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of delivery statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub signals_captured: u64,
    pub beacons_queued: u64,
    pub beacons_dropped: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

/// Create a new shared transparency log.
pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}
