use std::{collections::HashMap, sync::Mutex, time::SystemTime};

/// Point-in-time snapshot of association counters
#[derive(Debug, Clone, PartialEq)]
pub struct TransportStats {
    /// When the snapshot was taken
    pub timestamp: SystemTime,
    /// Record type, always `"sctpTransport"`
    pub kind: &'static str,
    /// Record identifier, always `"sctpTransport"`
    pub id: &'static str,
    /// Total user payload bytes sent over the association
    pub bytes_sent: u64,
    /// Total user payload bytes received over the association
    pub bytes_received: u64,
    /// Smoothed round-trip time estimate, in seconds
    pub smoothed_rtt: f64,
    /// Current congestion window, in bytes
    pub congestion_window: u32,
    /// Peer's advertised receive window, in bytes
    pub receiver_window: u32,
    /// Current path MTU
    pub mtu: u32,
}

impl TransportStats {
    pub(crate) fn new() -> Self {
        Self {
            timestamp: SystemTime::now(),
            kind: "sctpTransport",
            id: "sctpTransport",
            bytes_sent: 0,
            bytes_received: 0,
            smoothed_rtt: 0.0,
            congestion_window: 0,
            receiver_window: 0,
            mtu: 0,
        }
    }
}

/// Sink for stats records, keyed by record identifier
///
/// Report formatting lives in the surrounding system; this only gathers the
/// records produced by [`collect_stats`](crate::SctpTransport::collect_stats).
#[derive(Debug, Default)]
pub struct StatsCollector {
    reports: Mutex<HashMap<&'static str, TransportStats>>,
}

impl StatsCollector {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a snapshot, replacing any earlier one with the same id
    pub fn collect(&self, stats: TransportStats) {
        self.reports.lock().unwrap().insert(stats.id, stats);
    }

    /// The latest snapshot recorded under `id`
    pub fn get(&self, id: &str) -> Option<TransportStats> {
        self.reports.lock().unwrap().get(id).cloned()
    }

    /// All recorded snapshots
    pub fn reports(&self) -> HashMap<&'static str, TransportStats> {
        self.reports.lock().unwrap().clone()
    }
}
