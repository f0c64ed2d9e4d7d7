//! # Engine Statistics
//!
//! Counter snapshots for both directions of the fragmentation engine,
//! serializable for metrics export.

use serde::Serialize;

// ─── Send Stats ─────────────────────────────────────────────────────────────

/// Aggregate send-side statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SendStats {
    /// Objects handed to the fragmentor.
    pub objects_fragmented: u64,
    /// Fragments appended across both priority buffers.
    pub fragments_queued: u64,
    /// Wire bytes (header + blob) appended across both priority buffers.
    pub bytes_queued: u64,
    /// Fragments handed to the transport, pull or wakeup alike.
    pub fragments_pulled: u64,
    /// Wire bytes handed to the transport.
    pub bytes_pulled: u64,
    /// Wakeups that delivered a fragment to a parked callback.
    pub notifications_fired: u64,
    /// Wakeups swallowed while another was in flight.
    pub notifications_dropped: u64,
}

impl SendStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fragments appended but not yet pulled.
    pub fn fragments_pending(&self) -> u64 {
        self.fragments_queued.saturating_sub(self.fragments_pulled)
    }
}

// ─── Receive Stats ──────────────────────────────────────────────────────────

/// Aggregate receive-side statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReceiveStats {
    /// Raw bytes fed into the reassembly buffer.
    pub bytes_received: u64,
    /// Complete fragments consumed from the raw stream.
    pub fragments_received: u64,
    /// Whole objects delivered to the callback.
    pub objects_delivered: u64,
    /// Off-sequence fragments discarded under reconnect tolerance.
    pub off_sync_discarded: u64,
    /// Fatal framing errors surfaced to the caller.
    pub framing_errors: u64,
}

impl ReceiveStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mean fragments per delivered object.
    pub fn fragments_per_object(&self) -> f64 {
        if self.objects_delivered == 0 {
            0.0
        } else {
            self.fragments_received as f64 / self.objects_delivered as f64
        }
    }

    /// Fold another snapshot into this one (per-priority → aggregate).
    pub fn merge(&mut self, other: &ReceiveStats) {
        self.bytes_received += other.bytes_received;
        self.fragments_received += other.fragments_received;
        self.objects_delivered += other.objects_delivered;
        self.off_sync_discarded += other.off_sync_discarded;
        self.framing_errors += other.framing_errors;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_counts_saturate() {
        let stats = SendStats {
            fragments_queued: 3,
            fragments_pulled: 5,
            ..SendStats::new()
        };
        assert_eq!(stats.fragments_pending(), 0);
    }

    #[test]
    fn fragments_per_object_handles_zero() {
        let stats = ReceiveStats::new();
        assert!((stats.fragments_per_object() - 0.0).abs() < f64::EPSILON);

        let stats = ReceiveStats {
            fragments_received: 6,
            objects_delivered: 2,
            ..ReceiveStats::new()
        };
        assert!((stats.fragments_per_object() - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn merge_sums_fields() {
        let mut a = ReceiveStats {
            bytes_received: 10,
            fragments_received: 1,
            objects_delivered: 1,
            off_sync_discarded: 0,
            framing_errors: 0,
        };
        let b = ReceiveStats {
            bytes_received: 5,
            fragments_received: 2,
            objects_delivered: 0,
            off_sync_discarded: 1,
            framing_errors: 1,
        };
        a.merge(&b);
        assert_eq!(a.bytes_received, 15);
        assert_eq!(a.fragments_received, 3);
        assert_eq!(a.objects_delivered, 1);
        assert_eq!(a.off_sync_discarded, 1);
        assert_eq!(a.framing_errors, 1);
    }

    #[test]
    fn stats_serialize_to_json() {
        let json = serde_json::to_string(&SendStats::new()).unwrap();
        assert!(json.contains("fragments_queued"));
    }
}
