//! # Receive Demuxer
//!
//! Routes inbound raw bytes by priority class to per-priority reassembly
//! buffers, charges every byte against a session-wide memory meter before
//! dispatch, and converts completed blobs into objects through a
//! [`Deserializer`].
//!
//! The two priority streams reassemble independently: objects never span
//! classes, and there is no cross-priority ordering.

use bytes::Bytes;
use std::sync::Mutex;
use tracing::debug;

use crate::error::{FragmentError, Origin};
use crate::priority::Priority;
use crate::reassembly::{ReassemblyBuffer, ReassemblyConfig};
use crate::stats::ReceiveStats;

// ─── Deserializer Seam ──────────────────────────────────────────────────────

/// Converts a completed defragmented blob into the higher protocol's
/// object type.
pub trait Deserializer {
    type Object;
    type Error: std::error::Error + Send + Sync + 'static;

    fn deserialize(&self, blob: Bytes) -> Result<Self::Object, Self::Error>;
}

/// Identity deserializer: hands the raw blob through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytesDeserializer;

impl Deserializer for BytesDeserializer {
    type Object = Bytes;
    type Error = std::convert::Infallible;

    fn deserialize(&self, blob: Bytes) -> Result<Bytes, Self::Error> {
        Ok(blob)
    }
}

// ─── Configuration ──────────────────────────────────────────────────────────

/// Demuxer configuration.
#[derive(Debug, Clone)]
pub struct DemuxerConfig {
    /// Which side owns the receive buffers — selects error wording for
    /// size-cap violations.
    pub origin: Origin,
    /// Per-object cumulative size cap, propagated to each reassembly
    /// buffer. `None` means unlimited.
    pub max_object_size: Option<u64>,
    /// Session-wide cap on inbound raw bytes. `None` means unlimited.
    pub max_received_data: Option<u64>,
    /// Permit a second parser thread per buffer for callbacks that feed
    /// data back synchronously.
    pub allow_two_threads: bool,
}

impl Default for DemuxerConfig {
    fn default() -> Self {
        DemuxerConfig {
            origin: Origin::Client,
            max_object_size: None,
            max_received_data: None,
            allow_two_threads: false,
        }
    }
}

// ─── Receive Demuxer ────────────────────────────────────────────────────────

struct DataMeter {
    limit: Option<u64>,
    charged: u64,
}

/// Receive half of the engine: one reassembly buffer per priority class
/// behind a shared inbound byte meter.
pub struct ReceiveDemuxer<D> {
    deserializer: D,
    buffers: [ReassemblyBuffer; Priority::COUNT],
    origin: Origin,
    meter: Mutex<DataMeter>,
}

impl<D: Deserializer> ReceiveDemuxer<D> {
    pub fn new(config: DemuxerConfig, deserializer: D) -> Self {
        let buffer = |_| {
            ReassemblyBuffer::new(ReassemblyConfig {
                origin: config.origin,
                max_object_size: config.max_object_size,
                allow_two_threads: config.allow_two_threads,
            })
        };
        ReceiveDemuxer {
            deserializer,
            buffers: std::array::from_fn(buffer),
            origin: config.origin,
            meter: Mutex::new(DataMeter {
                limit: config.max_received_data,
                charged: 0,
            }),
        }
    }

    /// Feed raw bytes for one priority stream.
    ///
    /// Every byte is charged against the session meter first; once the cap
    /// is crossed the data is not dispatched and the call fails with
    /// [`FragmentError::TotalDataTooLarge`]. `callback` is invoked once
    /// per completed object, with no engine lock held.
    pub fn process_raw_data(
        &self,
        data: &[u8],
        priority: Priority,
        mut callback: impl FnMut(D::Object),
    ) -> Result<(), FragmentError> {
        self.charge(data.len() as u64)?;
        let deserializer = &self.deserializer;
        self.buffers[priority.index()].process_raw_data(data, |blob| {
            let object = deserializer
                .deserialize(blob)
                .map_err(|e| FragmentError::Deserialization(Box::new(e)))?;
            callback(object);
            Ok(())
        })
    }

    /// Update the per-object size cap on both priority streams.
    pub fn set_max_object_size(&self, limit: Option<u64>) {
        for buffer in &self.buffers {
            buffer.set_max_object_size(limit);
        }
    }

    /// Update the session-wide inbound byte cap.
    pub fn set_max_received_data(&self, limit: Option<u64>) {
        self.meter.lock().expect("data meter lock poisoned").limit = limit;
    }

    /// Tolerate trailing fragments of a previous connection on both
    /// priority streams.
    pub fn prepare_for_stream_connect(&self) {
        debug!("preparing both priority streams for reconnect");
        for buffer in &self.buffers {
            buffer.prepare_for_stream_connect();
        }
    }

    /// Dispose both reassembly buffers; late data is ignored.
    pub fn dispose(&self) {
        for buffer in &self.buffers {
            buffer.dispose();
        }
    }

    /// Inbound raw bytes charged against the session meter so far.
    pub fn bytes_charged(&self) -> u64 {
        self.meter.lock().expect("data meter lock poisoned").charged
    }

    /// Receive counters for one priority stream.
    pub fn priority_stats(&self, priority: Priority) -> ReceiveStats {
        self.buffers[priority.index()].stats()
    }

    /// Aggregate receive counters across both priority streams.
    pub fn stats(&self) -> ReceiveStats {
        let mut total = ReceiveStats::new();
        for buffer in &self.buffers {
            total.merge(&buffer.stats());
        }
        total
    }

    fn charge(&self, len: u64) -> Result<(), FragmentError> {
        let mut meter = self.meter.lock().expect("data meter lock poisoned");
        meter.charged = meter.charged.saturating_add(len);
        if let Some(limit) = meter.limit {
            if meter.charged > limit {
                return Err(FragmentError::TotalDataTooLarge {
                    origin: self.origin,
                    limit,
                });
            }
        }
        Ok(())
    }
}
