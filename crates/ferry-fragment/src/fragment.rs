//! # Fragmentor
//!
//! Splits one serialized object into header-framed fragments of bounded
//! size and appends the complete run to a priority buffer in a single
//! atomic batch, so two objects written concurrently to the same priority
//! never interleave.

use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use tracing::trace;

use crate::queue::FragmentBuffer;
use crate::wire::{FragmentHeader, ObjectIdGenerator, HEADER_LEN, MAX_FRAGMENT_TOTAL};

// ─── Configuration ──────────────────────────────────────────────────────────

/// Fragmentor configuration.
#[derive(Debug, Clone)]
pub struct FragmentorConfig {
    /// Maximum total bytes per fragment, header included.
    pub fragment_size: usize,
}

impl Default for FragmentorConfig {
    fn default() -> Self {
        FragmentorConfig {
            fragment_size: 32 * 1024,
        }
    }
}

// ─── Fragmentor ─────────────────────────────────────────────────────────────

/// Slices serialized objects into wire fragments.
pub struct Fragmentor {
    config: FragmentorConfig,
    id_gen: Arc<ObjectIdGenerator>,
}

impl Fragmentor {
    /// Create a fragmentor with its own object-id generator.
    pub fn new(config: FragmentorConfig) -> Self {
        Self::with_generator(config, Arc::new(ObjectIdGenerator::new()))
    }

    /// Create a fragmentor sharing an id generator with other writers on
    /// the same direction.
    ///
    /// # Panics
    ///
    /// Panics if `fragment_size` leaves no room for a blob byte or exceeds
    /// the signed 32-bit frame limit.
    pub fn with_generator(config: FragmentorConfig, id_gen: Arc<ObjectIdGenerator>) -> Self {
        assert!(
            config.fragment_size > HEADER_LEN,
            "fragment_size must exceed the {HEADER_LEN}-byte header"
        );
        assert!(
            config.fragment_size as u64 <= MAX_FRAGMENT_TOTAL,
            "fragment_size must fit a signed 32-bit frame"
        );
        Fragmentor { config, id_gen }
    }

    /// Maximum blob bytes carried by one fragment.
    pub fn payload_capacity(&self) -> usize {
        self.config.fragment_size - HEADER_LEN
    }

    /// Number of fragments `len` blob bytes will produce.
    pub fn fragment_count(&self, len: usize) -> usize {
        len.div_ceil(self.payload_capacity()).max(1)
    }

    /// Fragment `data` as one object into `sink`.
    ///
    /// The blob is copied; the caller's slice is not retained. The full
    /// fragment run is appended under one buffer lock acquisition. Returns
    /// the object id assigned to the run.
    pub fn fragment(&self, data: &[u8], sink: &FragmentBuffer) -> u64 {
        let object_id = self.id_gen.next();
        let capacity = self.payload_capacity();
        let num_frags = self.fragment_count(data.len());

        let mut frames = Vec::with_capacity(num_frags);
        if data.is_empty() {
            frames.push(encode_frame(object_id, 0, true, true, &[]));
        } else {
            for (i, chunk) in data.chunks(capacity).enumerate() {
                frames.push(encode_frame(
                    object_id,
                    i as u64,
                    i == 0,
                    i + 1 == num_frags,
                    chunk,
                ));
            }
        }
        sink.append_object(frames);
        object_id
    }
}

fn encode_frame(object_id: u64, fragment_id: u64, start: bool, end: bool, blob: &[u8]) -> Bytes {
    let header = FragmentHeader {
        object_id,
        fragment_id,
        start,
        end,
        blob_len: blob.len() as u32,
    };
    trace!(
        object_id,
        fragment_id,
        start,
        end,
        blob_len = blob.len(),
        "fragment queued"
    );
    let mut frame = BytesMut::with_capacity(HEADER_LEN + blob.len());
    header.encode(&mut frame);
    frame.extend_from_slice(blob);
    frame.freeze()
}
