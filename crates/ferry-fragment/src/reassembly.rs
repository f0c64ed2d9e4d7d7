//! # Reassembly Buffer
//!
//! Per-priority stream parser. Raw inbound bytes are appended to a pending
//! buffer with no awareness of fragment boundaries; the parser peels off
//! complete fragments, validates framing, accumulates blob bytes, and
//! hands each finished object to a callback. Any framing violation resets
//! the buffer to its idle state and surfaces an error — the protocol has
//! no resynchronization primitive short of a reconnect.
//!
//! Delivery callbacks run with the buffer lock released. A callback may
//! feed data back synchronously only when the buffer was built with
//! [`ReassemblyConfig::allow_two_threads`]; otherwise reentry is a
//! programmer error caught by assertion.

use bytes::{Bytes, BytesMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, trace, warn};

use crate::error::{FragmentError, Origin};
use crate::stats::ReceiveStats;
use crate::wire::{self, FragmentHeader, HEADER_LEN, MAX_FRAGMENT_TOTAL};

// ─── Configuration ──────────────────────────────────────────────────────────

/// Reassembly buffer configuration.
#[derive(Debug, Clone)]
pub struct ReassemblyConfig {
    /// Which side owns this buffer — selects the error wording for
    /// size-cap violations.
    pub origin: Origin,
    /// Per-object cumulative size cap, header bytes included. `None` means
    /// unlimited.
    pub max_object_size: Option<u64>,
    /// Permit a second parser thread, for delivery callbacks that feed
    /// received data back synchronously.
    pub allow_two_threads: bool,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        ReassemblyConfig {
            origin: Origin::Client,
            max_object_size: None,
            allow_two_threads: false,
        }
    }
}

// ─── Reassembly Buffer ──────────────────────────────────────────────────────

/// Defragments one priority stream into whole serialized objects.
pub struct ReassemblyBuffer {
    state: Mutex<ReassemblyState>,
    origin: Origin,
    threads_processing: AtomicUsize,
    max_threads: usize,
    disposed: AtomicBool,
}

struct ReassemblyState {
    /// Raw inbound bytes not yet consumed as fragments.
    pending: BytesMut,
    /// Object currently being reassembled; 0 when idle.
    object_id: u64,
    expected_fragment_id: u64,
    /// Blob bytes accumulated for the current object.
    blob: BytesMut,
    /// Header + blob bytes consumed for the current object.
    received_size: u64,
    /// Discard off-sequence fragments silently until the next start
    /// fragment. Set on reconnect, cleared by a start fragment.
    ignore_off_sync: bool,
    max_object_size: Option<u64>,
    stats: ReceiveStats,
}

impl ReassemblyState {
    /// Back to idle; pending bytes and the reconnect flag survive.
    fn reset_object(&mut self) {
        self.object_id = 0;
        self.expected_fragment_id = 0;
        self.blob.clear();
        self.received_size = 0;
    }

    /// Back to the as-constructed state, reconnect flag aside. Used on
    /// fatal framing errors, where the stream position itself is suspect.
    fn reset_hard(&mut self) {
        self.reset_object();
        self.pending.clear();
    }
}

impl ReassemblyBuffer {
    pub fn new(config: ReassemblyConfig) -> Self {
        ReassemblyBuffer {
            state: Mutex::new(ReassemblyState {
                pending: BytesMut::new(),
                object_id: 0,
                expected_fragment_id: 0,
                blob: BytesMut::new(),
                received_size: 0,
                ignore_off_sync: false,
                max_object_size: config.max_object_size,
                stats: ReceiveStats::new(),
            }),
            origin: config.origin,
            threads_processing: AtomicUsize::new(0),
            max_threads: if config.allow_two_threads { 2 } else { 1 },
            disposed: AtomicBool::new(false),
        }
    }

    /// Update the per-object size cap.
    pub fn set_max_object_size(&self, limit: Option<u64>) {
        self.lock_state().max_object_size = limit;
    }

    /// Tolerate trailing fragments of a previous connection: off-sequence
    /// fragments are discarded silently until the next start fragment.
    pub fn prepare_for_stream_connect(&self) {
        debug!("tolerating off-sync fragments until the next start fragment");
        self.lock_state().ignore_off_sync = true;
    }

    /// Feed raw inbound bytes and deliver any objects they complete.
    ///
    /// `deliver` is invoked once per completed object, with the buffer
    /// lock released. An error from `deliver` propagates to the caller
    /// with the object state already reset. Calls on a disposed buffer
    /// return without effect.
    pub fn process_raw_data(
        &self,
        data: &[u8],
        mut deliver: impl FnMut(Bytes) -> Result<(), FragmentError>,
    ) -> Result<(), FragmentError> {
        if self.disposed.load(Ordering::Acquire) {
            return Ok(());
        }
        let entrants = self.threads_processing.fetch_add(1, Ordering::AcqRel) + 1;
        assert!(
            entrants <= self.max_threads,
            "{entrants} threads entered the reassembly parser, limit {}",
            self.max_threads
        );

        let result = self.run_parser(data, &mut deliver);

        self.threads_processing.fetch_sub(1, Ordering::AcqRel);
        if self.disposed.load(Ordering::Acquire)
            && self.threads_processing.load(Ordering::Acquire) == 0
        {
            self.release();
        }
        result
    }

    /// Mark disposed. If a thread is parsing, resource release is deferred
    /// until it exits; later `process_raw_data` calls are no-ops.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("reassembly buffer disposed");
        if self.threads_processing.load(Ordering::Acquire) == 0 {
            self.release();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Raw bytes buffered but not yet consumed as fragments.
    pub fn pending_len(&self) -> usize {
        self.lock_state().pending.len()
    }

    /// Whether an object is partially reassembled.
    pub fn is_in_progress(&self) -> bool {
        self.lock_state().object_id != 0
    }

    /// Snapshot of the receive counters.
    pub fn stats(&self) -> ReceiveStats {
        self.lock_state().stats.clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, ReassemblyState> {
        self.state.lock().expect("reassembly state lock poisoned")
    }

    fn release(&self) {
        let mut state = self.lock_state();
        state.reset_object();
        state.pending = BytesMut::new();
        state.blob = BytesMut::new();
    }

    fn run_parser(
        &self,
        data: &[u8],
        deliver: &mut dyn FnMut(Bytes) -> Result<(), FragmentError>,
    ) -> Result<(), FragmentError> {
        let mut state = self.lock_state();
        state.pending.extend_from_slice(data);
        state.stats.bytes_received += data.len() as u64;

        while state.pending.len() >= HEADER_LEN {
            let header = match FragmentHeader::peek(&state.pending) {
                Some(header) => header,
                None => break,
            };

            if header.object_id == 0 || header.object_id > i64::MAX as u64 {
                state.stats.framing_errors += 1;
                state.reset_hard();
                return Err(FragmentError::InvalidObjectId {
                    object_id: header.object_id,
                });
            }

            let total = header.total_len();
            if total > MAX_FRAGMENT_TOTAL {
                state.stats.framing_errors += 1;
                state.reset_hard();
                return Err(FragmentError::FragmentTooLarge {
                    blob_len: header.blob_len,
                });
            }

            if (state.pending.len() as u64) < total {
                // Await more bytes.
                break;
            }

            if let Some(limit) = state.max_object_size {
                // A start fragment opens a fresh size budget; the previous
                // partial is about to be discarded.
                let base = if header.start { 0 } else { state.received_size };
                let exceeded = match base.checked_add(total) {
                    Some(size) => size > limit,
                    None => true,
                };
                if exceeded {
                    state.stats.framing_errors += 1;
                    state.reset_hard();
                    return Err(FragmentError::ObjectTooLarge {
                        origin: self.origin,
                        limit,
                    });
                }
            }

            let mut frame = state.pending.split_to(total as usize);
            let blob = frame.split_off(HEADER_LEN).freeze();
            state.stats.fragments_received += 1;
            trace!(
                object_id = header.object_id,
                fragment_id = header.fragment_id,
                start = header.start,
                end = header.end,
                blob_len = header.blob_len,
                preview = %wire::blob_preview(&blob),
                "fragment received"
            );

            if header.start {
                state.object_id = header.object_id;
                state.expected_fragment_id = 1;
                state.blob.clear();
                state.blob.extend_from_slice(&blob);
                state.received_size = total;
                state.ignore_off_sync = false;
            } else if header.object_id != state.object_id {
                if state.ignore_off_sync {
                    state.stats.off_sync_discarded += 1;
                    warn!(
                        object_id = header.object_id,
                        current = state.object_id,
                        "discarding off-sync fragment"
                    );
                    continue;
                }
                let err = FragmentError::ObjectIdMismatch {
                    expected: state.object_id,
                    actual: header.object_id,
                };
                state.stats.framing_errors += 1;
                state.reset_hard();
                return Err(err);
            } else if header.fragment_id != state.expected_fragment_id {
                if state.ignore_off_sync {
                    state.stats.off_sync_discarded += 1;
                    warn!(
                        object_id = header.object_id,
                        fragment_id = header.fragment_id,
                        expected = state.expected_fragment_id,
                        "discarding off-sync fragment"
                    );
                    continue;
                }
                let err = FragmentError::FragmentOutOfSequence {
                    expected: state.expected_fragment_id,
                    actual: header.fragment_id,
                };
                state.stats.framing_errors += 1;
                state.reset_hard();
                return Err(err);
            } else {
                state.blob.extend_from_slice(&blob);
                state.expected_fragment_id += 1;
                state.received_size = state.received_size.saturating_add(total);
            }

            if header.end {
                let assembled = state.blob.split().freeze();
                state.stats.objects_delivered += 1;
                state.reset_object();
                drop(state);

                // Callbacks run with the buffer lock released; an error
                // propagates with the object state already reset.
                deliver(assembled)?;

                if self.disposed.load(Ordering::Acquire) {
                    return Ok(());
                }
                state = self.lock_state();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Fragment;
    use std::sync::{Arc, Mutex};

    fn frame(object_id: u64, fragment_id: u64, start: bool, end: bool, blob: &[u8]) -> Bytes {
        Fragment {
            header: FragmentHeader {
                object_id,
                fragment_id,
                start,
                end,
                blob_len: blob.len() as u32,
            },
            blob: Bytes::copy_from_slice(blob),
        }
        .encode()
        .freeze()
    }

    /// Route the per-fragment trace events through a real subscriber.
    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn buffer() -> ReassemblyBuffer {
        ReassemblyBuffer::new(ReassemblyConfig::default())
    }

    /// Feed `data`, collecting every delivered object.
    fn feed(
        buffer: &ReassemblyBuffer,
        data: &[u8],
    ) -> (Result<(), FragmentError>, Vec<Bytes>) {
        let mut delivered = Vec::new();
        let result = buffer.process_raw_data(data, |blob| {
            delivered.push(blob);
            Ok(())
        });
        (result, delivered)
    }

    // ─── Happy Path ─────────────────────────────────────────────────────

    #[test]
    fn single_fragment_object_delivers() {
        init_tracing();
        let buffer = buffer();
        let blob: Vec<u8> = (1..=10).collect();
        let stream = frame(1, 0, true, true, &blob);
        assert_eq!(stream.len(), 31);

        let (result, delivered) = feed(&buffer, &stream);
        result.unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(&delivered[0][..], &blob[..]);
        assert_eq!(buffer.pending_len(), 0);
        assert!(!buffer.is_in_progress());
    }

    #[test]
    fn multi_fragment_object_accumulates_in_order() {
        let buffer = buffer();
        let mut stream = BytesMut::new();
        stream.extend_from_slice(&frame(3, 0, true, false, b"AAA"));
        stream.extend_from_slice(&frame(3, 1, false, false, b"BBB"));
        stream.extend_from_slice(&frame(3, 2, false, true, b"CC"));

        let (result, delivered) = feed(&buffer, &stream);
        result.unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(&delivered[0][..], b"AAABBBCC");
    }

    #[test]
    fn bytes_split_arbitrarily_across_calls() {
        let buffer = buffer();
        let stream = frame(1, 0, true, true, b"split across calls");

        // Partial header first, then partial blob, then the rest.
        let (result, delivered) = feed(&buffer, &stream[..HEADER_LEN - 3]);
        result.unwrap();
        assert!(delivered.is_empty());

        let (result, delivered) = feed(&buffer, &stream[HEADER_LEN - 3..HEADER_LEN + 5]);
        result.unwrap();
        assert!(delivered.is_empty());
        assert!(buffer.pending_len() > 0);

        let (result, delivered) = feed(&buffer, &stream[HEADER_LEN + 5..]);
        result.unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(&delivered[0][..], b"split across calls");
    }

    #[test]
    fn consecutive_objects_deliver_in_order() {
        let buffer = buffer();
        let mut stream = BytesMut::new();
        stream.extend_from_slice(&frame(1, 0, true, true, b"one"));
        stream.extend_from_slice(&frame(2, 0, true, true, b"two"));

        let (result, delivered) = feed(&buffer, &stream);
        result.unwrap();
        assert_eq!(delivered.len(), 2);
        assert_eq!(&delivered[0][..], b"one");
        assert_eq!(&delivered[1][..], b"two");
    }

    #[test]
    fn empty_blob_fragment_delivers_empty_object() {
        let buffer = buffer();
        let (result, delivered) = feed(&buffer, &frame(1, 0, true, true, &[]));
        result.unwrap();
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].is_empty());
    }

    #[test]
    fn stream_survives_arbitrary_chunking() {
        use rand::rngs::StdRng;
        use rand::{RngExt, SeedableRng};

        let buffer = buffer();
        let mut stream = BytesMut::new();
        for id in 1..=20u64 {
            stream.extend_from_slice(&frame(id, 0, true, false, &[id as u8; 10]));
            stream.extend_from_slice(&frame(id, 1, false, true, &[id as u8; 7]));
        }

        let mut rng = StdRng::seed_from_u64(7);
        let mut delivered = Vec::new();
        let mut offset = 0;
        while offset < stream.len() {
            let take = rng.random_range(1..=64.min(stream.len() - offset));
            buffer
                .process_raw_data(&stream[offset..offset + take], |blob| {
                    delivered.push(blob);
                    Ok(())
                })
                .unwrap();
            offset += take;
        }

        assert_eq!(delivered.len(), 20);
        for (i, blob) in delivered.iter().enumerate() {
            assert_eq!(blob.len(), 17);
            assert!(blob.iter().all(|&b| b == (i + 1) as u8));
        }
    }

    // ─── Framing Errors ─────────────────────────────────────────────────

    #[test]
    fn out_of_sequence_fragment_errors_then_recovers() {
        let buffer = buffer();
        let (result, _) = feed(&buffer, &frame(7, 0, true, false, b"abc"));
        result.unwrap();

        // Fragment 2 while 1 was expected.
        let (result, delivered) = feed(&buffer, &frame(7, 2, false, true, b"def"));
        assert!(matches!(
            result,
            Err(FragmentError::FragmentOutOfSequence {
                expected: 1,
                actual: 2
            })
        ));
        assert!(delivered.is_empty());
        assert!(!buffer.is_in_progress());

        // A fresh object parses as if the buffer were newly constructed.
        let (result, delivered) = feed(&buffer, &frame(8, 0, true, true, b"fresh"));
        result.unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(&delivered[0][..], b"fresh");
    }

    #[test]
    fn object_id_mismatch_mid_object_errors() {
        let buffer = buffer();
        feed(&buffer, &frame(5, 0, true, false, b"abc")).0.unwrap();

        let (result, _) = feed(&buffer, &frame(6, 1, false, true, b"def"));
        assert!(matches!(
            result,
            Err(FragmentError::ObjectIdMismatch {
                expected: 5,
                actual: 6
            })
        ));
    }

    #[test]
    fn zero_object_id_is_invalid() {
        let buffer = buffer();
        let (result, _) = feed(&buffer, &frame(0, 0, true, true, b"x"));
        assert!(matches!(
            result,
            Err(FragmentError::InvalidObjectId { object_id: 0 })
        ));
    }

    #[test]
    fn negative_object_id_is_invalid() {
        // High bit set — negative in the original signed encoding.
        let buffer = buffer();
        let bad = i64::MAX as u64 + 1;
        let (result, _) = feed(&buffer, &frame(bad, 0, true, true, b"x"));
        assert!(matches!(
            result,
            Err(FragmentError::InvalidObjectId { object_id }) if object_id == bad
        ));
    }

    #[test]
    fn oversized_frame_length_is_rejected_from_header_alone() {
        let buffer = buffer();
        let mut header_only = BytesMut::new();
        FragmentHeader {
            object_id: 1,
            fragment_id: 0,
            start: true,
            end: true,
            blob_len: u32::MAX,
        }
        .encode(&mut header_only);

        let (result, delivered) = feed(&buffer, &header_only);
        assert!(matches!(
            result,
            Err(FragmentError::FragmentTooLarge { blob_len: u32::MAX })
        ));
        assert!(delivered.is_empty());
        assert_eq!(buffer.pending_len(), 0);
    }

    #[test]
    fn framing_error_resets_partial_state() {
        let buffer = buffer();
        feed(&buffer, &frame(5, 0, true, false, b"partial")).0.unwrap();
        assert!(buffer.is_in_progress());

        let (result, _) = feed(&buffer, &frame(5, 9, false, false, b"x"));
        assert!(result.is_err());
        assert!(!buffer.is_in_progress());
        assert_eq!(buffer.pending_len(), 0);
        assert_eq!(buffer.stats().framing_errors, 1);
    }

    // ─── Size Cap ───────────────────────────────────────────────────────

    #[test]
    fn object_exceeding_cap_aborts_without_delivery() {
        let buffer = ReassemblyBuffer::new(ReassemblyConfig {
            max_object_size: Some(100),
            ..ReassemblyConfig::default()
        });

        // Two 75-byte fragments: the second crosses the 100-byte cap.
        let first = frame(1, 0, true, false, &[0u8; 75 - HEADER_LEN]);
        let second = frame(1, 1, false, true, &[0u8; 75 - HEADER_LEN]);

        let (result, delivered) = feed(&buffer, &first);
        result.unwrap();
        assert!(delivered.is_empty());

        let (result, delivered) = feed(&buffer, &second);
        assert!(matches!(
            result,
            Err(FragmentError::ObjectTooLarge {
                origin: Origin::Client,
                limit: 100
            })
        ));
        assert!(delivered.is_empty());
        assert!(!buffer.is_in_progress());
    }

    #[test]
    fn server_origin_selects_server_variant() {
        let buffer = ReassemblyBuffer::new(ReassemblyConfig {
            origin: Origin::Server,
            max_object_size: Some(30),
            ..ReassemblyConfig::default()
        });
        let (result, _) = feed(&buffer, &frame(1, 0, true, true, &[0u8; 20]));
        assert!(matches!(
            result,
            Err(FragmentError::ObjectTooLarge {
                origin: Origin::Server,
                ..
            })
        ));
    }

    #[test]
    fn start_fragment_opens_a_fresh_size_budget() {
        let buffer = ReassemblyBuffer::new(ReassemblyConfig {
            max_object_size: Some(100),
            ..ReassemblyConfig::default()
        });

        // 75 bytes into object 1, then object 2 starts: its fragment is
        // charged against a fresh budget, not the discarded partial.
        feed(&buffer, &frame(1, 0, true, false, &[0u8; 75 - HEADER_LEN]))
            .0
            .unwrap();
        let (result, delivered) = feed(&buffer, &frame(2, 0, true, true, &[0u8; 75 - HEADER_LEN]));
        result.unwrap();
        assert_eq!(delivered.len(), 1);
    }

    #[test]
    fn cap_can_be_raised_at_runtime() {
        let buffer = ReassemblyBuffer::new(ReassemblyConfig {
            max_object_size: Some(25),
            ..ReassemblyConfig::default()
        });
        buffer.set_max_object_size(Some(1024));
        let (result, delivered) = feed(&buffer, &frame(1, 0, true, true, &[0u8; 100]));
        result.unwrap();
        assert_eq!(delivered.len(), 1);
    }

    // ─── Reconnect Tolerance ────────────────────────────────────────────

    #[test]
    fn trailing_fragments_tolerated_after_stream_connect() {
        init_tracing();
        let buffer = buffer();
        buffer.prepare_for_stream_connect();

        // Trailing mid-object fragment from the previous connection.
        let (result, delivered) = feed(&buffer, &frame(5, 4, false, false, b"stale"));
        result.unwrap();
        assert!(delivered.is_empty());
        assert_eq!(buffer.stats().off_sync_discarded, 1);

        // The next start fragment begins a fresh object and clears the flag.
        let (result, delivered) = feed(&buffer, &frame(6, 0, true, true, b"fresh"));
        result.unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(&delivered[0][..], b"fresh");

        // Flag is one-shot: off-sync fragments are fatal again.
        let (result, _) = feed(&buffer, &frame(9, 3, false, false, b"late"));
        assert!(result.is_err());
    }

    // ─── Delivery Errors ────────────────────────────────────────────────

    #[test]
    fn deliver_error_propagates_after_reset() {
        let buffer = buffer();
        let result = buffer.process_raw_data(&frame(1, 0, true, true, b"poison"), |_| {
            Err(FragmentError::Deserialization(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "unreadable",
            ))))
        });
        assert!(matches!(result, Err(FragmentError::Deserialization(_))));
        assert!(!buffer.is_in_progress());

        // Framing is intact; the next object still parses.
        let (result, delivered) = feed(&buffer, &frame(2, 0, true, true, b"ok"));
        result.unwrap();
        assert_eq!(delivered.len(), 1);
    }

    // ─── Dispose ────────────────────────────────────────────────────────

    #[test]
    fn disposed_buffer_ignores_late_data() {
        let buffer = buffer();
        buffer.dispose();
        buffer.dispose(); // idempotent

        let (result, delivered) = feed(&buffer, &frame(1, 0, true, true, b"late"));
        result.unwrap();
        assert!(delivered.is_empty());
        assert_eq!(buffer.stats().bytes_received, 0);
    }

    #[test]
    fn dispose_from_callback_stops_parsing() {
        let buffer = buffer();
        let mut stream = BytesMut::new();
        stream.extend_from_slice(&frame(1, 0, true, true, b"first"));
        stream.extend_from_slice(&frame(2, 0, true, true, b"second"));

        let mut delivered = Vec::new();
        buffer
            .process_raw_data(&stream, |blob| {
                delivered.push(blob);
                buffer.dispose();
                Ok(())
            })
            .unwrap();

        assert_eq!(delivered.len(), 1);
        // Deferred release ran once the parser exited.
        assert_eq!(buffer.pending_len(), 0);
    }

    // ─── Reentrancy ─────────────────────────────────────────────────────

    #[test]
    fn reentrant_feed_allowed_with_two_threads() {
        let buffer = ReassemblyBuffer::new(ReassemblyConfig {
            allow_two_threads: true,
            ..ReassemblyConfig::default()
        });
        let second = frame(2, 0, true, true, b"second");
        let log = Arc::new(Mutex::new(Vec::new()));

        let outer_log = log.clone();
        buffer
            .process_raw_data(&frame(1, 0, true, true, b"first"), |blob| {
                outer_log.lock().unwrap().push(blob.clone());
                if &blob[..] == b"first" {
                    let inner_log = outer_log.clone();
                    buffer.process_raw_data(&second, |inner| {
                        inner_log.lock().unwrap().push(inner);
                        Ok(())
                    })?;
                }
                Ok(())
            })
            .unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(&log[0][..], b"first");
        assert_eq!(&log[1][..], b"second");
    }

    #[test]
    #[should_panic(expected = "limit 1")]
    fn reentrant_feed_without_opt_in_is_a_programmer_error() {
        let buffer = buffer();
        let second = frame(2, 0, true, true, b"second");
        let _ = buffer.process_raw_data(&frame(1, 0, true, true, b"first"), |_| {
            buffer.process_raw_data(&second, |_| Ok(()))
        });
    }

    // ─── Stats ──────────────────────────────────────────────────────────

    #[test]
    fn stats_count_fragments_and_objects() {
        let buffer = buffer();
        let mut stream = BytesMut::new();
        stream.extend_from_slice(&frame(1, 0, true, false, b"ab"));
        stream.extend_from_slice(&frame(1, 1, false, true, b"cd"));
        feed(&buffer, &stream).0.unwrap();

        let stats = buffer.stats();
        assert_eq!(stats.bytes_received, stream.len() as u64);
        assert_eq!(stats.fragments_received, 2);
        assert_eq!(stats.objects_delivered, 1);
        assert!((stats.fragments_per_object() - 2.0).abs() < f64::EPSILON);
    }
}
