//! # Priority Send Queue
//!
//! Two per-priority fragment buffers feeding a single-reader pull
//! interface. Writers fragment whole objects into their class's buffer
//! under that buffer's lock; the transport pulls one fragment at a time,
//! PromptResponse first, so prompt traffic overtakes bulk output at the
//! next fragment boundary. An empty pull parks a one-shot callback that
//! fires when a fragment becomes available.
//!
//! Callbacks are invoked with every lock released, so a transport may call
//! [`PrioritySendQueue::read_or_register`] again from inside its own
//! callback.

use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, trace, warn};

use crate::fragment::{Fragmentor, FragmentorConfig};
use crate::priority::Priority;
use crate::stats::SendStats;
use crate::wire::{self, FragmentHeader, ObjectIdGenerator, HEADER_LEN};

/// One-shot wakeup armed by an empty read on a fragment buffer.
type WakeupFn = Box<dyn FnOnce() + Send>;

/// Consumer callback: receives the next fragment and its priority class.
pub type SendCallback = Box<dyn FnOnce(Bytes, Priority) + Send>;

// ─── Fragment Buffer ────────────────────────────────────────────────────────

/// Ordered fragment queue for one priority class.
///
/// Writers append the complete fragment run of one object in a single
/// lock acquisition, so fragments of one object are always contiguous. A
/// single reader drains one fragment per call. A wakeup armed against an
/// empty buffer fires exactly once, on the next empty→non-empty
/// transition, after the buffer lock has been released.
pub struct FragmentBuffer {
    inner: Mutex<BufferInner>,
}

#[derive(Default)]
struct BufferInner {
    frames: VecDeque<Bytes>,
    queued_bytes: usize,
    wakeup: Option<WakeupFn>,
}

impl FragmentBuffer {
    pub fn new() -> Self {
        FragmentBuffer {
            inner: Mutex::new(BufferInner::default()),
        }
    }

    /// Append the complete fragment run of one object.
    pub fn append_object(&self, frames: Vec<Bytes>) {
        if frames.is_empty() {
            return;
        }
        let wakeup = {
            let mut inner = self.inner.lock().expect("fragment buffer lock poisoned");
            let was_empty = inner.frames.is_empty();
            for frame in &frames {
                inner.queued_bytes += frame.len();
            }
            inner.frames.extend(frames);
            if was_empty {
                inner.wakeup.take()
            } else {
                None
            }
        };
        if let Some(fire) = wakeup {
            fire();
        }
    }

    /// Pop the next fragment without touching the wakeup slot.
    pub fn try_read(&self) -> Option<Bytes> {
        let mut inner = self.inner.lock().expect("fragment buffer lock poisoned");
        let frame = inner.frames.pop_front()?;
        inner.queued_bytes -= frame.len();
        Some(frame)
    }

    /// Pop the next fragment, or arm `wakeup` for the next empty→non-empty
    /// transition. Exactly one of the two happens; an armed wakeup
    /// supersedes any previous one.
    pub fn read_or_register(&self, wakeup: WakeupFn) -> Option<Bytes> {
        let mut inner = self.inner.lock().expect("fragment buffer lock poisoned");
        match inner.frames.pop_front() {
            Some(frame) => {
                inner.queued_bytes -= frame.len();
                Some(frame)
            }
            None => {
                inner.wakeup = Some(wakeup);
                None
            }
        }
    }

    /// Discard all queued fragments. An armed wakeup stays armed.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("fragment buffer lock poisoned");
        inner.frames.clear();
        inner.queued_bytes = 0;
    }

    /// Fragments currently queued.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("fragment buffer lock poisoned")
            .frames
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wire bytes currently queued.
    pub fn queued_bytes(&self) -> usize {
        self.inner
            .lock()
            .expect("fragment buffer lock poisoned")
            .queued_bytes
    }
}

impl Default for FragmentBuffer {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Priority Send Queue ────────────────────────────────────────────────────

struct QueueShared {
    buffers: [FragmentBuffer; Priority::COUNT],
    /// Single-reader discipline: pulls, registration, and wakeup handling
    /// serialize here. Never held while a callback runs.
    read_lock: Mutex<()>,
    /// Consumer callback awaiting the next fragment.
    pending: Mutex<Option<SendCallback>>,
    /// A wakeup being handled swallows wakeups from the other class; the
    /// consumer's next pull rescans both buffers, so nothing is lost.
    is_handling_callback: AtomicBool,
    stats: Mutex<SendStats>,
}

/// Send half of the engine: fragments objects into two priority classes
/// and hands them to the transport one fragment at a time.
pub struct PrioritySendQueue {
    shared: Arc<QueueShared>,
    fragmentor: Fragmentor,
}

impl PrioritySendQueue {
    pub fn new(config: FragmentorConfig) -> Self {
        Self::with_generator(config, Arc::new(ObjectIdGenerator::new()))
    }

    /// Build a queue whose fragmentor shares `id_gen` with other writers
    /// on the same direction.
    pub fn with_generator(config: FragmentorConfig, id_gen: Arc<ObjectIdGenerator>) -> Self {
        PrioritySendQueue {
            shared: Arc::new(QueueShared {
                buffers: [FragmentBuffer::new(), FragmentBuffer::new()],
                read_lock: Mutex::new(()),
                pending: Mutex::new(None),
                is_handling_callback: AtomicBool::new(false),
                stats: Mutex::new(SendStats::new()),
            }),
            fragmentor: Fragmentor::with_generator(config, id_gen),
        }
    }

    /// Fragment `data` into the given class's buffer and return the object
    /// id assigned.
    ///
    /// Thread-safe: concurrent writers to the same class serialize on that
    /// buffer's lock, so one object's fragments are never interleaved with
    /// another's. If the buffer was empty and a pull is parked, the parked
    /// callback fires on this thread before `add` returns.
    pub fn add(&self, data: &[u8], priority: Priority) -> u64 {
        let fragments = self.fragmentor.fragment_count(data.len());
        let object_id = self
            .fragmentor
            .fragment(data, &self.shared.buffers[priority.index()]);
        {
            let mut stats = self.shared.stats.lock().expect("send stats lock poisoned");
            stats.objects_fragmented += 1;
            stats.fragments_queued += fragments as u64;
            stats.bytes_queued += (data.len() + fragments * HEADER_LEN) as u64;
        }
        object_id
    }

    /// Discard all pending fragments in both classes.
    pub fn clear(&self) {
        debug!("clearing send buffers");
        for buffer in &self.shared.buffers {
            buffer.clear();
        }
    }

    /// Pull the next fragment, PromptResponse first.
    ///
    /// If neither class has data, `callback` is parked and fired exactly
    /// once when a fragment becomes available; a later registration
    /// supersedes an unfired one. The callback runs on the writer's thread
    /// with no queue lock held, so it may pull again reentrantly.
    pub fn read_or_register(&self, callback: SendCallback) -> Option<(Bytes, Priority)> {
        let shared = &self.shared;
        let _reader = shared.read_lock.lock().expect("send read lock poisoned");

        // Park before arming so a wakeup racing with this pull always
        // finds the callback.
        *shared.pending.lock().expect("send callback slot poisoned") = Some(callback);

        match scan_or_arm(shared) {
            Some((frame, priority)) => {
                // Satisfied synchronously — unpark.
                shared
                    .pending
                    .lock()
                    .expect("send callback slot poisoned")
                    .take();
                record_pull(shared, &frame, priority, false);
                Some((frame, priority))
            }
            None => None,
        }
    }

    /// Snapshot of the send counters.
    pub fn stats(&self) -> SendStats {
        self.shared
            .stats
            .lock()
            .expect("send stats lock poisoned")
            .clone()
    }

    /// Fragments queued across both classes.
    pub fn queued_fragments(&self) -> usize {
        self.shared.buffers.iter().map(|b| b.len()).sum()
    }

    /// Fragments queued in one class.
    pub fn buffer_len(&self, priority: Priority) -> usize {
        self.shared.buffers[priority.index()].len()
    }
}

/// Scan both classes in urgency order under the read lock: pop the first
/// available fragment, arming a wakeup on each empty buffer passed over.
fn scan_or_arm(shared: &Arc<QueueShared>) -> Option<(Bytes, Priority)> {
    for priority in Priority::descending() {
        let weak = Arc::downgrade(shared);
        let wakeup: WakeupFn = Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                on_data_available(&shared, priority);
            }
        });
        if let Some(frame) = shared.buffers[priority.index()].read_or_register(wakeup) {
            return Some((frame, priority));
        }
    }
    None
}

/// A previously empty buffer became non-empty: deliver one fragment to the
/// parked consumer callback, if any.
fn on_data_available(shared: &Arc<QueueShared>, priority: Priority) {
    if shared
        .is_handling_callback
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        // The in-flight handler rescans both classes; this signal is safe
        // to drop.
        shared
            .stats
            .lock()
            .expect("send stats lock poisoned")
            .notifications_dropped += 1;
        warn!(?priority, "fragment wakeup swallowed while another is in flight");
        return;
    }

    let delivery = {
        let _reader = shared.read_lock.lock().expect("send read lock poisoned");
        let parked = shared
            .pending
            .lock()
            .expect("send callback slot poisoned")
            .take();
        match parked {
            Some(callback) => match scan_or_arm(shared) {
                Some((frame, priority)) => Some((callback, frame, priority)),
                None => {
                    // Raced with a clear — re-park; the buffers were
                    // re-armed by the scan.
                    *shared.pending.lock().expect("send callback slot poisoned") = Some(callback);
                    None
                }
            },
            // A direct pull already consumed this transition.
            None => None,
        }
    };

    // Cleared before the callback runs so a reentrant pull that parks a
    // new callback can be woken.
    shared.is_handling_callback.store(false, Ordering::Release);

    if let Some((callback, frame, priority)) = delivery {
        record_pull(shared, &frame, priority, true);
        callback(frame, priority);
    }
}

fn record_pull(shared: &QueueShared, frame: &Bytes, priority: Priority, via_wakeup: bool) {
    {
        let mut stats = shared.stats.lock().expect("send stats lock poisoned");
        stats.fragments_pulled += 1;
        stats.bytes_pulled += frame.len() as u64;
        if via_wakeup {
            stats.notifications_fired += 1;
        }
    }
    if let Some(header) = FragmentHeader::peek(frame) {
        trace!(
            object_id = header.object_id,
            fragment_id = header.fragment_id,
            start = header.start,
            end = header.end,
            blob_len = header.blob_len,
            preview = %wire::blob_preview(&frame[HEADER_LEN..]),
            ?priority,
            via_wakeup,
            "fragment sent"
        );
    }
}
