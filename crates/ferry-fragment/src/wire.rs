//! # Fragment Framing
//!
//! Fixed 21-byte big-endian header prefixed to every fragment on the wire.
//!
//! ```text
//!  0                   1                   2
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           Object Id (64)                |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           Fragment Id (64)              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |S|E| rsvd (6)  |      Blob Length (32)   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           Blob (Blob Length bytes)      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The flags byte carries start-of-object in bit 0 and end-of-object in
//! bit 1; the upper six bits are reserved, written as zero and ignored on
//! read. The codec itself is total over any sufficiently long slice —
//! semantic validation (positive object id, frame size bounds) is the
//! reassembly layer's job.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::sync::atomic::{AtomicU64, Ordering};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Encoded header size in bytes.
pub const HEADER_LEN: usize = 21;

/// Flags bit 0: first fragment of an object.
pub const FLAG_START: u8 = 0x01;

/// Flags bit 1: last fragment of an object.
pub const FLAG_END: u8 = 0x02;

/// Largest permitted header + blob total. Frame sizes must stay within a
/// signed 32-bit integer for wire compatibility with existing peers.
pub const MAX_FRAGMENT_TOTAL: u64 = i32::MAX as u64;

// ─── Fragment Header ────────────────────────────────────────────────────────

/// Decoded per-fragment framing header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    /// Object this fragment belongs to. Positive, monotonic per direction.
    pub object_id: u64,
    /// Position within the object, starting at 0.
    pub fragment_id: u64,
    /// First fragment of the object.
    pub start: bool,
    /// Last fragment of the object.
    pub end: bool,
    /// Length of the blob following the header.
    pub blob_len: u32,
}

impl FragmentHeader {
    /// Encode the header into a buffer. Reserved flag bits are written as 0.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.object_id);
        buf.put_u64(self.fragment_id);
        let mut flags = 0u8;
        if self.start {
            flags |= FLAG_START;
        }
        if self.end {
            flags |= FLAG_END;
        }
        buf.put_u8(flags);
        buf.put_u32(self.blob_len);
    }

    /// Decode a header from the front of `data` without consuming it.
    /// Returns `None` if fewer than [`HEADER_LEN`] bytes are present.
    pub fn peek(mut data: &[u8]) -> Option<Self> {
        if data.len() < HEADER_LEN {
            return None;
        }
        let object_id = data.get_u64();
        let fragment_id = data.get_u64();
        let flags = data.get_u8();
        let blob_len = data.get_u32();
        Some(FragmentHeader {
            object_id,
            fragment_id,
            start: flags & FLAG_START != 0,
            end: flags & FLAG_END != 0,
            blob_len,
        })
    }

    /// Total wire size of the fragment this header describes.
    pub fn total_len(&self) -> u64 {
        HEADER_LEN as u64 + u64::from(self.blob_len)
    }
}

// ─── Fragment ───────────────────────────────────────────────────────────────

/// A complete fragment: header plus blob.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub header: FragmentHeader,
    pub blob: Bytes,
}

impl Fragment {
    /// Serialize header + blob into a new buffer.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.blob.len());
        self.header.encode(&mut buf);
        buf.extend_from_slice(&self.blob);
        buf
    }

    /// Decode one complete fragment from a buffer. Returns `None` if the
    /// buffer holds less than header + blob.
    pub fn decode(data: &mut impl Buf) -> Option<Self> {
        if data.remaining() < HEADER_LEN {
            return None;
        }
        let object_id = data.get_u64();
        let fragment_id = data.get_u64();
        let flags = data.get_u8();
        let blob_len = data.get_u32();
        if data.remaining() < blob_len as usize {
            return None;
        }
        let blob = data.copy_to_bytes(blob_len as usize);
        Some(Fragment {
            header: FragmentHeader {
                object_id,
                fragment_id,
                start: flags & FLAG_START != 0,
                end: flags & FLAG_END != 0,
                blob_len,
            },
            blob,
        })
    }
}

// ─── Object Id Generator ────────────────────────────────────────────────────

/// Monotonic object-id source, one per send direction.
///
/// Ids start at 1 and never repeat within a connection. Ids allocated for
/// objects that are later discarded leave gaps, which peers accept.
#[derive(Debug)]
pub struct ObjectIdGenerator {
    next: AtomicU64,
}

impl ObjectIdGenerator {
    pub fn new() -> Self {
        ObjectIdGenerator {
            next: AtomicU64::new(1),
        }
    }

    /// Allocate the next object id.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// The id the next allocation will return.
    pub fn current(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for ObjectIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Trace Helpers ──────────────────────────────────────────────────────────

/// Short hex preview of a blob head for trace events.
pub(crate) fn blob_preview(blob: &[u8]) -> String {
    use std::fmt::Write;

    const PREVIEW: usize = 8;
    let mut out = String::with_capacity(PREVIEW * 3 + 2);
    for (i, byte) in blob.iter().take(PREVIEW).enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{byte:02x}");
    }
    if blob.len() > PREVIEW {
        out.push_str(" ..");
    }
    out
}
