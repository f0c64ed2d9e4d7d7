//! # Protocol Errors
//!
//! Every variant is a transport-level protocol error: the affected
//! reassembly buffer has already been returned to its idle state when one
//! of these surfaces, and the transport is expected to terminate the
//! channel. There is no retry or resynchronization primitive beyond an
//! explicit `prepare_for_stream_connect` on reconnect.

use std::fmt;

use thiserror::Error;

/// Which side of the connection owns the receive buffers.
///
/// Only affects error wording for the size-cap variants, so an operator
/// can tell from a log line which peer overflowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Client,
    Server,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Client => f.write_str("client"),
            Origin::Server => f.write_str("server"),
        }
    }
}

/// Errors surfaced by the defragmentation path.
#[derive(Debug, Error)]
pub enum FragmentError {
    /// Header carries a zero or out-of-range object id.
    #[error("fragment header carries object id {object_id:#x}, expected a positive value")]
    InvalidObjectId { object_id: u64 },

    /// Header plus blob length does not fit a signed 32-bit frame size.
    #[error("fragment blob length {blob_len} exceeds the frame size limit")]
    FragmentTooLarge { blob_len: u32 },

    /// Mid-object fragment belongs to a different object.
    #[error("fragment for object {actual} arrived while object {expected} was being reassembled")]
    ObjectIdMismatch { expected: u64, actual: u64 },

    /// Mid-object fragment id does not extend the current sequence.
    #[error("fragment id {actual} arrived while fragment {expected} was expected")]
    FragmentOutOfSequence { expected: u64, actual: u64 },

    /// Cumulative reassembled size of one object crossed the configured cap.
    #[error("{origin} received an object exceeding the {limit}-byte object size maximum")]
    ObjectTooLarge { origin: Origin, limit: u64 },

    /// Session-wide inbound raw-data cap crossed; the data was not dispatched.
    #[error("{origin} received more than the {limit}-byte session maximum of raw data")]
    TotalDataTooLarge { origin: Origin, limit: u64 },

    /// The deserializer rejected a completed object blob.
    #[error("deserialization of a completed object failed")]
    Deserialization(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_cap_messages_name_the_origin() {
        let client = FragmentError::ObjectTooLarge {
            origin: Origin::Client,
            limit: 100,
        };
        let server = FragmentError::TotalDataTooLarge {
            origin: Origin::Server,
            limit: 4096,
        };
        assert!(client.to_string().contains("client"));
        assert!(client.to_string().contains("100"));
        assert!(server.to_string().contains("server"));
        assert!(server.to_string().contains("4096"));
    }

    #[test]
    fn deserialization_preserves_the_source() {
        use std::error::Error;

        let inner = std::io::Error::new(std::io::ErrorKind::InvalidData, "bad payload");
        let err = FragmentError::Deserialization(Box::new(inner));
        assert!(err.source().is_some());
    }
}
