//! # ferry-fragment
//!
//! Priority fragmentation engine for the Ferry remoting protocol: the
//! layer between a higher protocol exchanging self-describing serialized
//! objects and a byte-oriented transport that moves opaque blobs in
//! bounded chunks.
//!
//! Outbound objects are sliced into header-framed fragments and queued
//! into one of two priority classes; the transport pulls one fragment at
//! a time, prompt traffic first, parking a one-shot callback when idle.
//! Inbound bytes are routed by priority to independent reassembly buffers
//! that validate framing, enforce size caps, and deliver whole objects.
//!
//! ## Crate structure
//!
//! - [`wire`] — fragment header codec, object-id generation
//! - [`priority`] — the two scheduling classes
//! - [`fragment`] — object → fragment splitting
//! - [`queue`] — per-priority send buffers, pull/callback interface
//! - [`reassembly`] — per-priority defragmentation state machine
//! - [`demux`] — priority routing, session byte meter, deserializer seam
//! - [`error`] — protocol error taxonomy
//! - [`stats`] — send/receive counters

pub mod demux;
pub mod error;
pub mod fragment;
pub mod priority;
pub mod queue;
pub mod reassembly;
pub mod stats;
pub mod wire;
