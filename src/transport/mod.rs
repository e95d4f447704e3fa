//! # Transport Layer
//!
//! TCP connections to remote peers and the queue that serializes writes to them.
//!
//! ## Components
//! - **Connection**: non-blocking reads into a per-connection frame buffer, whole-frame writes
//! - **Outbound**: mutex-guarded FIFO of (packet, recipient) pairs drained in bounded batches
//!
//! ## Ordering
//! A single FIFO serves every recipient. Batches are drained from the front, so
//! packets to the same recipient are written in the order they were enqueued.

pub mod connection;
pub mod outbound;

pub use connection::{Connection, ReadStatus};
pub use outbound::{OutboundEntry, OutboundQueue, MAX_DRAIN_BATCH};
