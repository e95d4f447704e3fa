//! # Peers
//!
//! Per-participant state and the bounded registry that owns it.
//!
//! ## Invariants
//! - At most [`MAX_PEERS`](crate::config::MAX_PEERS) peers, ids `0..count`
//! - At most one local peer and at most one host peer
//! - Only remote peers own a connection, and it is released exactly once

pub mod peer;
pub mod registry;

pub use peer::{JoinState, Peer, PeerInfo};
pub use registry::{CallbackId, PeerCallback, PeerNotifications, PeerRegistry};
