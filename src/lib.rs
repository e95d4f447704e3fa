//! # turnlink
//!
//! Host-authoritative peer sessions for small turn-based games.
//!
//! One process hosts and owns the canonical game state; up to three others join
//! it over TCP. The host broadcasts board layouts, resolved moves and the game
//! start; clients send their identity and movement intents.
//!
//! ## Layers
//! - [`core`]: fixed-capacity packets and the length-prefixed stream codec
//! - [`protocol`]: typed messages and the dispatch table
//! - [`peer`]: participants and the bounded peer registry
//! - [`transport`]: TCP connections and the outbound write queue
//! - [`session`]: the state machine, background loops and game bridge
//! - [`config`], [`error`], [`utils`]: configuration, errors, logging and metrics
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use turnlink::{EventMailbox, NetworkConfig, Session};
//!
//! # fn main() -> turnlink::Result<()> {
//! let mailbox = Arc::new(EventMailbox::new());
//! let mut session = Session::new(NetworkConfig::default(), mailbox.clone())?;
//! session.host("alice")?;
//!
//! for event in mailbox.drain() {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod peer;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod utils;

pub use config::{NetworkConfig, MAX_PEERS};
pub use error::{ProtocolError, Result};
pub use peer::{JoinState, PeerInfo};
pub use protocol::message::Message;
pub use protocol::types::{BoardSnapshot, MovementDirection, PeerId, PlacedObject};
pub use session::{EventMailbox, GameBridge, NullBridge, Session, SessionEvent, SessionState};
pub use utils::metrics::MetricsSnapshot;
