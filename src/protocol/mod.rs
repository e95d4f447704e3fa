//! # Protocol Layer
//!
//! Typed messages exchanged between peers and the dispatch table that applies them.
//!
//! ## Components
//! - **Types**: board snapshots, placed objects, movement directions, peer ids
//! - **Message**: one variant per packet type, with validated encode/decode
//! - **Dispatcher**: routes each decoded message to the handler for its packet type
//!
//! ## Message Flow
//! | Packet | Direction | Effect |
//! |---|---|---|
//! | `INIT_PEER_DATA` | either | names the sender and marks it joined |
//! | `START_GAME` | host to client | raises the game-started flag |
//! | `MOVE_REQUEST` | client to host | records the sender's intent for the next turn |
//! | `INIT_BOARD` | host to client | hands the board snapshot to the game |
//! | `PLAYER_MOVE` | host to client | hands a resolved move to the game |

pub mod dispatcher;
pub mod message;
pub mod types;
