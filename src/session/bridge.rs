//! Boundary between the session and the game simulation.
//!
//! Callbacks fire on the session's I/O threads. Implementations that feed a
//! single-threaded simulation should queue and return, which is what
//! [`EventMailbox`] does.

use crate::peer::PeerInfo;
use crate::protocol::types::{BoardSnapshot, MovementDirection, PeerId};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Notifications the session emits to the game layer. Every method defaults
/// to doing nothing.
pub trait GameBridge: Send + Sync {
    fn on_peer_added(&self, _peer: &PeerInfo) {}

    fn on_peer_removed(&self, _peer: &PeerInfo) {}

    /// A peer's name or join state changed after an identity exchange
    fn on_peer_updated(&self, _peer: &PeerInfo) {}

    fn on_board_received(&self, _board: &BoardSnapshot) {}

    fn on_player_move_received(&self, _player_id: PeerId, _dx: i32, _dy: i32) {}

    fn on_game_start_received(&self) {}

    /// Host only: a client asked to move on the next turn
    fn on_move_requested(&self, _peer_id: PeerId, _direction: MovementDirection) {}
}

/// Bridge that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBridge;

impl GameBridge for NullBridge {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    PeerAdded(PeerInfo),
    PeerRemoved(PeerInfo),
    PeerUpdated(PeerInfo),
    BoardReceived(BoardSnapshot),
    PlayerMoveReceived { player_id: PeerId, dx: i32, dy: i32 },
    GameStartReceived,
    MoveRequested {
        peer_id: PeerId,
        direction: MovementDirection,
    },
}

/// Queues every notification for the simulation thread to drain.
#[derive(Debug, Default)]
pub struct EventMailbox {
    events: Mutex<VecDeque<SessionEvent>>,
}

impl EventMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: SessionEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push_back(event),
            Err(_) => tracing::error!("Event mailbox lock poisoned, dropping event"),
        }
    }

    /// Take every queued event in arrival order
    pub fn drain(&self) -> Vec<SessionEvent> {
        self.events
            .lock()
            .map(|mut events| events.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl GameBridge for EventMailbox {
    fn on_peer_added(&self, peer: &PeerInfo) {
        self.push(SessionEvent::PeerAdded(peer.clone()));
    }

    fn on_peer_removed(&self, peer: &PeerInfo) {
        self.push(SessionEvent::PeerRemoved(peer.clone()));
    }

    fn on_peer_updated(&self, peer: &PeerInfo) {
        self.push(SessionEvent::PeerUpdated(peer.clone()));
    }

    fn on_board_received(&self, board: &BoardSnapshot) {
        self.push(SessionEvent::BoardReceived(board.clone()));
    }

    fn on_player_move_received(&self, player_id: PeerId, dx: i32, dy: i32) {
        self.push(SessionEvent::PlayerMoveReceived { player_id, dx, dy });
    }

    fn on_game_start_received(&self) {
        self.push(SessionEvent::GameStartReceived);
    }

    fn on_move_requested(&self, peer_id: PeerId, direction: MovementDirection) {
        self.push(SessionEvent::MoveRequested { peer_id, direction });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::PlacedObject;

    #[test]
    fn test_mailbox_drains_in_order() {
        let mailbox = EventMailbox::new();
        mailbox.on_game_start_received();
        mailbox.on_board_received(&BoardSnapshot::new(2, vec![PlacedObject::new(1, 1)], vec![], vec![]));
        mailbox.on_player_move_received(1, 0, -1);
        assert_eq!(mailbox.len(), 3);

        let events = mailbox.drain();
        assert_eq!(events[0], SessionEvent::GameStartReceived);
        assert!(matches!(&events[1], SessionEvent::BoardReceived(board) if board.level == 2));
        assert_eq!(
            events[2],
            SessionEvent::PlayerMoveReceived {
                player_id: 1,
                dx: 0,
                dy: -1
            }
        );
        assert!(mailbox.is_empty());
    }
}
