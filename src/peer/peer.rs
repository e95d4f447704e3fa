use crate::error::{constants, ProtocolError, Result};
use crate::protocol::types::{MovementDirection, PeerId};
use crate::transport::connection::Connection;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// How far a peer has progressed through the identity exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinState {
    #[default]
    Uninitialized,
    Joining,
    Joined,
}

/// One participant in a session.
///
/// Remote peers own the connection to that participant; the local peer never
/// has one.
#[derive(Debug)]
pub struct Peer {
    id: PeerId,
    name: String,
    is_local: bool,
    is_host: bool,
    connection: Option<Arc<Connection>>,
    join_state: JoinState,
    requested_movement: MovementDirection,
}

impl Peer {
    pub fn new(
        id: PeerId,
        name: impl Into<String>,
        is_local: bool,
        is_host: bool,
        connection: Option<Arc<Connection>>,
        join_state: JoinState,
    ) -> Result<Self> {
        if is_local && connection.is_some() {
            return Err(ProtocolError::Precondition(
                constants::ERR_LOCAL_WITH_CONNECTION,
            ));
        }

        Ok(Self {
            id,
            name: name.into(),
            is_local,
            is_host,
            connection,
            join_state,
            requested_movement: MovementDirection::None,
        })
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn is_local(&self) -> bool {
        self.is_local
    }

    pub fn is_host(&self) -> bool {
        self.is_host
    }

    pub fn join_state(&self) -> JoinState {
        self.join_state
    }

    pub fn set_join_state(&mut self, state: JoinState) {
        self.join_state = state;
    }

    pub fn connection(&self) -> Option<&Arc<Connection>> {
        self.connection.as_ref()
    }

    /// Whether writes to this peer can currently succeed
    pub fn has_live_connection(&self) -> bool {
        self.connection
            .as_ref()
            .map(|conn| !conn.is_closed())
            .unwrap_or(false)
    }

    /// Hand a freshly dialed connection to a provisional remote peer.
    pub fn attach_connection(&mut self, connection: Arc<Connection>) -> Result<()> {
        if self.is_local {
            return Err(ProtocolError::Precondition(
                constants::ERR_LOCAL_WITH_CONNECTION,
            ));
        }
        if self.connection.is_some() {
            return Err(ProtocolError::Precondition(
                constants::ERR_CONNECTION_ATTACHED,
            ));
        }
        self.connection = Some(connection);
        Ok(())
    }

    pub fn requested_movement(&self) -> MovementDirection {
        self.requested_movement
    }

    pub fn set_requested_movement(&mut self, direction: MovementDirection) {
        self.requested_movement = direction;
    }

    /// Record a new intent. Returns `false` when it repeats the pending one.
    pub fn update_requested_movement(&mut self, direction: MovementDirection) -> bool {
        if self.requested_movement == direction {
            return false;
        }
        self.requested_movement = direction;
        true
    }

    /// Close and drop the connection, if any. Safe to call repeatedly.
    pub fn release(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
            debug!(peer = self.id, "Peer connection released");
        }
    }

    pub fn info(&self) -> PeerInfo {
        PeerInfo {
            id: self.id,
            name: self.name.clone(),
            is_local: self.is_local,
            is_host: self.is_host,
            join_state: self.join_state,
            connected: self.has_live_connection(),
            requested_movement: self.requested_movement,
        }
    }
}

/// Owned snapshot of a peer, safe to hand across threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: PeerId,
    pub name: String,
    pub is_local: bool,
    pub is_host: bool,
    pub join_state: JoinState,
    pub connected: bool,
    pub requested_movement: MovementDirection,
}

impl fmt::Display for PeerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "peer {} [{:?}] name={:?} connected={} local={} host={}",
            self.id,
            self.join_state,
            self.name,
            if self.connected { "yes" } else { "no" },
            if self.is_local { "yes" } else { "no" },
            if self.is_host { "yes" } else { "no" },
        )
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::transport::connection::connect;
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn live_connection() -> (Arc<Connection>, tokio::net::TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (conn, accepted) = tokio::join!(
            connect(addr, None, Duration::from_secs(2)),
            listener.accept()
        );
        (Arc::new(conn.unwrap()), accepted.unwrap().0)
    }

    #[tokio::test]
    async fn test_local_peer_rejects_connection() {
        let (conn, _remote) = live_connection().await;
        let err = Peer::new(0, "me", true, true, Some(conn), JoinState::Joined).unwrap_err();
        assert!(matches!(err, ProtocolError::Precondition(_)));

        let mut local = Peer::new(0, "me", true, true, None, JoinState::Joined).unwrap();
        let (conn, _remote) = live_connection().await;
        assert!(local.attach_connection(conn).is_err());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let (conn, _remote) = live_connection().await;
        let mut peer = Peer::new(
            1,
            "Joining...",
            false,
            false,
            Some(Arc::clone(&conn)),
            JoinState::Joining,
        )
        .unwrap();
        assert!(peer.has_live_connection());

        peer.release();
        assert!(conn.is_closed());
        assert!(peer.connection().is_none());

        peer.release();
        assert!(peer.connection().is_none());
        assert!(!peer.info().connected);
    }

    #[test]
    fn test_requested_movement_dedup() {
        let mut peer = Peer::new(1, "p", true, false, None, JoinState::Joined).unwrap();
        assert!(peer.update_requested_movement(MovementDirection::Up));
        assert!(!peer.update_requested_movement(MovementDirection::Up));
        assert!(peer.update_requested_movement(MovementDirection::Left));
        peer.set_requested_movement(MovementDirection::None);
        assert!(peer.update_requested_movement(MovementDirection::Left));
    }

    #[test]
    fn test_display_summarises_peer() {
        let peer = Peer::new(2, "bob", false, false, None, JoinState::Joining).unwrap();
        let text = peer.info().to_string();
        assert!(text.contains("peer 2"));
        assert!(text.contains("Joining"));
        assert!(text.contains("connected=no"));
    }
}
