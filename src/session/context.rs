//! State shared between the session facade and its background tasks.
//!
//! Every mutable piece sits behind its own lock or atomic. The registry lock is
//! never held across an `.await`, a socket write, a registry hook or a
//! game-bridge callback.

use crate::config::NetworkConfig;
use crate::core::packet::Packet;
use crate::error::{constants, ProtocolError, Result};
use crate::peer::{JoinState, PeerInfo, PeerRegistry};
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::message::Message;
use crate::protocol::types::PeerId;
use crate::session::bridge::GameBridge;
use crate::session::state::SessionState;
use crate::transport::{Connection, OutboundQueue, ReadStatus};
use crate::utils::metrics::Metrics;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

pub struct SessionContext {
    config: NetworkConfig,
    state: Mutex<SessionState>,
    registry: Mutex<PeerRegistry>,
    outbound: OutboundQueue,
    bridge: Arc<dyn GameBridge>,
    dispatcher: Dispatcher,
    metrics: Metrics,
    game_started: AtomicBool,
    round_ready: AtomicBool,
    assigned_player_id: Mutex<Option<PeerId>>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("state", &self.state())
            .field("registry", &self.registry)
            .field("outbound", &self.outbound.len())
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl SessionContext {
    pub fn new(config: NetworkConfig, bridge: Arc<dyn GameBridge>) -> Result<Self> {
        Self::with_dispatcher(config, bridge, Dispatcher::with_default_handlers()?)
    }

    pub fn with_dispatcher(
        config: NetworkConfig,
        bridge: Arc<dyn GameBridge>,
        dispatcher: Dispatcher,
    ) -> Result<Self> {
        let registry = PeerRegistry::with_capacity(config.session.max_peers);
        Ok(Self {
            config,
            state: Mutex::new(SessionState::Uninitialized),
            registry: Mutex::new(registry),
            outbound: OutboundQueue::new(),
            bridge,
            dispatcher,
            metrics: Metrics::new(),
            game_started: AtomicBool::new(false),
            round_ready: AtomicBool::new(false),
            assigned_player_id: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn bridge(&self) -> &dyn GameBridge {
        self.bridge.as_ref()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn outbound(&self) -> &OutboundQueue {
        &self.outbound
    }

    pub fn registry(&self) -> Result<MutexGuard<'_, PeerRegistry>> {
        self.registry.lock().map_err(|_| ProtocolError::LockPoisoned)
    }

    pub fn state(&self) -> SessionState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or(SessionState::Error)
    }

    pub fn set_state(&self, next: SessionState) {
        match self.state.lock() {
            Ok(mut state) => {
                let previous = *state;
                if previous != next {
                    debug!(from = %previous, to = %next, "Session state change");
                    *state = next;
                }
            }
            Err(_) => error!("{}", constants::ERR_LOCK_POISONED),
        }
    }

    pub fn game_started(&self) -> bool {
        self.game_started.load(Ordering::Acquire)
    }

    pub fn set_game_started(&self, started: bool) {
        self.game_started.store(started, Ordering::Release);
    }

    pub fn set_round_ready(&self) {
        self.round_ready.store(true, Ordering::Release);
    }

    /// Read and clear the round-ready flag
    pub fn take_round_ready(&self) -> bool {
        self.round_ready.swap(false, Ordering::AcqRel)
    }

    /// The id the host assigned to this process's player, once known
    pub fn assigned_player_id(&self) -> Option<PeerId> {
        self.assigned_player_id.lock().ok().and_then(|id| *id)
    }

    pub fn set_assigned_player_id(&self, id: PeerId) {
        if let Ok(mut assigned) = self.assigned_player_id.lock() {
            *assigned = Some(id);
        }
    }

    /// True iff the local peer is also the host peer
    pub fn is_host(&self) -> bool {
        self.registry()
            .map(|registry| registry.local_peer().is_some_and(|peer| peer.is_host()))
            .unwrap_or(false)
    }

    /// Register a peer and tell the game bridge about it.
    pub fn add_peer(
        &self,
        name: &str,
        is_local: bool,
        is_host: bool,
        connection: Option<Arc<Connection>>,
        join_state: JoinState,
    ) -> Result<PeerId> {
        let added = self.registry()?.add_peer_deferred(
            name,
            is_local,
            is_host,
            connection.clone(),
            join_state,
        );

        match added {
            Ok((info, notices)) => {
                notices.fire();
                self.bridge.on_peer_added(&info);
                Ok(info.id)
            }
            Err(e) => {
                if matches!(e, ProtocolError::RegistryFull(_)) {
                    self.metrics.peer_rejected();
                }
                if let Some(conn) = connection {
                    conn.close();
                }
                error!(error = %e, name, "Failed to add peer");
                Err(e)
            }
        }
    }

    /// Register a freshly accepted connection as a joining client.
    pub fn accept_connection(&self, connection: Connection) -> Result<PeerId> {
        let addr = connection.peer_addr();
        let id = self.add_peer(
            "Joining...",
            false,
            false,
            Some(Arc::new(connection)),
            JoinState::Joining,
        )?;
        self.metrics.connection_accepted();
        info!(peer = id, %addr, "Accepted connection");
        Ok(id)
    }

    /// Encode and queue a message for one peer.
    pub fn send_to(&self, msg: &Message, recipient: PeerId) -> Result<()> {
        let packet = msg.encode()?;
        self.outbound.enqueue(packet, recipient)
    }

    /// Queue a message for every remote peer with a live connection, returning
    /// how many recipients it was queued for.
    pub fn broadcast(&self, msg: &Message) -> Result<usize> {
        let packet = msg.encode()?;
        let recipients: Vec<PeerId> = self
            .registry()?
            .remote_connections()
            .into_iter()
            .map(|(id, _)| id)
            .collect();

        for &id in &recipients {
            self.outbound.enqueue(packet.clone(), id)?;
        }
        debug!(
            packet = msg.packet_type().name(),
            recipients = recipients.len(),
            "Broadcast queued"
        );
        Ok(recipients.len())
    }

    /// Read whatever each remote peer has sent and dispatch every complete packet.
    pub fn poll_inbound(&self) {
        let connections = match self.registry() {
            Ok(registry) => registry.remote_connections(),
            Err(e) => {
                error!(error = %e, "Cannot poll peers");
                return;
            }
        };

        for (id, conn) in connections {
            let status = match conn.read_available() {
                Ok(status) => status,
                Err(e) => {
                    warn!(peer = id, error = %e, "Read failed");
                    self.metrics.connection_error();
                    self.handle_disconnect(id);
                    continue;
                }
            };

            let bytes = match status {
                ReadStatus::Open { bytes } | ReadStatus::Eof { bytes } => bytes,
            };
            self.metrics.bytes_read(bytes);

            loop {
                match conn.next_frame() {
                    Ok(Some(frame)) => self.handle_frame(id, &frame),
                    Ok(None) => break,
                    Err(e) => {
                        self.metrics.protocol_error();
                        warn!(peer = id, error = %e, "Dropped malformed frame data");
                        break;
                    }
                }
            }

            if matches!(status, ReadStatus::Eof { .. }) {
                self.handle_disconnect(id);
            }
        }
    }

    /// Decode and dispatch one packet. Failures only affect this packet.
    pub fn handle_frame(&self, sender: PeerId, frame: &[u8]) {
        let result = Packet::from_bytes(frame)
            .and_then(|packet| Message::decode(&packet))
            .and_then(|msg| {
                self.metrics.packet_received();
                self.dispatcher.dispatch(self, sender, &msg)
            });

        if let Err(e) = result {
            self.metrics.protocol_error();
            if e.is_decode_error() {
                warn!(peer = sender, error = %e, "Discarding malformed packet");
            } else {
                warn!(peer = sender, error = %e, "Packet rejected");
            }
        }
    }

    /// Write one batch of queued packets, each to its recipient's connection.
    pub async fn flush_outbound(&self) {
        let batch = match self.outbound.drain_batch(self.config.io.drain_batch) {
            Ok(batch) => batch,
            Err(e) => {
                error!(error = %e, "Cannot drain outbound queue");
                return;
            }
        };

        for entry in batch {
            let connection = self.registry().ok().and_then(|registry| {
                registry
                    .get_peer(entry.recipient)
                    .ok()
                    .and_then(|peer| peer.connection().cloned())
                    .filter(|conn| !conn.is_closed())
            });

            let Some(conn) = connection else {
                error!(
                    peer = entry.recipient,
                    packet = entry.packet.packet_type().name(),
                    "{}",
                    constants::ERR_NO_CONNECTION
                );
                self.metrics.outbound_dropped(1);
                continue;
            };

            let write = tokio::time::timeout(
                self.config.io.write_timeout,
                conn.send_packet(&entry.packet),
            )
            .await;

            match write {
                Ok(Ok(bytes)) => self.metrics.packet_sent(bytes),
                Ok(Err(e)) => {
                    warn!(peer = entry.recipient, error = %e, "Write failed");
                    self.metrics.connection_error();
                    self.metrics.outbound_dropped(1);
                    self.handle_disconnect(entry.recipient);
                }
                Err(_) => {
                    warn!(peer = entry.recipient, "Write timed out");
                    self.metrics.connection_error();
                    self.metrics.outbound_dropped(1);
                    self.handle_disconnect(entry.recipient);
                }
            }
        }
    }

    /// Release a dropped peer's connection and notify listeners. The peer keeps
    /// its slot until the session is reset.
    pub fn handle_disconnect(&self, id: PeerId) {
        let removed = match self.registry() {
            Ok(mut registry) => match registry.release_peer_deferred(id) {
                Ok(released) => released,
                Err(e) => {
                    warn!(peer = id, error = %e, "Disconnect for unknown peer");
                    None
                }
            },
            Err(e) => {
                error!(error = %e, "Cannot release peer");
                None
            }
        };

        if let Some((info, notices)) = removed {
            info!(peer = id, name = %info.name, "Peer disconnected");
            notices.fire();
            self.bridge.on_peer_removed(&info);
        }
    }

    /// Release and forget every peer, keeping registered hooks.
    pub fn release_all_peers(&self) -> Vec<PeerInfo> {
        let (removed, notices) = match self.registry() {
            Ok(mut registry) => registry.release_all_deferred(),
            Err(e) => {
                error!(error = %e, "Cannot release peers");
                Default::default()
            }
        };
        notices.fire();
        for info in &removed {
            self.bridge.on_peer_removed(info);
        }
        removed
    }

    /// Return to a pristine state: no peers, no hooks, nothing queued.
    pub fn clear(&self) {
        let (removed, notices) = match self.registry() {
            Ok(mut registry) => registry.reset_deferred(),
            Err(e) => {
                error!(error = %e, "Cannot reset registry");
                Default::default()
            }
        };
        notices.fire();
        for info in &removed {
            self.bridge.on_peer_removed(info);
        }

        let dropped = self.outbound.clear();
        if dropped > 0 {
            debug!(dropped, "Discarded unsent packets");
            self.metrics.outbound_dropped(dropped);
        }
        self.set_game_started(false);
        self.round_ready.store(false, Ordering::Release);
        if let Ok(mut assigned) = self.assigned_player_id.lock() {
            *assigned = None;
        }
    }
}
