//! # Session
//!
//! The networking state machine a game drives from its simulation thread.
//!
//! A [`Session`] owns a small tokio runtime. Hosting spawns an accept loop and
//! an I/O loop on it; joining spawns only the I/O loop. Every public method is
//! synchronous, so a `Session` must not be created, used or dropped from inside
//! another async runtime.
//!
//! ## Roles
//! - **Host**: authoritative; broadcasts the board, moves and game start
//! - **Client**: sends its identity and movement intents to the host
//!
//! Incoming traffic is surfaced through a [`GameBridge`], typically an
//! [`EventMailbox`] the simulation drains once per frame.

pub mod bridge;
pub mod context;
pub mod io_loop;
pub mod state;

pub use bridge::{EventMailbox, GameBridge, NullBridge, SessionEvent};
pub use context::SessionContext;
pub use state::SessionState;

use crate::config::NetworkConfig;
use crate::error::{constants, ProtocolError, Result};
use crate::peer::{CallbackId, JoinState, PeerCallback, PeerInfo};
use crate::protocol::message::Message;
use crate::protocol::types::{BoardSnapshot, MovementDirection, PeerId, PlacedObject};
use crate::transport::connection;
use crate::utils::metrics::MetricsSnapshot;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Worker threads backing the session runtime
const IO_WORKER_THREADS: usize = 2;

/// Name placed on the client's host peer until the host introduces itself
const HOST_PLACEHOLDER_NAME: &str = "Host...";

pub struct Session {
    context: Arc<SessionContext>,
    runtime: Runtime,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    listen_addr: Option<SocketAddr>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("context", &self.context)
            .field("tasks", &self.tasks.len())
            .field("listen_addr", &self.listen_addr)
            .finish()
    }
}

impl Session {
    /// Validate `config` and start the session runtime. No sockets are opened
    /// until [`host`](Self::host) or [`join`](Self::join).
    pub fn new(config: NetworkConfig, bridge: Arc<dyn GameBridge>) -> Result<Self> {
        config.validate_strict()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(IO_WORKER_THREADS)
            .thread_name("turnlink-io")
            .enable_all()
            .build()?;

        Ok(Self {
            context: Arc::new(SessionContext::new(config, bridge)?),
            runtime,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
            listen_addr: None,
        })
    }

    /// Shared state, for custom handlers and diagnostics
    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    pub fn state(&self) -> SessionState {
        self.context.state()
    }

    /// Start hosting under `name`. Does nothing unless the session is
    /// uninitialized.
    ///
    /// On a bind failure the session moves to [`SessionState::Error`] and must
    /// be [`reset`](Self::reset) before trying again.
    #[instrument(skip(self))]
    pub fn host(&mut self, name: &str) -> Result<()> {
        let state = self.state();
        if state != SessionState::Uninitialized {
            debug!(%state, "Ignoring host request");
            return Ok(());
        }
        self.context.set_state(SessionState::Hosting);

        if let Err(e) = self
            .context
            .add_peer(name, true, true, None, JoinState::Joined)
        {
            self.context.release_all_peers();
            self.context.set_state(SessionState::Uninitialized);
            return Err(e);
        }

        let bound = self
            .context
            .config()
            .session
            .host_addr()
            .and_then(|addr| Ok(self.runtime.block_on(TcpListener::bind(addr))?));

        let listener = match bound {
            Ok(listener) => listener,
            Err(e) => {
                error!(error = %e, "Failed to open listening socket");
                self.context.metrics().connection_error();
                self.context.release_all_peers();
                self.context.set_state(SessionState::Error);
                return Err(e);
            }
        };
        self.listen_addr = listener.local_addr().ok();
        self.context.set_state(SessionState::ActiveHost);

        let ctx = Arc::clone(&self.context);
        let cancel = self.cancel.child_token();
        self.tasks
            .push(self.runtime.spawn(io_loop::accept_loop(ctx, listener, cancel)));
        self.spawn_io_loop();

        info!(addr = ?self.listen_addr, "Hosting session");
        Ok(())
    }

    /// Join the host at `address` (`ip` or `ip:port`) as `name`. Does nothing
    /// unless the session is uninitialized.
    ///
    /// On failure every provisional peer is released and the session returns
    /// to [`SessionState::Uninitialized`].
    #[instrument(skip(self))]
    pub fn join(&mut self, address: &str, name: &str) -> Result<()> {
        let state = self.state();
        if state != SessionState::Uninitialized {
            debug!(%state, "Ignoring join request");
            return Ok(());
        }
        let remote = self.resolve_address(address)?;
        self.context.set_state(SessionState::Joining);

        let provisional = self
            .context
            .add_peer(HOST_PLACEHOLDER_NAME, false, true, None, JoinState::Joining)
            .and_then(|host_id| {
                self.context
                    .add_peer(name, true, false, None, JoinState::Joining)
                    .map(|_| host_id)
            });

        let session = &self.context.config().session;
        let dialed = provisional.and_then(|host_id| {
            self.runtime
                .block_on(connection::connect(
                    remote,
                    session.client_port,
                    session.connect_timeout,
                ))
                .map(|conn| (host_id, conn))
        });

        let attached = dialed.and_then(|(host_id, conn)| {
            let mut registry = self.context.registry()?;
            registry
                .get_peer_mut(host_id)?
                .attach_connection(Arc::new(conn))?;
            if let Some(local) = registry.local_peer_mut() {
                local.set_join_state(JoinState::Joined);
            }
            Ok(host_id)
        });

        let host_id = match attached {
            Ok(host_id) => host_id,
            Err(e) => {
                warn!(%remote, error = %e, "Failed to join session");
                self.context.metrics().connection_error();
                self.context.release_all_peers();
                self.context.set_state(SessionState::Uninitialized);
                return Err(e);
            }
        };

        self.context.metrics().connection_established();
        self.context.set_state(SessionState::ActiveClient);
        self.spawn_io_loop();

        self.context.send_to(
            &Message::InitPeerData {
                name: name.to_string(),
                player_id: None,
            },
            host_id,
        )?;
        info!(%remote, "Joined session");
        Ok(())
    }

    fn resolve_address(&self, address: &str) -> Result<SocketAddr> {
        let address = address.trim();
        if address.is_empty() {
            return Err(ProtocolError::InvalidAddress(String::new()));
        }
        if let Ok(addr) = address.parse::<SocketAddr>() {
            return Ok(addr);
        }
        address
            .parse::<IpAddr>()
            .map(|ip| SocketAddr::new(ip, self.context.config().session.host_port))
            .map_err(|_| ProtocolError::InvalidAddress(address.to_string()))
    }

    fn spawn_io_loop(&mut self) {
        let ctx = Arc::clone(&self.context);
        let cancel = self.cancel.child_token();
        self.tasks.push(self.runtime.spawn(io_loop::run(ctx, cancel)));
    }

    /// Stop the background loops, release every peer and return to
    /// [`SessionState::Uninitialized`]. Registered callbacks are cleared.
    #[instrument(skip(self))]
    pub fn reset(&mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = self.runtime.block_on(task) {
                error!(error = %e, "Background task ended abnormally");
            }
        }
        self.cancel = CancellationToken::new();

        self.context.clear();
        self.listen_addr = None;
        self.context.set_state(SessionState::Uninitialized);
        debug!("Session reset");
    }

    /// True iff the local peer is the host peer
    pub fn is_host(&self) -> bool {
        self.context.is_host()
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Address the host is listening on, once hosting
    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.listen_addr
    }

    pub fn peer_count(&self) -> usize {
        self.context.registry().map(|r| r.count()).unwrap_or(0)
    }

    pub fn peers(&self) -> Vec<PeerInfo> {
        self.context
            .registry()
            .map(|r| r.infos())
            .unwrap_or_default()
    }

    pub fn peer(&self, id: PeerId) -> Result<PeerInfo> {
        Ok(self.context.registry()?.get_peer(id)?.info())
    }

    pub fn local_peer_id(&self) -> Option<PeerId> {
        self.context
            .registry()
            .ok()
            .and_then(|r| r.local_peer().map(|peer| peer.id()))
    }

    /// This process's player id as the host numbers it. On the host it is the
    /// local peer id; a client learns it from the host's identity reply.
    pub fn local_player_id(&self) -> Option<PeerId> {
        if self.is_host() {
            self.local_peer_id()
        } else {
            self.context.assigned_player_id()
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.context.metrics().snapshot()
    }

    /// Emit one debug line per registered peer
    pub fn log_peers(&self) {
        for info in self.peers() {
            debug!(
                peer = info.id,
                state = ?info.join_state,
                name = %info.name,
                connected = info.connected,
                local = info.is_local,
                host = info.is_host,
                "Peer"
            );
        }
    }

    pub fn game_started(&self) -> bool {
        self.context.game_started()
    }

    /// True once after each board snapshot arrives
    pub fn take_round_ready(&self) -> bool {
        self.context.take_round_ready()
    }

    fn require_role(&self, host: bool) -> Result<()> {
        let violation = if !self.is_active() {
            Some(constants::ERR_NOT_ACTIVE)
        } else if self.is_host() != host {
            Some(if host {
                constants::ERR_NOT_HOST
            } else {
                constants::ERR_NOT_CLIENT
            })
        } else {
            None
        };

        match violation {
            Some(msg) => {
                warn!(state = %self.state(), "{}", msg);
                Err(ProtocolError::Precondition(msg))
            }
            None => Ok(()),
        }
    }

    /// Host only: mark the game started and tell every client.
    pub fn start_game(&self) -> Result<usize> {
        self.require_role(true)?;
        self.context.set_game_started(true);
        self.context.broadcast(&Message::StartGame)
    }

    /// Host only: send the round's board layout to every client.
    pub fn broadcast_round_start(
        &self,
        level: i32,
        walls: &[PlacedObject],
        food: &[PlacedObject],
        enemies: &[PlacedObject],
    ) -> Result<usize> {
        self.require_role(true)?;
        let board = BoardSnapshot::new(level, walls.to_vec(), food.to_vec(), enemies.to_vec());
        self.context.broadcast(&Message::InitBoard(board))
    }

    /// Host only: announce a resolved move and clear that player's pending intent.
    pub fn broadcast_player_move(&self, player_id: PeerId, dx: i32, dy: i32) -> Result<usize> {
        self.require_role(true)?;
        let known = self.context.registry()?.get_peer(player_id).map(|_| ());
        if let Err(e) = known {
            warn!(player = player_id, "Refusing to broadcast a move for an unknown player");
            return Err(e);
        }

        let sent = self
            .context
            .broadcast(&Message::PlayerMove { player_id, dx, dy })?;

        if let Ok(peer) = self.context.registry()?.get_peer_mut(player_id) {
            peer.set_requested_movement(MovementDirection::None);
        }
        Ok(sent)
    }

    /// Client only: ask the host to move next turn. Returns `false` without
    /// sending anything when `direction` repeats the pending request.
    pub fn set_requested_input(&self, direction: MovementDirection) -> Result<bool> {
        self.require_role(false)?;

        let host_id = {
            let mut registry = self.context.registry()?;
            let host_id = registry
                .host_peer()
                .map(|peer| peer.id())
                .ok_or(ProtocolError::Precondition(constants::ERR_NO_HOST_PEER))?;
            let local = registry
                .local_peer_mut()
                .ok_or(ProtocolError::Precondition(constants::ERR_NO_LOCAL_PEER))?;
            if !local.update_requested_movement(direction) {
                return Ok(false);
            }
            host_id
        };

        self.context
            .send_to(&Message::MoveRequest { direction }, host_id)?;
        Ok(true)
    }

    /// Forget `peer_id`'s pending intent so the same direction is accepted again
    pub fn clear_requested_movement(&self, peer_id: PeerId) -> Result<()> {
        self.context
            .registry()?
            .get_peer_mut(peer_id)?
            .set_requested_movement(MovementDirection::None);
        Ok(())
    }

    /// Hooks run on whichever thread adds the peer, after the registry lock is
    /// released, so they may call back into the session.
    pub fn register_peer_added_callback(&self, callback: PeerCallback) -> Result<CallbackId> {
        Ok(self.context.registry()?.register_peer_added_callback(callback))
    }

    pub fn unregister_peer_added_callback(&self, id: CallbackId) -> Result<bool> {
        Ok(self.context.registry()?.unregister_peer_added_callback(id))
    }

    pub fn register_peer_removed_callback(&self, callback: PeerCallback) -> Result<CallbackId> {
        Ok(self
            .context
            .registry()?
            .register_peer_removed_callback(callback))
    }

    pub fn unregister_peer_removed_callback(&self, id: CallbackId) -> Result<bool> {
        Ok(self.context.registry()?.unregister_peer_removed_callback(id))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.reset();
    }
}
