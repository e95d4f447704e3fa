use crate::error::{constants, ProtocolError, Result};
use crate::core::packet::PacketType;
use crate::peer::JoinState;
use crate::protocol::message::Message;
use crate::protocol::types::{MovementDirection, PeerId};
use crate::session::context::SessionContext;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, trace};

type HandlerFn = dyn Fn(&SessionContext, PeerId, &Message) -> Result<()> + Send + Sync + 'static;

/// Routes decoded messages to a handler keyed on packet type.
///
/// Handlers receive the session they run in and the registry id of the peer
/// the message came from. A packet type with no handler is a protocol error.
pub struct Dispatcher {
    handlers: Arc<RwLock<HashMap<PacketType, Box<HandlerFn>>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registered = self.handlers.read().map(|h| h.len()).unwrap_or(0);
        f.debug_struct("Dispatcher")
            .field("handlers", &registered)
            .finish()
    }
}

impl Dispatcher {
    /// Dispatcher with no handlers; every message is rejected
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Dispatcher wired with the standard session behaviour for every packet type
    pub fn with_default_handlers() -> Result<Self> {
        let dispatcher = Self::new();
        dispatcher.register(PacketType::InitPeerData, handle_init_peer_data)?;
        dispatcher.register(PacketType::StartGame, handle_start_game)?;
        dispatcher.register(PacketType::MoveRequest, handle_move_request)?;
        dispatcher.register(PacketType::InitBoard, handle_init_board)?;
        dispatcher.register(PacketType::PlayerMove, handle_player_move)?;
        Ok(dispatcher)
    }

    pub fn register<F>(&self, packet_type: PacketType, handler: F) -> Result<()>
    where
        F: Fn(&SessionContext, PeerId, &Message) -> Result<()> + Send + Sync + 'static,
    {
        let mut handlers = self
            .handlers
            .write()
            .map_err(|_| ProtocolError::LockPoisoned)?;

        handlers.insert(packet_type, Box::new(handler));
        Ok(())
    }

    pub fn dispatch(&self, ctx: &SessionContext, sender: PeerId, msg: &Message) -> Result<()> {
        let packet_type = msg.packet_type();
        trace!(peer = sender, packet = packet_type.name(), "Dispatching");

        let handlers = self
            .handlers
            .read()
            .map_err(|_| ProtocolError::LockPoisoned)?;

        handlers
            .get(&packet_type)
            .ok_or(ProtocolError::UnexpectedMessage)
            .and_then(|handler| handler(ctx, sender, msg))
    }
}

fn require_host_sender(ctx: &SessionContext, sender: PeerId) -> Result<()> {
    if ctx.registry()?.get_peer(sender)?.is_host() {
        Ok(())
    } else {
        Err(ProtocolError::Precondition(constants::ERR_SENDER_NOT_HOST))
    }
}

/// Sender announces its name. The host answers a peer's first announcement
/// with its own name and the id it assigned to that peer.
fn handle_init_peer_data(ctx: &SessionContext, sender: PeerId, msg: &Message) -> Result<()> {
    let Message::InitPeerData { name, player_id } = msg else {
        return Err(ProtocolError::UnexpectedMessage);
    };

    let (info, reply) = {
        let mut registry = ctx.registry()?;
        let host_reply_name = registry
            .local_peer()
            .filter(|local| local.is_host())
            .map(|local| local.name().to_string());

        let peer = registry.get_peer_mut(sender)?;
        let first_contact = peer.join_state() != JoinState::Joined;
        peer.set_name(name.as_str());
        peer.set_join_state(JoinState::Joined);
        let sender_is_host = peer.is_host();

        let reply = host_reply_name
            .filter(|_| first_contact)
            .map(|host_name| Message::InitPeerData {
                name: host_name,
                player_id: Some(sender),
            });

        if let Some(id) = player_id {
            if sender_is_host {
                ctx.set_assigned_player_id(*id);
            } else {
                debug!(peer = sender, "Ignoring player id from non-host peer");
            }
        }
        (peer.info(), reply)
    };

    debug!(peer = sender, name = %info.name, "Peer identified");
    ctx.bridge().on_peer_updated(&info);

    if let Some(reply) = reply {
        ctx.send_to(&reply, sender)?;
    }
    Ok(())
}

fn handle_start_game(ctx: &SessionContext, sender: PeerId, _msg: &Message) -> Result<()> {
    require_host_sender(ctx, sender)?;
    ctx.set_game_started(true);
    ctx.bridge().on_game_start_received();
    Ok(())
}

/// Records a client's intent for the next turn. Repeats of the pending
/// direction are dropped here so the simulation sees each change once.
fn handle_move_request(ctx: &SessionContext, sender: PeerId, msg: &Message) -> Result<()> {
    let Message::MoveRequest { direction } = msg else {
        return Err(ProtocolError::UnexpectedMessage);
    };
    if !ctx.is_host() {
        return Err(ProtocolError::Precondition(constants::ERR_NOT_HOST));
    }

    let changed = {
        let mut registry = ctx.registry()?;
        let peer = registry.get_peer_mut(sender)?;
        if peer.is_host() {
            return Err(ProtocolError::Precondition(constants::ERR_SENDER_IS_HOST));
        }
        peer.update_requested_movement(*direction)
    };

    if !changed {
        debug!(peer = sender, direction = ?direction, "Duplicate move request ignored");
        return Ok(());
    }
    if *direction != MovementDirection::None {
        ctx.bridge().on_move_requested(sender, *direction);
    }
    Ok(())
}

fn handle_init_board(ctx: &SessionContext, sender: PeerId, msg: &Message) -> Result<()> {
    let Message::InitBoard(board) = msg else {
        return Err(ProtocolError::UnexpectedMessage);
    };
    require_host_sender(ctx, sender)?;

    debug!(
        level = board.level,
        objects = board.object_count(),
        "Board snapshot received"
    );
    ctx.bridge().on_board_received(board);
    ctx.set_round_ready();
    Ok(())
}

fn handle_player_move(ctx: &SessionContext, sender: PeerId, msg: &Message) -> Result<()> {
    let Message::PlayerMove { player_id, dx, dy } = msg else {
        return Err(ProtocolError::UnexpectedMessage);
    };
    require_host_sender(ctx, sender)?;

    // The host resolved our pending intent; allow the same direction again.
    if ctx.assigned_player_id() == Some(*player_id) {
        if let Some(local) = ctx.registry()?.local_peer_mut() {
            local.set_requested_movement(MovementDirection::None);
        }
    }
    ctx.bridge().on_player_move_received(*player_id, *dx, *dy);
    Ok(())
}
