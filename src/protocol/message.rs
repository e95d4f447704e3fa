//! Typed messages and their packet encoding.
//!
//! Decoding is strict: every field must be present, in range, and nothing may
//! follow the last expected field.

use crate::config::MAX_PEERS;
use crate::core::packet::{Packet, PacketReader, PacketType, PacketWriter};
use crate::error::{ProtocolError, Result};
use crate::protocol::types::{BoardSnapshot, MovementDirection, PeerId, PlacedObject};

/// Encoded size of one placed object: two integer fields
const PLACED_OBJECT_WIRE_SIZE: usize = 12;

/// Typed view of every packet the session exchanges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Sender's display name. When the host answers a joining client it also
    /// tells the client which player id the host assigned to it.
    InitPeerData {
        name: String,
        player_id: Option<PeerId>,
    },
    StartGame,
    MoveRequest { direction: MovementDirection },
    InitBoard(BoardSnapshot),
    PlayerMove { player_id: PeerId, dx: i32, dy: i32 },
}

impl Message {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Message::InitPeerData { .. } => PacketType::InitPeerData,
            Message::StartGame => PacketType::StartGame,
            Message::MoveRequest { .. } => PacketType::MoveRequest,
            Message::InitBoard(_) => PacketType::InitBoard,
            Message::PlayerMove { .. } => PacketType::PlayerMove,
        }
    }

    /// Encode into a packet, failing if it would not fit in 256 bytes
    pub fn encode(&self) -> Result<Packet> {
        let mut writer = PacketWriter::new(self.packet_type());
        match self {
            Message::InitPeerData { name, player_id } => {
                writer.write_string(name)?;
                if let Some(id) = player_id {
                    writer.write_int(player_id_to_wire(*id)?)?;
                }
            }
            Message::StartGame => {}
            Message::MoveRequest { direction } => {
                writer.write_int(direction.as_i32())?;
            }
            Message::InitBoard(board) => {
                writer.write_int(board.level)?;
                for objects in [&board.walls, &board.food, &board.enemies] {
                    write_objects(&mut writer, objects)?;
                }
            }
            Message::PlayerMove { player_id, dx, dy } => {
                writer
                    .write_int(player_id_to_wire(*player_id)?)?
                    .write_int(*dx)?
                    .write_int(*dy)?;
            }
        }
        Ok(writer.finish())
    }

    /// Decode a received packet, validating every field
    pub fn decode(packet: &Packet) -> Result<Self> {
        let mut reader = packet.reader();
        let message = match packet.packet_type() {
            PacketType::InitPeerData => {
                let name = reader.read_string()?;
                let player_id = if reader.is_exhausted() {
                    None
                } else {
                    Some(read_player_id(&mut reader)?)
                };
                Message::InitPeerData { name, player_id }
            }
            PacketType::StartGame => Message::StartGame,
            PacketType::MoveRequest => Message::MoveRequest {
                direction: MovementDirection::try_from(reader.read_int()?)?,
            },
            PacketType::InitBoard => {
                let level = reader.read_int()?;
                let walls = read_objects(&mut reader)?;
                let food = read_objects(&mut reader)?;
                let enemies = read_objects(&mut reader)?;
                Message::InitBoard(BoardSnapshot {
                    level,
                    walls,
                    food,
                    enemies,
                })
            }
            PacketType::PlayerMove => {
                let player_id = read_player_id(&mut reader)?;
                Message::PlayerMove {
                    player_id,
                    dx: reader.read_int()?,
                    dy: reader.read_int()?,
                }
            }
        };

        if !reader.is_exhausted() {
            return Err(ProtocolError::TrailingBytes(reader.remaining()));
        }
        Ok(message)
    }
}

fn player_id_to_wire(id: PeerId) -> Result<i32> {
    i32::try_from(id)
        .ok()
        .filter(|_| id < MAX_PEERS)
        .ok_or(ProtocolError::InvalidPeer(i64::try_from(id).unwrap_or(i64::MAX)))
}

fn read_player_id(reader: &mut PacketReader<'_>) -> Result<PeerId> {
    let raw = reader.read_int()?;
    usize::try_from(raw)
        .ok()
        .filter(|id| *id < MAX_PEERS)
        .ok_or(ProtocolError::InvalidPeer(raw as i64))
}

fn write_objects(writer: &mut PacketWriter, objects: &[PlacedObject]) -> Result<()> {
    let count = i32::try_from(objects.len()).map_err(|_| ProtocolError::BufferOverflow {
        needed: objects.len() * PLACED_OBJECT_WIRE_SIZE,
        available: 0,
    })?;
    writer.write_int(count)?;
    for object in objects {
        writer
            .write_int(object.location_index)?
            .write_int(object.tile_index)?;
    }
    Ok(())
}

fn read_objects(reader: &mut PacketReader<'_>) -> Result<Vec<PlacedObject>> {
    let count = reader.read_int()?;
    // A count the remaining bytes cannot possibly hold is rejected before allocating
    let fits = usize::try_from(count)
        .map(|n| n.saturating_mul(PLACED_OBJECT_WIRE_SIZE) <= reader.remaining())
        .unwrap_or(false);
    if !fits {
        return Err(ProtocolError::InvalidCount(count));
    }

    let mut objects = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let location_index = reader.read_int()?;
        let tile_index = reader.read_int()?;
        objects.push(PlacedObject {
            location_index,
            tile_index,
        });
    }
    Ok(objects)
}
