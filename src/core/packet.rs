//! # Packet
//!
//! Fixed-capacity, self-describing binary packets.
//!
//! ## Wire Format
//! ```text
//! [PacketType(1)] ( [DataType(1)] [Length(1)] [Payload(Length)] )*
//! ```
//!
//! A packet never exceeds [`MAX_PACKET_SIZE`] bytes. Integers are 4 bytes,
//! little-endian; strings are ASCII with a one-byte length.
//!
//! Packets are built with a [`PacketWriter`] and parsed with a [`PacketReader`]
//! borrowed from a finished [`Packet`], so a single packet is never both
//! written to and parsed.

use crate::error::{ProtocolError, Result};
use std::fmt;

/// Hard ceiling on the encoded size of a packet, type byte included
pub const MAX_PACKET_SIZE: usize = 256;

/// Width of an encoded integer payload
pub const INT_WIDTH: u8 = 4;

/// Longest string a single field can declare
pub const MAX_STRING_LEN: usize = u8::MAX as usize;

/// Per-field overhead: data type tag plus length byte
const FIELD_HEADER: usize = 2;

/// Packet kinds understood by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Identity exchange: the sender's display name
    InitPeerData = 0,
    /// Host tells clients the game has started
    StartGame = 1,
    /// Client asks the host to move its player
    MoveRequest = 2,
    /// Host sends the full board for a round
    InitBoard = 3,
    /// Host replicates a resolved player move
    PlayerMove = 4,
}

impl PacketType {
    /// Parse a packet type from its wire byte
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(PacketType::InitPeerData),
            1 => Ok(PacketType::StartGame),
            2 => Ok(PacketType::MoveRequest),
            3 => Ok(PacketType::InitBoard),
            4 => Ok(PacketType::PlayerMove),
            other => Err(ProtocolError::UnknownPacketType(other)),
        }
    }

    /// Wire byte for this packet type
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Human-readable name, used in logs
    pub fn name(self) -> &'static str {
        match self {
            PacketType::InitPeerData => "INIT_PEER_DATA",
            PacketType::StartGame => "START_GAME",
            PacketType::MoveRequest => "MOVE_REQUEST",
            PacketType::InitBoard => "INIT_BOARD",
            PacketType::PlayerMove => "PLAYER_MOVE",
        }
    }
}

/// Tag preceding every field in a packet body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DataType {
    Integer = 0,
    String = 1,
}

impl DataType {
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(DataType::Integer),
            1 => Ok(DataType::String),
            other => Err(ProtocolError::UnknownDataType(other)),
        }
    }
}

/// A single decoded field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Int(i32),
    Str(String),
}

/// An encoded packet, either freshly written or received off the wire.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    packet_type: PacketType,
    buf: [u8; MAX_PACKET_SIZE],
    len: usize,
}

impl Packet {
    fn empty(packet_type: PacketType) -> Self {
        let mut buf = [0u8; MAX_PACKET_SIZE];
        buf[0] = packet_type.as_byte();
        Self {
            packet_type,
            buf,
            len: 1,
        }
    }

    /// Wrap the exact byte range received for one packet.
    ///
    /// Only the type byte and the size are validated here; fields are checked
    /// as they are read.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(ProtocolError::EmptyPacket);
        }
        if bytes.len() > MAX_PACKET_SIZE {
            return Err(ProtocolError::OversizedPacket(bytes.len()));
        }

        let packet_type = PacketType::from_byte(bytes[0])?;
        let mut buf = [0u8; MAX_PACKET_SIZE];
        buf[..bytes.len()].copy_from_slice(bytes);

        Ok(Self {
            packet_type,
            buf,
            len: bytes.len(),
        })
    }

    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    /// Encoded bytes, exactly as sent on the wire
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    /// Encoded length including the type byte
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the packet carries no fields after its type byte
    pub fn is_empty(&self) -> bool {
        self.len <= 1
    }

    /// Sequential reader over the packet body
    pub fn reader(&self) -> PacketReader<'_> {
        PacketReader {
            body: &self.buf[1..self.len],
            cursor: 0,
        }
    }

    /// Decode every field in order
    pub fn fields(&self) -> Result<Vec<Field>> {
        let mut reader = self.reader();
        let mut fields = Vec::new();
        while !reader.is_exhausted() {
            fields.push(reader.read_field()?);
        }
        Ok(fields)
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("type", &self.packet_type.name())
            .field("len", &self.len)
            .finish()
    }
}

/// Appends tagged fields to a new packet.
///
/// A write that would exceed [`MAX_PACKET_SIZE`] fails without modifying the
/// packet.
#[derive(Debug, Clone)]
pub struct PacketWriter {
    packet: Packet,
}

impl PacketWriter {
    /// Start a packet; the type byte is written exactly once, here
    pub fn new(packet_type: PacketType) -> Self {
        Self {
            packet: Packet::empty(packet_type),
        }
    }

    fn reserve(&self, payload_len: usize) -> Result<usize> {
        let needed = FIELD_HEADER + payload_len;
        let available = MAX_PACKET_SIZE - self.packet.len;
        if needed > available {
            return Err(ProtocolError::BufferOverflow { needed, available });
        }
        Ok(self.packet.len)
    }

    fn put_field(&mut self, data_type: DataType, payload: &[u8]) -> Result<()> {
        let start = self.reserve(payload.len())?;
        let buf = &mut self.packet.buf;
        buf[start] = data_type as u8;
        buf[start + 1] = payload.len() as u8;
        buf[start + FIELD_HEADER..start + FIELD_HEADER + payload.len()].copy_from_slice(payload);
        self.packet.len = start + FIELD_HEADER + payload.len();
        Ok(())
    }

    pub fn write_int(&mut self, value: i32) -> Result<&mut Self> {
        self.put_field(DataType::Integer, &value.to_le_bytes())?;
        Ok(self)
    }

    pub fn write_string(&mut self, value: &str) -> Result<&mut Self> {
        if !value.is_ascii() {
            return Err(ProtocolError::NonAsciiString);
        }
        if value.len() > MAX_STRING_LEN {
            return Err(ProtocolError::StringTooLong(value.len()));
        }
        self.put_field(DataType::String, value.as_bytes())?;
        Ok(self)
    }

    pub fn write_field(&mut self, field: &Field) -> Result<&mut Self> {
        match field {
            Field::Int(value) => self.write_int(*value),
            Field::Str(value) => self.write_string(value),
        }
    }

    /// Bytes written so far, type byte included
    pub fn len(&self) -> usize {
        self.packet.len
    }

    /// True until the first field is written
    pub fn is_empty(&self) -> bool {
        self.packet.is_empty()
    }

    pub fn finish(self) -> Packet {
        self.packet
    }
}

/// Sequential, read-only cursor over a packet body.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    body: &'a [u8],
    cursor: usize,
}

impl<'a> PacketReader<'a> {
    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.body.len() - self.cursor
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Tag of the next field without consuming it
    pub fn peek_data_type(&self) -> Option<Result<DataType>> {
        self.body.get(self.cursor).map(|tag| DataType::from_byte(*tag))
    }

    /// Validate the next field's header and return its payload.
    /// The cursor only moves once the whole field is known to be present.
    fn take_field(&mut self, expected: DataType) -> Result<&'a [u8]> {
        let available = self.remaining();
        if available < FIELD_HEADER {
            return Err(ProtocolError::Truncated {
                needed: FIELD_HEADER,
                available,
            });
        }

        let body = self.body;
        let tag = body[self.cursor];
        if DataType::from_byte(tag)? != expected {
            return Err(ProtocolError::TagMismatch {
                expected,
                found: tag,
            });
        }

        let len = body[self.cursor + 1] as usize;
        let start = self.cursor + FIELD_HEADER;
        if body.len() - start < len {
            return Err(ProtocolError::Truncated {
                needed: len,
                available: body.len() - start,
            });
        }

        self.cursor = start + len;
        Ok(&body[start..start + len])
    }

    pub fn read_int(&mut self) -> Result<i32> {
        let before = self.cursor;
        let payload = self.take_field(DataType::Integer)?;
        let bytes: [u8; INT_WIDTH as usize] = match payload.try_into() {
            Ok(bytes) => bytes,
            Err(_) => {
                self.cursor = before;
                return Err(ProtocolError::InvalidIntegerWidth(payload.len() as u8));
            }
        };
        Ok(i32::from_le_bytes(bytes))
    }

    pub fn read_string(&mut self) -> Result<String> {
        let before = self.cursor;
        let payload = self.take_field(DataType::String)?;
        if !payload.is_ascii() {
            self.cursor = before;
            return Err(ProtocolError::NonAsciiString);
        }
        // ASCII is always valid UTF-8
        Ok(payload.iter().map(|b| *b as char).collect())
    }

    /// Read whichever field comes next
    pub fn read_field(&mut self) -> Result<Field> {
        match self.peek_data_type() {
            None => Err(ProtocolError::Truncated {
                needed: FIELD_HEADER,
                available: 0,
            }),
            Some(Err(e)) => Err(e),
            Some(Ok(DataType::Integer)) => self.read_int().map(Field::Int),
            Some(Ok(DataType::String)) => self.read_string().map(Field::Str),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn test_type_byte_is_first() {
        let packet = PacketWriter::new(PacketType::PlayerMove).finish();
        assert_eq!(packet.as_bytes(), &[PacketType::PlayerMove.as_byte()]);
        assert_eq!(packet.len(), 1);
        assert!(packet.is_empty());
    }

    #[test]
    fn test_first_field_makes_packet_non_empty() {
        let mut writer = PacketWriter::new(PacketType::MoveRequest);
        assert!(writer.is_empty());
        writer.write_int(1).unwrap();
        assert!(!writer.is_empty());
        assert!(!writer.finish().is_empty());
    }

    #[test]
    fn test_int_layout() {
        let mut writer = PacketWriter::new(PacketType::MoveRequest);
        writer.write_int(0x0102_0304).unwrap();
        let packet = writer.finish();
        assert_eq!(packet.as_bytes(), &[2, 0, 4, 0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_string_layout() {
        let mut writer = PacketWriter::new(PacketType::InitPeerData);
        writer.write_string("ab").unwrap();
        assert_eq!(writer.finish().as_bytes(), &[0, 1, 2, b'a', b'b']);
    }

    #[test]
    fn test_overflow_leaves_packet_untouched() {
        let mut writer = PacketWriter::new(PacketType::InitBoard);
        // 1 + 42 * 6 = 253 bytes
        for i in 0..42 {
            writer.write_int(i).unwrap();
        }
        assert_eq!(writer.len(), 253);

        let err = writer.write_int(99).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::BufferOverflow {
                needed: 6,
                available: 3
            }
        ));
        assert_eq!(writer.len(), 253);

        // a one-byte string still fits exactly
        writer.write_string("x").unwrap();
        assert_eq!(writer.len(), MAX_PACKET_SIZE);
    }

    #[test]
    fn test_tag_mismatch_does_not_advance() {
        let mut writer = PacketWriter::new(PacketType::InitPeerData);
        writer.write_int(7).unwrap();
        let packet = writer.finish();

        let mut reader = packet.reader();
        let err = reader.read_string().unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::TagMismatch {
                expected: DataType::String,
                found: 0
            }
        ));
        assert_eq!(reader.read_int().unwrap(), 7);
        assert!(reader.is_exhausted());
    }

    #[test]
    fn test_truncated_payload() {
        // declares 4 bytes, carries 2
        let packet = Packet::from_bytes(&[2, 0, 4, 1, 2]).unwrap();
        let err = packet.reader().read_int().unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Truncated {
                needed: 4,
                available: 2
            }
        ));
    }

    #[test]
    fn test_wrong_int_width_rejected() {
        let packet = Packet::from_bytes(&[2, 0, 2, 1, 2]).unwrap();
        let mut reader = packet.reader();
        assert!(matches!(
            reader.read_int(),
            Err(ProtocolError::InvalidIntegerWidth(2))
        ));
        assert_eq!(reader.remaining(), 4);
    }

    #[test]
    fn test_from_bytes_validation() {
        assert!(matches!(
            Packet::from_bytes(&[]),
            Err(ProtocolError::EmptyPacket)
        ));
        assert!(matches!(
            Packet::from_bytes(&[200]),
            Err(ProtocolError::UnknownPacketType(200))
        ));
        assert!(matches!(
            Packet::from_bytes(&[0u8; MAX_PACKET_SIZE + 1]),
            Err(ProtocolError::OversizedPacket(257))
        ));
    }

    #[test]
    fn test_non_ascii_rejected_both_ways() {
        let mut writer = PacketWriter::new(PacketType::InitPeerData);
        assert!(matches!(
            writer.write_string("n\u{f6}"),
            Err(ProtocolError::NonAsciiString)
        ));

        let packet = Packet::from_bytes(&[0, 1, 1, 0xC3]).unwrap();
        assert!(matches!(
            packet.reader().read_string(),
            Err(ProtocolError::NonAsciiString)
        ));
    }
}
