//! Length-prefixed framing for packets on a TCP stream.
//!
//! ```text
//! [Length(2, big-endian)] [Packet(Length)]
//! ```
//!
//! A frame carries exactly one packet. `Length` must be within
//! `1..=MAX_PACKET_SIZE`; anything else means the stream is out of sync.

use crate::core::packet::{Packet, MAX_PACKET_SIZE};
use crate::error::{ProtocolError, Result};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Size of the frame length prefix
pub const FRAME_HEADER_SIZE: usize = 2;

/// Largest frame that can appear on the wire
pub const MAX_FRAME_SIZE: usize = FRAME_HEADER_SIZE + MAX_PACKET_SIZE;

#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>> {
        if src.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let len = u16::from_be_bytes([src[0], src[1]]) as usize;
        if len == 0 || len > MAX_PACKET_SIZE {
            return Err(ProtocolError::InvalidFrameLength(len));
        }

        if src.len() < FRAME_HEADER_SIZE + len {
            src.reserve(FRAME_HEADER_SIZE + len - src.len());
            return Ok(None);
        }

        src.advance(FRAME_HEADER_SIZE);
        Ok(Some(src.split_to(len)))
    }
}

impl Encoder<&Packet> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, packet: &Packet, dst: &mut BytesMut) -> Result<()> {
        let bytes = packet.as_bytes();
        if bytes.is_empty() || bytes.len() > MAX_PACKET_SIZE {
            return Err(ProtocolError::OversizedPacket(bytes.len()));
        }

        dst.reserve(FRAME_HEADER_SIZE + bytes.len());
        dst.put_u16(bytes.len() as u16);
        dst.extend_from_slice(bytes);
        Ok(())
    }
}
