//! # Error Types
//!
//! Error handling for the session and wire-protocol layer.
//!
//! This module defines every error variant that can surface from the packet codec,
//! the peer registry, the transport, and the session state machine.
//!
//! ## Error Categories
//! - **I/O Errors**: bind, connect, read and write failures
//! - **Codec Errors**: buffer overflow, tag mismatch, truncated fields, unknown types
//! - **Validation Errors**: out-of-range directions, peer ids and object counts
//! - **Session Errors**: registry capacity, precondition violations, bad addresses
//! - **Configuration Errors**: unreadable or invalid configuration
//!
//! Codec errors only ever fail the decode of a single packet; the I/O loop logs them
//! and keeps running.
//!
//! ## Example Usage
//! ```rust
//! use turnlink::core::packet::{PacketType, PacketWriter};
//! use turnlink::error::{ProtocolError, Result};
//!
//! fn identity_packet(name: &str) -> Result<Vec<u8>> {
//!     let mut writer = PacketWriter::new(PacketType::InitPeerData);
//!     writer.write_string(name)?;
//!     Ok(writer.finish().to_bytes())
//! }
//!
//! assert!(identity_packet("alice").is_ok());
//! assert!(matches!(
//!     identity_packet("caf\u{e9}"),
//!     Err(ProtocolError::NonAsciiString)
//! ));
//! ```

use crate::core::packet::DataType;
use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Synchronization errors
    pub const ERR_LOCK_POISONED: &str = "Synchronization primitive poisoned";

    /// Session precondition messages
    pub const ERR_NOT_HOST: &str = "Operation is only valid on the hosting peer";
    pub const ERR_NOT_CLIENT: &str = "Operation is only valid on a joined client";
    pub const ERR_NOT_ACTIVE: &str = "Session is not active";
    pub const ERR_SENDER_IS_HOST: &str = "Move requests must not originate from the host";
    pub const ERR_SENDER_NOT_HOST: &str = "Packet is only accepted from the host";
    pub const ERR_LOCAL_WITH_CONNECTION: &str = "Local peers cannot own a connection";
    pub const ERR_CONNECTION_ATTACHED: &str = "Peer already owns a connection";
    pub const ERR_NO_LOCAL_PEER: &str = "No local peer registered";
    pub const ERR_NO_HOST_PEER: &str = "No host peer registered";
    pub const ERR_NO_CONNECTION: &str = "Recipient has no live connection";
}

/// Primary error type for all session and protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Packet buffer overflow: need {needed} bytes, {available} available")]
    BufferOverflow { needed: usize, available: usize },

    #[error("Field tag mismatch: expected {expected:?}, found {found}")]
    TagMismatch { expected: DataType, found: u8 },

    #[error("Truncated field: need {needed} bytes, {available} remaining")]
    Truncated { needed: usize, available: usize },

    #[error("Invalid integer width: {0} bytes")]
    InvalidIntegerWidth(u8),

    #[error("String too long: {0} bytes (maximum 255)")]
    StringTooLong(usize),

    #[error("String contains non-ASCII characters")]
    NonAsciiString,

    #[error("Unknown packet type: {0}")]
    UnknownPacketType(u8),

    #[error("Unknown data type tag: {0}")]
    UnknownDataType(u8),

    #[error("Empty packet")]
    EmptyPacket,

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Invalid frame length: {0}")]
    InvalidFrameLength(usize),

    #[error("Unexpected trailing data: {0} bytes")]
    TrailingBytes(usize),

    #[error("Invalid movement direction: {0}")]
    InvalidDirection(i32),

    #[error("Invalid object count: {0}")]
    InvalidCount(i32),

    #[error("Invalid peer id: {0}")]
    InvalidPeer(i64),

    #[error("Peer registry is full ({0} peers)")]
    RegistryFull(usize),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Precondition violated: {0}")]
    Precondition(&'static str),

    #[error("Unexpected message type")]
    UnexpectedMessage,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Synchronization primitive poisoned")]
    LockPoisoned,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    /// Whether this error came from decoding bytes received off the wire.
    ///
    /// Decode errors are confined to a single packet and never end the I/O loop.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            ProtocolError::TagMismatch { .. }
                | ProtocolError::Truncated { .. }
                | ProtocolError::InvalidIntegerWidth(_)
                | ProtocolError::NonAsciiString
                | ProtocolError::UnknownPacketType(_)
                | ProtocolError::UnknownDataType(_)
                | ProtocolError::EmptyPacket
                | ProtocolError::OversizedPacket(_)
                | ProtocolError::InvalidFrameLength(_)
                | ProtocolError::TrailingBytes(_)
                | ProtocolError::InvalidDirection(_)
                | ProtocolError::InvalidCount(_)
                | ProtocolError::InvalidPeer(_)
        )
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
