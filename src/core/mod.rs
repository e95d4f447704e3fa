//! # Core Protocol Components
//!
//! Low-level packet handling and stream framing.
//!
//! ## Components
//! - **Packet**: fixed-capacity typed packets with tagged integer/string fields
//! - **Codec**: Tokio codec that length-prefixes each packet on a byte stream
//!
//! ## Wire Format
//! ```text
//! [Length(2)] [PacketType(1)] ( [DataType(1)] [Len(1)] [Payload(Len)] )*
//! ```
//!
//! ## Limits
//! - Maximum packet size: 256 bytes, a hard ceiling rather than a growable buffer
//! - Frame lengths outside `1..=256` are rejected before any allocation

pub mod codec;
pub mod packet;
