//! # Connection
//!
//! One TCP connection to a remote peer.
//!
//! Reads are non-blocking and best-effort: the I/O loop calls
//! [`Connection::read_available`] once per cycle and then pulls complete frames
//! out of the connection's buffer with [`Connection::next_frame`]. Writes send a
//! whole frame before returning.

use crate::core::codec::{FrameCodec, MAX_FRAME_SIZE};
use crate::core::packet::Packet;
use crate::error::{ProtocolError, Result};
use bytes::BytesMut;
use socket2::SockRef;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::net::{TcpSocket, TcpStream};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, instrument, trace};

/// Bytes pulled from the socket per `try_read` call
const READ_CHUNK: usize = 1024;

/// Stop reading for this cycle once this much is buffered
const MAX_BUFFERED: usize = 16 * MAX_FRAME_SIZE;

/// Result of draining whatever the socket had ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// Connection still open; `bytes` were appended to the read buffer
    Open { bytes: usize },
    /// Remote closed its side after sending `bytes` more bytes
    Eof { bytes: usize },
}

#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer_addr: SocketAddr,
    read_buf: Mutex<BytesMut>,
    closed: AtomicBool,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Result<Self> {
        let peer_addr = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            peer_addr,
            read_buf: Mutex::new(BytesMut::with_capacity(MAX_FRAME_SIZE)),
            closed: AtomicBool::new(false),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn buffer(&self) -> Result<std::sync::MutexGuard<'_, BytesMut>> {
        self.read_buf.lock().map_err(|_| ProtocolError::LockPoisoned)
    }

    /// Append every byte the socket has ready without waiting for more.
    pub fn read_available(&self) -> Result<ReadStatus> {
        if self.is_closed() {
            return Err(ProtocolError::ConnectionClosed);
        }

        let mut buf = self.buffer()?;
        let mut chunk = [0u8; READ_CHUNK];
        let mut total = 0;

        while buf.len() < MAX_BUFFERED {
            match self.stream.try_read(&mut chunk) {
                Ok(0) => return Ok(ReadStatus::Eof { bytes: total }),
                Ok(n) => {
                    buf.extend_from_slice(&chunk[..n]);
                    total += n;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if total > 0 {
            trace!(peer = %self.peer_addr, bytes = total, "Read from socket");
        }
        Ok(ReadStatus::Open { bytes: total })
    }

    /// Pop the next complete frame from the read buffer.
    ///
    /// A framing error means the stream is out of sync, so everything buffered
    /// is discarded before the error is returned.
    pub fn next_frame(&self) -> Result<Option<BytesMut>> {
        let mut buf = self.buffer()?;
        match FrameCodec.decode(&mut *buf) {
            Ok(frame) => Ok(frame),
            Err(e) => {
                debug!(peer = %self.peer_addr, discarded = buf.len(), "Discarding unframed bytes");
                buf.clear();
                Err(e)
            }
        }
    }

    /// Write one framed packet, returning the number of bytes put on the wire.
    pub async fn send_packet(&self, packet: &Packet) -> Result<usize> {
        if self.is_closed() {
            return Err(ProtocolError::ConnectionClosed);
        }

        let mut frame = BytesMut::with_capacity(MAX_FRAME_SIZE);
        FrameCodec.encode(packet, &mut frame)?;

        let mut written = 0;
        while written < frame.len() {
            self.stream.writable().await?;
            match self.stream.try_write(&frame[written..]) {
                Ok(0) => return Err(ProtocolError::ConnectionClosed),
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => continue,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(written)
    }

    /// Shut the socket down in both directions. Only the first call has any
    /// effect; returns whether this call performed the close.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }

        if let Err(e) = SockRef::from(&self.stream).shutdown(Shutdown::Both) {
            // the remote may already be gone
            debug!(peer = %self.peer_addr, error = %e, "Socket shutdown failed");
        }
        debug!(peer = %self.peer_addr, "Connection closed");
        true
    }
}

/// Dial `remote`, optionally from a fixed local port.
#[instrument(skip(timeout))]
pub async fn connect(
    remote: SocketAddr,
    local_port: Option<u16>,
    timeout: Duration,
) -> Result<Connection> {
    let socket = if remote.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };

    if let Some(port) = local_port {
        socket.set_reuseaddr(true)?;
        let local = if remote.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, port))
        };
        socket.bind(local)?;
    }

    let stream = tokio::time::timeout(timeout, socket.connect(remote))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    Connection::new(stream)
}
