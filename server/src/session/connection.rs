//! Individual client connection handling

use lithium_shared::codec::{self, CodecError, FrameDecoder};
use lithium_shared::protocol::{ClientMessage, ServerMessage};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Handle to queue replies for a specific client
///
/// Sending never blocks, so it is safe from dispatcher subscriber callbacks.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: u64,
    pub addr: SocketAddr,
    pub connected_at: Instant,
    outbound: mpsc::UnboundedSender<ServerMessage>,
}

impl SessionHandle {
    pub fn new(id: u64, addr: SocketAddr, outbound: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            outbound,
        }
    }

    /// Queue a message; returns false once the client has gone away
    pub fn send(&self, message: ServerMessage) -> bool {
        self.outbound.send(message).is_ok()
    }
}

/// Read side of a client connection
///
/// The write side is owned by a background task fed through the
/// [`SessionHandle`].
pub struct ClientConnection {
    handle: SessionHandle,
    reader: OwnedReadHalf,
    decoder: FrameDecoder,
    read_buf: Vec<u8>,
}

impl ClientConnection {
    pub fn new(stream: TcpStream, addr: SocketAddr, id: u64) -> Self {
        let (reader, writer) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(write_loop(writer, rx, addr));

        Self {
            handle: SessionHandle::new(id, addr, tx),
            reader,
            decoder: FrameDecoder::new(),
            read_buf: vec![0u8; 4096],
        }
    }

    /// Get a cloneable handle for sending messages
    pub fn get_handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Read the next request from this client
    /// Returns None if the connection is closed or the stream is corrupt
    pub async fn recv(&mut self) -> Option<ClientMessage> {
        loop {
            // First try to decode from existing buffer
            match self.decoder.decode_next::<ClientMessage>() {
                Ok(Some(message)) => return Some(message),
                Ok(None) => {}
                Err(CodecError::Json(e)) => {
                    // The bad frame was consumed; the stream is still aligned
                    warn!("Malformed request from {}: {}", self.handle.addr, e);
                    self.handle.send(ServerMessage::Error {
                        request_id: None,
                        message: format!("malformed request: {}", e),
                    });
                    continue;
                }
                Err(e) => {
                    error!("Decode error from {}: {}", self.handle.addr, e);
                    return None;
                }
            }

            match self.reader.read(&mut self.read_buf).await {
                Ok(0) => return None,
                Ok(n) => self.decoder.extend(&self.read_buf[..n]),
                Err(e) => {
                    warn!("Read error from {}: {}", self.handle.addr, e);
                    return None;
                }
            }
        }
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<ServerMessage>,
    addr: SocketAddr,
) {
    while let Some(message) = rx.recv().await {
        let encoded = match codec::encode(&message) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!("Failed to encode reply for {}: {}", addr, e);
                continue;
            }
        };

        if let Err(e) = writer.write_all(&encoded).await {
            warn!("Write error to {}: {}", addr, e);
            break;
        }
    }
    debug!("Writer for {} finished", addr);
}
