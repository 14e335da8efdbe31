//! Per-connection pipeline and I/O loop.
//!
//! A [`Pipeline`] is assembled by the owner's `on_channel_creation` hook for
//! every new connection: it picks the [`FrameCodec`], the [`FrameHandler`]
//! that receives decoded frames, and any greeting frames written before the
//! first read. The I/O loop then runs on the connection's own task until the
//! peer closes, an error occurs, or the owning client/server shuts down.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::codec::{CodecError, FrameCodec};
use crate::transport::{TransportError, TransportResult};

/// Initial read buffer capacity (64 KiB).
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Maximum queued outbound frames per connection.
const MAX_PENDING_FRAMES: usize = 1024;

/// Receives decoded frames from a connection.
#[async_trait]
pub trait FrameHandler: Send + Sync + 'static {
    /// Handles one frame payload. `reply` writes back on the same connection.
    async fn on_frame(&self, frame: Bytes, reply: &FrameSender);
}

/// Handler that drops every frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardHandler;

#[async_trait]
impl FrameHandler for DiscardHandler {
    async fn on_frame(&self, frame: Bytes, reply: &FrameSender) {
        debug!(peer = %reply.peer_addr(), len = frame.len(), "Discarding frame");
    }
}

/// Connection setup assembled by `on_channel_creation`.
pub struct Pipeline {
    codec: FrameCodec,
    handler: Arc<dyn FrameHandler>,
    greetings: Vec<Bytes>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            codec: FrameCodec::default(),
            handler: Arc::new(DiscardHandler),
            greetings: Vec::new(),
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("codec", &self.codec)
            .field("greetings", &self.greetings.len())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Sets the frame codec.
    pub fn framing(&mut self, codec: FrameCodec) -> &mut Self {
        self.codec = codec;
        self
    }

    /// Sets the frame handler.
    pub fn handler(&mut self, handler: Arc<dyn FrameHandler>) -> &mut Self {
        self.handler = handler;
        self
    }

    /// Queues a payload to be written as soon as the connection is up.
    pub fn greet(&mut self, payload: Bytes) -> &mut Self {
        self.greetings.push(payload);
        self
    }

    /// Returns the configured codec.
    #[must_use]
    pub const fn codec(&self) -> &FrameCodec {
        &self.codec
    }
}

/// Handle for writing frames to a live connection.
#[derive(Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<Bytes>,
    peer: SocketAddr,
}

impl fmt::Debug for FrameSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSender").field("peer", &self.peer).finish()
    }
}

impl FrameSender {
    /// Creates a sender and the queue the I/O loop drains.
    pub(crate) fn channel(peer: SocketAddr) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(MAX_PENDING_FRAMES);
        (Self { tx, peer }, rx)
    }

    /// Queues a payload for the connection, waiting for queue space.
    ///
    /// # Errors
    /// Returns `Closed` if the connection has ended.
    pub async fn send(&self, payload: Bytes) -> TransportResult<()> {
        self.tx.send(payload).await.map_err(|_| TransportError::Closed)
    }

    /// Returns the remote address of the connection.
    #[must_use]
    pub const fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

/// How a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseResult {
    /// The peer closed the connection cleanly.
    Clean,
    /// The owning client or server shut down.
    Shutdown,
    /// The connection failed.
    Failed {
        /// Error description.
        reason: String,
    },
}

impl CloseResult {
    /// Returns true if the connection ended because of an error.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl From<TransportError> for CloseResult {
    fn from(err: TransportError) -> Self {
        Self::Failed {
            reason: err.to_string(),
        }
    }
}

/// Resolves once `shutdown` is set or its sender is gone.
pub(crate) async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Runs the connection until it closes.
pub(crate) async fn drive(
    stream: TcpStream,
    pipeline: Pipeline,
    sender: FrameSender,
    mut outbound: mpsc::Receiver<Bytes>,
    mut shutdown: watch::Receiver<bool>,
) -> CloseResult {
    let Pipeline {
        codec,
        handler,
        greetings,
    } = pipeline;
    let (mut reader, mut writer) = stream.into_split();

    for greeting in greetings {
        if let Err(e) = write_frame(&mut writer, &codec, &greeting).await {
            return e.into();
        }
    }

    let mut buffer = BytesMut::with_capacity(READ_BUFFER_SIZE);

    loop {
        tokio::select! {
            () = stopped(&mut shutdown) => {
                let _ = writer.shutdown().await;
                return CloseResult::Shutdown;
            }

            Some(payload) = outbound.recv() => {
                if let Err(e) = write_frame(&mut writer, &codec, &payload).await {
                    warn!(peer = %sender.peer_addr(), error = %e, "Failed to write frame");
                    return e.into();
                }
            }

            read = reader.read_buf(&mut buffer) => {
                match read {
                    Ok(0) => {
                        debug!(peer = %sender.peer_addr(), "Connection closed by peer");
                        return CloseResult::Clean;
                    }
                    Ok(_) => {}
                    Err(e) => return TransportError::Io(e).into(),
                }

                while !buffer.is_empty() {
                    match codec.decode(&buffer) {
                        Ok((frame, consumed)) => {
                            let _ = buffer.split_to(consumed);
                            handler.on_frame(frame, &sender).await;
                        }
                        Err(CodecError::InsufficientData { .. }) => break,
                        Err(e) => {
                            warn!(peer = %sender.peer_addr(), error = %e, "Failed to decode frame");
                            return TransportError::Codec(e).into();
                        }
                    }
                }

                // Prevent buffer from growing unbounded.
                if buffer.is_empty() && buffer.capacity() > READ_BUFFER_SIZE * 2 {
                    buffer = BytesMut::with_capacity(READ_BUFFER_SIZE);
                }
            }
        }
    }
}

async fn write_frame(
    writer: &mut tokio::net::tcp::OwnedWriteHalf,
    codec: &FrameCodec,
    payload: &[u8],
) -> TransportResult<()> {
    let frame = codec.encode_to_bytes(payload)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
