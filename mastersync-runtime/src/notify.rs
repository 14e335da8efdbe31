//! One-shot notifications.
//!
//! Opens a connection, writes a single frame, closes. No greeting, no
//! reconnect: the receiver either gets the frame now or never.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::codec::FrameCodec;
use crate::transport::{self, TransportResult};

/// Sends `payload` as one frame to `target` (`host:port`) and closes.
///
/// `timeout` bounds the connect; the write itself is bounded by the same
/// duration.
///
/// # Errors
/// Returns an error if the connect, encode or write fails.
pub async fn send_once(
    target: &str,
    payload: &[u8],
    codec: &FrameCodec,
    timeout: Duration,
) -> TransportResult<()> {
    let frame = codec.encode_to_bytes(payload)?;
    let mut stream = transport::connect(target, timeout, false).await?;

    let write = async {
        stream.write_all(&frame).await?;
        stream.flush().await?;
        stream.shutdown().await
    };
    tokio::time::timeout(timeout, write)
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "write timed out"))??;

    debug!(remote = %target, len = payload.len(), "Notification sent");
    Ok(())
}
