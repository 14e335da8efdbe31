//! Socket plumbing shared by clients, servers, probes and notifiers.
//!
//! Outbound connections resolve `host:port` at connect time so candidate
//! hosts may be names or literals. Listeners are created through `socket2`
//! with `SO_REUSEADDR` so a demoted primary can be re-promoted quickly
//! without waiting out `TIME_WAIT`.

use std::net::SocketAddr;
use std::time::Duration;

use socket2::{Domain, SockRef, Socket, Type};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};

use crate::codec::CodecError;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to bind to address.
    #[error("failed to bind to {addr}: {source}")]
    BindFailed {
        /// The address we tried to bind.
        addr: SocketAddr,
        /// The underlying error.
        source: std::io::Error,
    },

    /// Failed to connect to a remote address.
    #[error("failed to connect to {addr}: {source}")]
    ConnectFailed {
        /// The remote address.
        addr: String,
        /// The underlying error.
        source: std::io::Error,
    },

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection is gone.
    #[error("connection closed")]
    Closed,
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Connects to `addr` (`host:port`) with a bounded timeout.
///
/// The timeout covers name resolution and the TCP handshake.
///
/// # Errors
/// Returns `ConnectFailed` on resolution failure, refusal, or timeout.
pub async fn connect(addr: &str, timeout: Duration, keep_alive: bool) -> TransportResult<TcpStream> {
    let connect_future = async {
        let mut addrs = tokio::net::lookup_host(addr).await?;
        let resolved = addrs.next().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no addresses found for {addr}"),
            )
        })?;
        TcpStream::connect(resolved).await
    };

    match tokio::time::timeout(timeout, connect_future).await {
        Ok(Ok(stream)) => {
            configure_stream(&stream, keep_alive)?;
            Ok(stream)
        }
        Ok(Err(e)) => Err(TransportError::ConnectFailed {
            addr: addr.to_string(),
            source: e,
        }),
        Err(_) => Err(TransportError::ConnectFailed {
            addr: addr.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connection timed out"),
        }),
    }
}

/// Applies per-connection socket options.
pub(crate) fn configure_stream(stream: &TcpStream, keep_alive: bool) -> std::io::Result<()> {
    stream.set_nodelay(true)?;
    SockRef::from(stream).set_keepalive(keep_alive)
}

/// Creates a TCP listener with `SO_REUSEADDR` enabled.
pub(crate) fn create_reusable_listener(addr: SocketAddr, backlog: u32) -> std::io::Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(i32::try_from(backlog).unwrap_or(i32::MAX))?;

    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener)
}
