//! Lifecycle hooks supplied by the owner of a client or server.
//!
//! The transport calls these at fixed points and never inspects what they do.
//! Owners use them for sequencing (e.g. start a client once the server is
//! bound), not for error recovery: failures are handled inside the transport.
//!
//! # Design
//!
//! Hooks are a capability object composed over the concrete [`NetClient`] and
//! [`NetServer`] types rather than methods on a base type:
//! - `display_name`: name used in logs
//! - `on_channel_creation`: install framing and a frame handler per connection
//! - `on_start` (server only): the listener is bound
//! - `on_close`: a connection (client) or listener (server) ended
//!
//! [`NetClient`]: crate::NetClient
//! [`NetServer`]: crate::NetServer

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;

use crate::connection::{CloseResult, Pipeline};
use crate::server::ListenerClose;

/// Hooks for a [`NetClient`](crate::NetClient).
///
/// Implementations must be `Send + Sync` since they are invoked from the
/// client's own task.
#[async_trait]
pub trait ClientHooks: Send + Sync + 'static {
    /// Name used in logs.
    fn display_name(&self) -> &str;

    /// Configures the pipeline of a freshly connected channel.
    fn on_channel_creation(&self, pipeline: &mut Pipeline);

    /// Called after an established connection ends, before any reconnect.
    async fn on_close(&self, result: &CloseResult);

    /// Called when a reconnect is scheduled after `delay`.
    fn on_reconnect(&self, _delay: Duration) {}
}

/// Hooks for a [`NetServer`](crate::NetServer).
#[async_trait]
pub trait ServerHooks: Send + Sync + 'static {
    /// Name used in logs.
    fn display_name(&self) -> &str;

    /// Configures the pipeline of each accepted channel.
    fn on_channel_creation(&self, pipeline: &mut Pipeline);

    /// Called after each successful bind, with the bound address.
    async fn on_start(&self, local_addr: SocketAddr);

    /// Called after a bound listener terminates.
    async fn on_close(&self, close: &ListenerClose);
}
