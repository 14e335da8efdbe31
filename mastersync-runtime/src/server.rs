//! Reliable listening server with automatic restart.
//!
//! A [`NetServer`] binds a TCP listener and runs every accepted connection on
//! its own task with the pipeline built by `on_channel_creation`.
//!
//! # Restart Policy
//!
//! When a bind fails, or a bound listener ends for any reason other than
//! [`NetServer::shutdown`], the server waits `restart_delay` and binds again,
//! as long as `auto_restart` is set. The stop flag is checked after every
//! close, so a shutdown always wins over a pending restart.
//!
//! # State
//!
//! ```text
//! Unbound -> Binding -> Listening -> Closing -> (restart delay) -> Binding
//!                \                      \
//!                 +--> (restart delay)   +--> Stopped (shutdown or no restart)
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::ServerOptions;
use crate::connection::{self, stopped, FrameSender, Pipeline};
use crate::hooks::ServerHooks;
use crate::transport::{configure_stream, create_reusable_listener, TransportError};

/// Lifecycle state of a [`NetServer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Not started.
    Unbound,
    /// Bind in progress.
    Binding,
    /// Accepting connections.
    Listening {
        /// The bound address.
        local_addr: SocketAddr,
    },
    /// The listener ended; connections are being torn down.
    Closing,
    /// Terminal: the server will not bind again.
    Stopped,
}

/// How a bound listener ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerClose {
    /// [`NetServer::shutdown`] was called.
    Shutdown,
    /// Accepting failed.
    Failed {
        /// Error description.
        reason: String,
    },
}

/// Reliable listening server.
///
/// Dropping the server has the same effect as [`NetServer::shutdown`].
pub struct NetServer {
    listen_addr: SocketAddr,
    options: ServerOptions,
    hooks: Arc<dyn ServerHooks>,
    shutdown: watch::Sender<bool>,
    state: Arc<watch::Sender<ServerState>>,
    task: Option<JoinHandle<()>>,
}

impl NetServer {
    /// Creates a server for `listen_addr`. Nothing is bound until
    /// [`NetServer::start`].
    #[must_use]
    pub fn new(listen_addr: SocketAddr, options: ServerOptions, hooks: Arc<dyn ServerHooks>) -> Self {
        let (shutdown, _) = watch::channel(false);
        let (state, _) = watch::channel(ServerState::Unbound);
        Self {
            listen_addr,
            options,
            hooks,
            shutdown,
            state: Arc::new(state),
            task: None,
        }
    }

    /// Spawns the server's task and returns immediately.
    ///
    /// Calling `start` twice, or after `shutdown`, does nothing.
    pub fn start(&mut self) {
        if self.task.is_some() || *self.shutdown.borrow() {
            warn!(
                name = self.hooks.display_name(),
                addr = %self.listen_addr,
                "Server already started or shut down"
            );
            return;
        }

        let task = ServerTask {
            listen_addr: self.listen_addr,
            options: self.options.clone(),
            hooks: Arc::clone(&self.hooks),
            state: Arc::clone(&self.state),
            shutdown: self.shutdown.subscribe(),
        };
        self.task = Some(tokio::spawn(task.run()));
    }

    /// Closes the listener and all its connections for good. Idempotent.
    pub fn shutdown(&self) {
        if !self.shutdown.send_replace(true) {
            info!(
                name = self.hooks.display_name(),
                addr = %self.listen_addr,
                "Server is shutting down"
            );
        }
    }

    /// Waits for the server's task to finish.
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Returns the bound address while listening.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self.state() {
            ServerState::Listening { local_addr } => Some(local_addr),
            _ => None,
        }
    }

    /// Waits until the server is listening, returning the bound address, or
    /// `None` if it stopped first.
    pub async fn wait_listening(&self) -> Option<SocketAddr> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|s| matches!(s, ServerState::Listening { .. } | ServerState::Stopped))
            .await
            .ok()
            .map(|s| *s)?;
        match state {
            ServerState::Listening { local_addr } => Some(local_addr),
            _ => None,
        }
    }
}

impl Drop for NetServer {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

/// State owned by the server's task.
struct ServerTask {
    listen_addr: SocketAddr,
    options: ServerOptions,
    hooks: Arc<dyn ServerHooks>,
    state: Arc<watch::Sender<ServerState>>,
    shutdown: watch::Receiver<bool>,
}

impl ServerTask {
    async fn run(mut self) {
        let name = self.hooks.display_name().to_string();

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            self.state.send_replace(ServerState::Binding);
            match create_reusable_listener(self.listen_addr, self.options.backlog) {
                Ok(listener) => {
                    let local_addr = listener.local_addr().unwrap_or(self.listen_addr);
                    self.state.send_replace(ServerState::Listening { local_addr });
                    info!(name = %name, addr = %local_addr, "Server is listening");
                    self.hooks.on_start(local_addr).await;

                    let close = serve(
                        listener,
                        &self.options,
                        &self.hooks,
                        &mut self.shutdown,
                    )
                    .await;

                    self.state.send_replace(ServerState::Closing);
                    if let ListenerClose::Failed { reason } = &close {
                        warn!(name = %name, addr = %local_addr, reason = %reason, "Listener failed");
                    }
                    self.hooks.on_close(&close).await;
                }
                Err(source) => {
                    let e = TransportError::BindFailed {
                        addr: self.listen_addr,
                        source,
                    };
                    error!(name = %name, error = %e, "Server failed to start");
                }
            }

            if *self.shutdown.borrow() {
                break;
            }
            if !self.options.auto_restart {
                info!(name = %name, "Server is down, not restarting");
                break;
            }

            warn!(
                name = %name,
                delay_ms = u64::try_from(self.options.restart_delay.as_millis()).unwrap_or(u64::MAX),
                "Server is down, restarting"
            );
            tokio::select! {
                () = tokio::time::sleep(self.options.restart_delay) => {}
                () = stopped(&mut self.shutdown) => break,
            }
        }

        self.state.send_replace(ServerState::Stopped);
        debug!(name = %name, "Server task finished");
    }
}

/// Accepts connections until shutdown or an accept error.
///
/// Every connection task is aborted before this returns.
async fn serve(
    listener: TcpListener,
    options: &ServerOptions,
    hooks: &Arc<dyn ServerHooks>,
    shutdown: &mut watch::Receiver<bool>,
) -> ListenerClose {
    let mut connections = JoinSet::new();

    let close = loop {
        tokio::select! {
            () = stopped(shutdown) => break ListenerClose::Shutdown,

            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => break ListenerClose::Failed { reason: e.to_string() },
                };
                if let Err(e) = configure_stream(&stream, options.keep_alive) {
                    warn!(peer = %peer, error = %e, "Failed to configure connection");
                    continue;
                }
                debug!(name = hooks.display_name(), peer = %peer, "Accepted connection");

                let mut pipeline = Pipeline::default();
                hooks.on_channel_creation(&mut pipeline);
                let (sender, outbound) = FrameSender::channel(peer);
                let conn_shutdown = shutdown.clone();
                connections.spawn(async move {
                    let result = connection::drive(stream, pipeline, sender, outbound, conn_shutdown).await;
                    debug!(peer = %peer, result = ?result, "Connection ended");
                });
            }

            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    };

    connections.shutdown().await;
    close
}
