//! Network transport driver.
//!
//! [`NetworkDriver`] turns [`SyncAction`]s into real [`NetServer`] and
//! [`NetClient`] instances. The live instances sit in [`ActiveTransports`],
//! shared with the process shutdown path.
//!
//! # Sync links
//!
//! - The primary runs a sync server on the coordination port. Once it is
//!   bound, the server's `on_start` hook starts a client to the primary
//!   itself, so every node (primary included) follows the primary the same way.
//! - A follower runs only a client to the primary.
//! - Clients greet the server with `Hello { address }`.
//! - A server that receives `Destroy { primary }` forwards a
//!   [`ControlEvent::StandDown`] to the scheduler.
//!
//! The shared lock is never held across a join: `on_start` takes the same
//! lock to install its client, and a server being shut down may be inside
//! `on_start`.

use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use mastersync_core::{Address, SyncAction};
use mastersync_runtime::notify::send_once;
use mastersync_runtime::{
    ClientHooks, CloseResult, FrameHandler, FrameSender, ListenerClose, NetClient, NetServer,
    Pipeline, ServerHooks, SyncMessage,
};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::config::SyncSettings;
use crate::sync::TransportDriver;

/// Bound on waiting for a shut-down transport's task to finish.
const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Events from the transports to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    /// Another node told this one that `primary` is now elected.
    StandDown {
        /// The primary named by the notice.
        primary: Address,
    },
}

#[derive(Default)]
struct Slots {
    server: Option<NetServer>,
    client: Option<NetClient>,
}

/// The server and client currently running for this node.
///
/// Either may be absent; absence means "not running".
#[derive(Clone, Default)]
pub struct ActiveTransports {
    slots: Arc<Mutex<Slots>>,
}

impl ActiveTransports {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn downgrade(&self) -> Weak<Mutex<Slots>> {
        Arc::downgrade(&self.slots)
    }

    /// Returns the bound address of the sync server, if one is listening.
    pub async fn server_addr(&self) -> Option<SocketAddr> {
        self.slots.lock().await.server.as_ref().and_then(NetServer::local_addr)
    }

    /// Returns true if a sync server is present.
    pub async fn has_server(&self) -> bool {
        self.slots.lock().await.server.is_some()
    }

    /// Returns the target of the sync client, if one is present.
    pub async fn client_target(&self) -> Option<String> {
        self.slots
            .lock()
            .await
            .client
            .as_ref()
            .map(|client| client.target().to_string())
    }

    /// Returns true if the sync client has a live connection.
    pub async fn is_client_connected(&self) -> bool {
        self.slots
            .lock()
            .await
            .client
            .as_ref()
            .is_some_and(NetClient::is_connected)
    }

    async fn install_server(&self, server: NetServer) {
        let previous = self.slots.lock().await.server.replace(server);
        if let Some(mut previous) = previous {
            warn!("Replacing a running sync server");
            stop_server(&mut previous).await;
        }
    }

    async fn install_client(&self, client: NetClient) {
        let previous = self.slots.lock().await.client.replace(client);
        if let Some(mut previous) = previous {
            stop_client(&mut previous).await;
        }
    }

    async fn take_server(&self) -> Option<NetServer> {
        self.slots.lock().await.server.take()
    }

    async fn take_client(&self) -> Option<NetClient> {
        self.slots.lock().await.client.take()
    }

    /// Shuts down whatever is running and waits for it to finish.
    pub async fn shutdown_all(&self) {
        match self.take_client().await {
            Some(mut client) => stop_client(&mut client).await,
            None => debug!("Sync client not running"),
        }
        match self.take_server().await {
            Some(mut server) => stop_server(&mut server).await,
            None => debug!("Sync server not running"),
        }
        // The server's on_start may have installed a client while it stopped.
        if let Some(mut client) = self.take_client().await {
            stop_client(&mut client).await;
        }
    }
}

async fn stop_server(server: &mut NetServer) {
    server.shutdown();
    if tokio::time::timeout(SHUTDOWN_JOIN_TIMEOUT, server.join()).await.is_err() {
        warn!("Sync server did not stop in time");
    }
}

async fn stop_client(client: &mut NetClient) {
    client.shutdown();
    if tokio::time::timeout(SHUTDOWN_JOIN_TIMEOUT, client.join()).await.is_err() {
        warn!(remote = client.target(), "Sync client did not stop in time");
    }
}

/// Executes sync actions against real sockets.
pub struct NetworkDriver {
    settings: Arc<SyncSettings>,
    transports: ActiveTransports,
    control: mpsc::Sender<ControlEvent>,
}

impl NetworkDriver {
    /// Creates a driver. Stand-down notices received by the sync server are
    /// sent on `control`.
    #[must_use]
    pub fn new(settings: SyncSettings, control: mpsc::Sender<ControlEvent>) -> Self {
        Self {
            settings: Arc::new(settings),
            transports: ActiveTransports::new(),
            control,
        }
    }

    /// Returns a handle to the running transports.
    #[must_use]
    pub fn transports(&self) -> ActiveTransports {
        self.transports.clone()
    }

    /// Returns the settings.
    #[must_use]
    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    fn start_client(settings: &SyncSettings, endpoint: String) -> NetClient {
        let hooks = SyncClientHooks {
            name: format!("sync-client({endpoint})"),
            settings: settings.clone(),
        };
        let mut client = NetClient::new(endpoint, settings.reconnect.clone(), Arc::new(hooks));
        client.start();
        client
    }
}

#[async_trait]
impl TransportDriver for NetworkDriver {
    async fn apply(&mut self, action: SyncAction) {
        match action {
            SyncAction::ShutdownServer => match self.transports.take_server().await {
                Some(mut server) => stop_server(&mut server).await,
                None => debug!("Sync server not running"),
            },
            SyncAction::ShutdownClient => match self.transports.take_client().await {
                Some(mut client) => stop_client(&mut client).await,
                None => debug!("Sync client not running"),
            },
            SyncAction::StartServer { connect_to } => {
                let hooks = SyncServerHooks {
                    settings: Arc::clone(&self.settings),
                    transports: self.transports.downgrade(),
                    connect_to,
                    handler: Arc::new(SyncFrameHandler {
                        control: self.control.clone(),
                    }),
                };
                let mut server = NetServer::new(
                    self.settings.listen_addr(),
                    self.settings.server.clone(),
                    Arc::new(hooks),
                );
                server.start();
                self.transports.install_server(server).await;
            }
            SyncAction::StartClient { target } => {
                let client = Self::start_client(&self.settings, self.settings.endpoint(&target));
                self.transports.install_client(client).await;
            }
            SyncAction::Notify { target, primary } => {
                let endpoint = self.settings.endpoint(&target);
                let payload = SyncMessage::Destroy {
                    primary: primary.clone(),
                }
                .encode();
                let codec = self.settings.codec;
                let timeout = self.settings.notify_timeout;

                tokio::spawn(async move {
                    match send_once(&endpoint, &payload, &codec, timeout).await {
                        Ok(()) => info!(remote = %endpoint, primary = %primary, "Sent stand-down notice"),
                        Err(e) => warn!(remote = %endpoint, error = %e, "Failed to send stand-down notice"),
                    }
                });
            }
        }
    }
}

/// Hooks for the primary's sync server.
struct SyncServerHooks {
    settings: Arc<SyncSettings>,
    transports: Weak<Mutex<Slots>>,
    connect_to: Address,
    handler: Arc<SyncFrameHandler>,
}

#[async_trait]
impl ServerHooks for SyncServerHooks {
    fn display_name(&self) -> &str {
        "sync-server"
    }

    fn on_channel_creation(&self, pipeline: &mut Pipeline) {
        pipeline
            .framing(self.settings.codec)
            .handler(Arc::clone(&self.handler) as Arc<dyn FrameHandler>);
    }

    async fn on_start(&self, local_addr: SocketAddr) {
        let Some(slots) = self.transports.upgrade() else {
            return;
        };
        let endpoint = self.connect_to.with_port(local_addr.port());
        info!(addr = %local_addr, remote = %endpoint, "Sync server started, connecting to self");

        let client = NetworkDriver::start_client(&self.settings, endpoint);
        ActiveTransports { slots }.install_client(client).await;
    }

    async fn on_close(&self, close: &ListenerClose) {
        match close {
            ListenerClose::Shutdown => info!("Sync server closed"),
            ListenerClose::Failed { reason } => warn!(reason = %reason, "Sync server closed unexpectedly"),
        }
    }
}

/// Hooks for a sync client following the primary.
struct SyncClientHooks {
    name: String,
    settings: SyncSettings,
}

#[async_trait]
impl ClientHooks for SyncClientHooks {
    fn display_name(&self) -> &str {
        &self.name
    }

    fn on_channel_creation(&self, pipeline: &mut Pipeline) {
        let hello = SyncMessage::Hello {
            address: self.settings.local.clone(),
        };
        pipeline.framing(self.settings.codec).greet(hello.encode());
    }

    async fn on_close(&self, result: &CloseResult) {
        debug!(name = %self.name, result = ?result, "Sync connection closed");
    }
}

/// Handles frames arriving at the sync server.
struct SyncFrameHandler {
    control: mpsc::Sender<ControlEvent>,
}

#[async_trait]
impl FrameHandler for SyncFrameHandler {
    async fn on_frame(&self, frame: Bytes, reply: &FrameSender) {
        match SyncMessage::decode(&frame) {
            Ok(SyncMessage::Hello { address }) => {
                info!(peer = %reply.peer_addr(), address = %address, "Follower connected");
            }
            Ok(SyncMessage::Destroy { primary }) => {
                info!(peer = %reply.peer_addr(), primary = %primary, "Received stand-down notice");
                if self.control.send(ControlEvent::StandDown { primary }).await.is_err() {
                    debug!("Scheduler gone, dropping stand-down notice");
                }
            }
            Err(e) => warn!(peer = %reply.peer_addr(), error = %e, "Invalid sync message"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn free_port() -> u16 {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    }

    fn driver(port: u16) -> (NetworkDriver, mpsc::Receiver<ControlEvent>) {
        let (tx, rx) = mpsc::channel(8);
        let settings = SyncSettings::fast_for_testing(Address::new("127.0.0.1").unwrap(), port);
        (NetworkDriver::new(settings, tx), rx)
    }

    async fn eventually<F, Fut>(mut check: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..200 {
            if check().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_start_server_connects_to_self() {
        let port = free_port();
        let (mut driver, _rx) = driver(port);
        let transports = driver.transports();

        driver
            .apply(SyncAction::StartServer {
                connect_to: Address::new("127.0.0.1").unwrap(),
            })
            .await;

        assert!(eventually(|| transports.is_client_connected()).await);
        assert_eq!(transports.server_addr().await.map(|a| a.port()), Some(port));
        assert_eq!(transports.client_target().await, Some(format!("127.0.0.1:{port}")));

        transports.shutdown_all().await;
        assert!(!transports.has_server().await);
        assert_eq!(transports.client_target().await, None);
    }

    #[tokio::test]
    async fn test_destroy_frame_becomes_stand_down() {
        let port = free_port();
        let (mut driver, mut rx) = driver(port);
        let transports = driver.transports();
        let local = Address::new("127.0.0.1").unwrap();

        driver
            .apply(SyncAction::StartServer {
                connect_to: local.clone(),
            })
            .await;
        assert!(eventually(|| async { transports.server_addr().await.is_some() }).await);

        let primary = Address::new("host2").unwrap();
        driver
            .apply(SyncAction::Notify {
                target: local,
                primary: primary.clone(),
            })
            .await;

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, ControlEvent::StandDown { primary });

        transports.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_shutdown_actions_tolerate_absence() {
        let (mut driver, _rx) = driver(free_port());
        driver.apply(SyncAction::ShutdownServer).await;
        driver.apply(SyncAction::ShutdownClient).await;
        driver.transports().shutdown_all().await;
    }
}
