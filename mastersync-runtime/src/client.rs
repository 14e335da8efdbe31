//! Reliable outbound connection with reconnect backoff.
//!
//! A [`NetClient`] keeps one connection to a target `host:port`. It runs on
//! its own task, so a client sleeping through a backoff delay never stalls
//! other connections or the election loop.
//!
//! # Connection Lifecycle
//!
//! 1. Connect (bounded by `connect_timeout`)
//! 2. Build the pipeline via `on_channel_creation`, write greetings
//! 3. Run until the peer closes, an error occurs, or `shutdown()` is called
//! 4. Call `on_close`, then reconnect after a backoff delay if the policy
//!    allows it
//!
//! Connect failures always count as reconnect-worthy; a clean close by the
//! peer only does when `reconnect_on_clean_close` is set. `shutdown()` is
//! terminal: it wakes any pending connect or backoff wait and no reconnect
//! follows.

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::config::ReconnectConfig;
use crate::connection::{self, stopped, CloseResult, FrameSender, Pipeline};
use crate::hooks::ClientHooks;
use crate::transport::{self, TransportError};

/// Reliable client connection to one target address.
///
/// Dropping the client has the same effect as [`NetClient::shutdown`].
pub struct NetClient {
    /// Target `host:port`, resolved on every attempt.
    target: String,
    /// Reliability settings.
    config: ReconnectConfig,
    /// Owner-supplied hooks.
    hooks: Arc<dyn ClientHooks>,
    /// Terminal stop flag.
    shutdown: watch::Sender<bool>,
    /// Writer for the live connection, if any.
    link: Arc<watch::Sender<Option<FrameSender>>>,
    /// The client's task once started.
    task: Option<JoinHandle<()>>,
}

impl NetClient {
    /// Creates a client. Nothing happens until [`NetClient::start`].
    #[must_use]
    pub fn new(target: impl Into<String>, config: ReconnectConfig, hooks: Arc<dyn ClientHooks>) -> Self {
        let (shutdown, _) = watch::channel(false);
        let (link, _) = watch::channel(None);
        Self {
            target: target.into(),
            config,
            hooks,
            shutdown,
            link: Arc::new(link),
            task: None,
        }
    }

    /// Spawns the client's task and returns immediately.
    ///
    /// Calling `start` twice, or after `shutdown`, does nothing.
    pub fn start(&mut self) {
        if self.task.is_some() || *self.shutdown.borrow() {
            warn!(
                name = self.hooks.display_name(),
                remote = %self.target,
                "Client already started or shut down"
            );
            return;
        }

        let task = ClientTask {
            target: self.target.clone(),
            config: self.config.clone(),
            hooks: Arc::clone(&self.hooks),
            link: Arc::clone(&self.link),
            shutdown: self.shutdown.subscribe(),
        };
        self.task = Some(tokio::spawn(task.run()));
    }

    /// Closes the connection and stops the client for good. Idempotent.
    pub fn shutdown(&self) {
        if !self.shutdown.send_replace(true) {
            info!(
                name = self.hooks.display_name(),
                remote = %self.target,
                "Client is shutting down"
            );
        }
    }

    /// Waits for the client's task to finish.
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Returns true if the task was started and has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_some_and(JoinHandle::is_finished)
    }

    /// Returns the target `host:port`.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns a writer for the live connection, or `None` while disconnected.
    #[must_use]
    pub fn sender(&self) -> Option<FrameSender> {
        self.link.borrow().clone()
    }

    /// Returns true while a connection is established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.link.borrow().is_some()
    }
}

impl Drop for NetClient {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

/// State owned by the client's task.
struct ClientTask {
    target: String,
    config: ReconnectConfig,
    hooks: Arc<dyn ClientHooks>,
    link: Arc<watch::Sender<Option<FrameSender>>>,
    shutdown: watch::Receiver<bool>,
}

impl ClientTask {
    async fn run(mut self) {
        let mut backoff = Backoff::new(&self.config);

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let attempt = tokio::select! {
                result = transport::connect(
                    &self.target,
                    self.config.connect_timeout,
                    self.config.keep_alive,
                ) => result,
                () = stopped(&mut self.shutdown) => break,
            };

            let retry = match attempt {
                Ok(stream) => {
                    let result = self.session(stream).await;
                    self.hooks.on_close(&result).await;

                    match &result {
                        CloseResult::Shutdown => break,
                        CloseResult::Clean => {
                            info!(
                                name = self.hooks.display_name(),
                                remote = %self.target,
                                "Connection closed by peer"
                            );
                            self.config.auto_reconnect && self.config.reconnect_on_clean_close
                        }
                        CloseResult::Failed { reason } => {
                            warn!(
                                name = self.hooks.display_name(),
                                remote = %self.target,
                                reason = %reason,
                                "Connection failed"
                            );
                            self.config.auto_reconnect
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        name = self.hooks.display_name(),
                        remote = %self.target,
                        error = %e,
                        "Failed to connect"
                    );
                    self.config.auto_reconnect
                }
            };

            if !retry {
                info!(
                    name = self.hooks.display_name(),
                    remote = %self.target,
                    "Client is down, not reconnecting"
                );
                break;
            }

            let delay = backoff.next_delay();
            self.hooks.on_reconnect(delay);
            warn!(
                name = self.hooks.display_name(),
                remote = %self.target,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Client is down, reconnecting"
            );

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = stopped(&mut self.shutdown) => break,
            }
        }

        debug!(name = self.hooks.display_name(), remote = %self.target, "Client task finished");
    }

    /// Runs one established connection to completion.
    async fn session(&self, stream: TcpStream) -> CloseResult {
        let peer = match stream.peer_addr() {
            Ok(peer) => peer,
            Err(e) => return TransportError::Io(e).into(),
        };

        info!(
            name = self.hooks.display_name(),
            remote = %self.target,
            peer = %peer,
            "Connected"
        );

        let mut pipeline = Pipeline::default();
        self.hooks.on_channel_creation(&mut pipeline);

        let (sender, outbound) = FrameSender::channel(peer);
        self.link.send_replace(Some(sender.clone()));
        let result = connection::drive(stream, pipeline, sender, outbound, self.shutdown.clone()).await;
        self.link.send_replace(None);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct Recorder {
        closes: Mutex<Vec<CloseResult>>,
        delays: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl ClientHooks for Recorder {
        fn display_name(&self) -> &str {
            "test"
        }

        fn on_channel_creation(&self, _pipeline: &mut Pipeline) {}

        async fn on_close(&self, result: &CloseResult) {
            self.closes.lock().unwrap().push(result.clone());
        }

        fn on_reconnect(&self, delay: Duration) {
            self.delays.lock().unwrap().push(delay);
        }
    }

    fn unused_port() -> u16 {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_connects_and_reports_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hooks = Arc::new(Recorder::default());

        let mut client = NetClient::new(addr.to_string(), ReconnectConfig::fast_for_testing(), hooks.clone());
        client.start();
        let (_accepted, _) = listener.accept().await.unwrap();

        for _ in 0..50 {
            if client.is_connected() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(client.is_connected());
        assert!(client.sender().is_some());

        client.shutdown();
        client.join().await;
        assert!(!client.is_connected());
        assert_eq!(hooks.closes.lock().unwrap().as_slice(), &[CloseResult::Shutdown]);
        assert!(hooks.delays.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_reconnect_when_disabled() {
        let hooks = Arc::new(Recorder::default());
        let mut client = NetClient::new(
            format!("127.0.0.1:{}", unused_port()),
            ReconnectConfig::fast_for_testing().with_auto_reconnect(false),
            hooks.clone(),
        );
        client.start();

        tokio::time::timeout(Duration::from_secs(2), client.join())
            .await
            .unwrap();
        assert!(hooks.delays.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clean_close_without_reconnect_policy() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hooks = Arc::new(Recorder::default());

        let mut client = NetClient::new(
            addr.to_string(),
            ReconnectConfig::fast_for_testing().with_reconnect_on_clean_close(false),
            hooks.clone(),
        );
        client.start();

        let (accepted, _) = listener.accept().await.unwrap();
        drop(accepted);

        tokio::time::timeout(Duration::from_secs(2), client.join())
            .await
            .unwrap();
        assert_eq!(hooks.closes.lock().unwrap().as_slice(), &[CloseResult::Clean]);
        assert!(hooks.delays.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_backoff() {
        let hooks = Arc::new(Recorder::default());
        let config = ReconnectConfig::fast_for_testing().with_backoff(
            Duration::from_secs(60),
            Duration::from_secs(60),
            2.0,
        );
        let mut client = NetClient::new(format!("127.0.0.1:{}", unused_port()), config, hooks.clone());
        client.start();

        for _ in 0..100 {
            if !hooks.delays.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(hooks.delays.lock().unwrap().as_slice(), &[Duration::from_secs(60)]);

        client.shutdown();
        client.shutdown();
        tokio::time::timeout(Duration::from_secs(2), client.join())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_start_after_shutdown_is_ignored() {
        let hooks = Arc::new(Recorder::default());
        let mut client = NetClient::new("127.0.0.1:1", ReconnectConfig::fast_for_testing(), hooks);
        client.shutdown();
        client.start();
        assert!(!client.is_finished());
        client.join().await;
    }
}
