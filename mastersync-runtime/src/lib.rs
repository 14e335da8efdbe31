//! Mastersync Runtime - reliable TCP transport.
//!
//! This crate provides the networking that the election runs on: clients
//! that reconnect with exponential backoff, servers that rebind after
//! unexpected failure, length-prefixed framing, liveness probes and one-shot
//! notifications.
//!
//! # Overview
//!
//! - [`NetClient`]: one outbound connection with reconnect policy
//! - [`NetServer`]: listener with restart policy and per-connection tasks
//! - [`ClientHooks`] / [`ServerHooks`]: lifecycle callbacks for the owner
//! - [`FrameCodec`]: `[length][payload]` framing, [`SyncMessage`] payloads
//! - [`probe`]: bounded connect-and-close liveness checks
//! - [`notify`]: fire-and-forget single-frame delivery
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mastersync_runtime::{NetClient, ReconnectConfig};
//!
//! let mut client = NetClient::new("host1:6350", ReconnectConfig::default(), Arc::new(hooks));
//! client.start();
//! // ...
//! client.shutdown();
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod backoff;
mod client;
mod codec;
mod config;
mod connection;
mod hooks;
pub mod notify;
pub mod probe;
mod server;
mod transport;

pub use backoff::Backoff;
pub use client::NetClient;
pub use codec::{CodecError, CodecResult, FrameCodec, LengthField, SyncMessage};
pub use config::{ConfigError, ReconnectConfig, ServerOptions};
pub use connection::{CloseResult, DiscardHandler, FrameHandler, FrameSender, Pipeline};
pub use hooks::{ClientHooks, ServerHooks};
pub use probe::{Prober, TcpProber};
pub use server::{ListenerClose, NetServer, ServerState};
pub use transport::{connect, TransportError, TransportResult};
