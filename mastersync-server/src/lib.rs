//! Mastersync node.
//!
//! This crate ties the election planner to the transports: the
//! [`SyncCoordinator`] probes candidates and plans transitions, the
//! [`NetworkDriver`] runs the resulting sync server and client, and the
//! [`scheduler`] re-evaluates on a fixed period for the life of the process.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod driver;
pub mod scheduler;
pub mod sync;

pub use config::{ConfigError, NodeConfig, SyncSettings};
pub use driver::{ActiveTransports, ControlEvent, NetworkDriver};
pub use scheduler::SchedulerHandle;
pub use sync::{Evaluation, SyncCoordinator, TransportDriver};
