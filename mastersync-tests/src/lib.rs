//! Mastersync Tests - simulation and integration tests.
//!
//! Tests are organized by component:
//!
//! ## Test Organization
//!
//! **Simulation Tests**: election on a simulated network, no sockets
//! - `election_tests`: ranking and selection properties over seeded random
//!   candidate sets
//! - `failover_tests`: multi-node failover, recovery and notification
//!   scenarios
//!
//! **Integration Tests**: real loopback sockets
//! - `transport_tests`: client/server lifecycle, reconnect backoff,
//!   notifications, and a lone node serving itself
//!
//! **Support Modules**:
//! - `simulated`: shared reachability, recording driver, simulated cluster
//! - `scenarios`: standard host sets and regression seeds
//!
//! ## Naming Conventions
//!
//! - Integration tests: `test_<component>_<scenario>`
//! - Unit tests: Inline in each crate under `#[cfg(test)]`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod scenarios;
pub mod simulated;
