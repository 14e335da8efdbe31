//! Mastersync Core - Addresses and the deterministic primary election planner.
//!
//! This crate holds the parts of primary election that do no I/O:
//!
//! - [`Address`]: a candidate node, ordered by a stable hash-like key that
//!   every node computes identically for the same host string
//! - [`Election`]: the ranked candidate set plus the elected address, turning
//!   each newly selected best address into an ordered list of [`SyncAction`]s
//!
//! Probing and transports live in `mastersync-runtime`; the async coordinator
//! that feeds probe results into [`Election`] lives in `mastersync-server`.
//!
//! # Example
//!
//! ```
//! use mastersync_core::{Address, Election, SyncAction, Transition};
//!
//! let local: Address = "host1".parse().unwrap();
//! let roots = ["host3", "host1", "host2"].map(|h| h.parse::<Address>().unwrap());
//!
//! let mut election = Election::new(roots, local.clone());
//! assert_eq!(election.candidates()[0], local);
//!
//! match election.advance(local.clone()) {
//!     Transition::Switched { actions, .. } => {
//!         assert_eq!(actions, vec![SyncAction::StartServer { connect_to: local }]);
//!     }
//!     Transition::Unchanged => unreachable!(),
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod election;
mod error;
mod types;

pub use election::{Election, Role, SyncAction, Transition};
pub use error::{Error, Result};
pub use types::Address;
