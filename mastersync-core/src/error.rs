//! Error types for Mastersync core operations.

use std::fmt;

/// The result type for Mastersync core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Mastersync core operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A candidate address could not be accepted.
    InvalidAddress {
        /// The rejected input.
        address: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAddress { address, reason } => {
                write!(f, "invalid address '{address}': {reason}")
            }
        }
    }
}

impl std::error::Error for Error {}
