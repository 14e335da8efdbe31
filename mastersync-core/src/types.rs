//! Candidate addresses and their ordering key.
//!
//! Addresses are ranked by a polynomial string hash rather than by their text,
//! so the ranking carries no meaning beyond being identical on every node.
//! The text only breaks hash collisions, which keeps the order total.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Maximum length of a host string in bytes.
pub const MAX_ADDRESS_LEN: usize = 253;

/// A candidate node, identified by its host string.
///
/// `Ord` follows [`Address::ordering_hash`] first and the host text second.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Creates an address from a host string.
    ///
    /// # Errors
    /// Returns an error if the host is empty, too long, or contains whitespace.
    pub fn new(host: impl Into<String>) -> Result<Self> {
        let host = host.into();
        if host.is_empty() {
            return Err(Error::InvalidAddress {
                address: host,
                reason: "empty host",
            });
        }
        if host.len() > MAX_ADDRESS_LEN {
            return Err(Error::InvalidAddress {
                address: host,
                reason: "host longer than 253 bytes",
            });
        }
        if host.chars().any(char::is_whitespace) {
            return Err(Error::InvalidAddress {
                address: host,
                reason: "contains whitespace",
            });
        }
        Ok(Self(host))
    }

    /// Returns the host string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the 32-bit ordering hash.
    ///
    /// `h = s[0]*31^(n-1) + ... + s[n-1]` over UTF-16 code units with wrapping
    /// signed arithmetic.
    #[must_use]
    pub fn ordering_hash(&self) -> i32 {
        self.0
            .encode_utf16()
            .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)))
    }

    /// Formats `host:port`, bracketing bare IPv6 literals.
    #[must_use]
    pub fn with_port(&self, port: u16) -> String {
        if self.0.contains(':') && !self.0.starts_with('[') {
            format!("[{}]:{port}", self.0)
        } else {
            format!("{}:{port}", self.0)
        }
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ordering_hash()
            .cmp(&other.ordering_hash())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Address {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "addr({})", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
