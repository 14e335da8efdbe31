//! Geometric reconnect backoff.

use std::time::Duration;

use crate::config::ReconnectConfig;

/// Reconnect delay state for one client.
///
/// The first delay is the floor; every later delay is the previous one times
/// the multiplier, capped at the ceiling. The state is never reset: a fresh
/// client gets a fresh `Backoff`.
#[derive(Debug, Clone)]
pub struct Backoff {
    floor: Duration,
    ceiling: Duration,
    multiplier: f64,
    current: Option<Duration>,
}

impl Backoff {
    /// Creates unset backoff state from a reconnect config.
    #[must_use]
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            floor: config.floor,
            ceiling: config.ceiling,
            multiplier: config.multiplier,
            current: None,
        }
    }

    /// Returns the last delay handed out, or `None` if unset.
    #[must_use]
    pub const fn current(&self) -> Option<Duration> {
        self.current
    }

    /// Advances the state and returns the next delay.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn next_delay(&mut self) -> Duration {
        let next = match self.current {
            None => self.floor.min(self.ceiling),
            Some(previous) => {
                let scaled = previous.as_nanos() as f64 * self.multiplier;
                if scaled >= self.ceiling.as_nanos() as f64 {
                    self.ceiling
                } else {
                    Duration::from_nanos(scaled as u64)
                }
            }
        };
        self.current = Some(next);
        next
    }
}
