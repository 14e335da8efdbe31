//! Election coordinator.
//!
//! [`SyncCoordinator`] feeds probe results into the [`Election`] planner and
//! hands every planned [`SyncAction`] to a [`TransportDriver`], one at a time
//! and in order. It is the single writer of the elected address: the
//! scheduler owns it by value, so evaluations never overlap.
//!
//! # Evaluation
//!
//! 1. Probe candidates in rank order; the first reachable one is best,
//!    the local address if none is
//! 2. Unchanged best: nothing happens
//! 3. Changed best: apply the shutdown and start actions, then probe every
//!    candidate ranked after the new best and send each reachable one a
//!    `Notify` naming the new primary
//!
//! The initial selection at construction runs steps 1-3 without the
//! notifications.

use async_trait::async_trait;
use mastersync_core::{Address, Election, SyncAction, Transition};
use mastersync_runtime::Prober;
use tracing::{debug, info};

/// Executes transport actions planned by the election.
///
/// Implementations handle failures themselves: an action that cannot be
/// carried out is logged and never aborts the evaluation.
#[async_trait]
pub trait TransportDriver: Send + Sync {
    /// Applies one action.
    async fn apply(&mut self, action: SyncAction);
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// The elected address did not change.
    Unchanged {
        /// The (still) elected address.
        best: Address,
    },
    /// The elected address changed.
    Switched {
        /// The previously elected address.
        from: Option<Address>,
        /// The newly elected address.
        to: Address,
        /// Outranked candidates that were sent a notification.
        notified: Vec<Address>,
    },
}

/// Drives the election for one node.
pub struct SyncCoordinator<P, D> {
    election: Election,
    prober: P,
    driver: D,
}

impl<P, D> SyncCoordinator<P, D>
where
    P: Prober,
    D: TransportDriver,
{
    /// Runs the initial selection and starts the matching transports.
    ///
    /// No notifications are sent at startup.
    pub async fn start(
        candidates: impl IntoIterator<Item = Address> + Send,
        local: Address,
        prober: P,
        driver: D,
    ) -> Self {
        let mut coordinator = Self {
            election: Election::new(candidates, local),
            prober,
            driver,
        };

        let best = coordinator.select_best().await;
        info!(
            best = %best,
            local = %coordinator.election.local(),
            candidates = coordinator.election.candidates().len(),
            "Initial primary selected"
        );

        if let Transition::Switched { actions, .. } = coordinator.election.advance(best) {
            coordinator.apply_all(actions).await;
        }
        coordinator
    }

    /// Returns the first reachable candidate in rank order, or the local
    /// address if none is reachable.
    ///
    /// Probes stop at the first reachable candidate.
    pub async fn select_best(&self) -> Address {
        let mut reachable = None;
        for candidate in self.election.candidates() {
            if self.prober.is_online(candidate).await {
                reachable = Some(candidate);
                break;
            }
            debug!(candidate = %candidate, "Candidate offline");
        }
        self.election.best_or_local(reachable)
    }

    /// Re-evaluates the primary and follows it if it changed.
    pub async fn evaluate(&mut self) -> Evaluation {
        let best = self.select_best().await;

        let (from, actions) = match self.election.advance(best.clone()) {
            Transition::Unchanged => return Evaluation::Unchanged { best },
            Transition::Switched { from, actions } => (from, actions),
        };

        info!(
            from = ?from.as_ref().map(Address::as_str),
            to = %best,
            role = ?self.election.role(),
            "Primary changed"
        );
        self.apply_all(actions).await;

        let outranked: Vec<Address> = self.election.outranked(&best).cloned().collect();
        let mut notified = Vec::new();
        for target in outranked {
            if !self.prober.is_online(&target).await {
                continue;
            }
            self.driver
                .apply(SyncAction::Notify {
                    target: target.clone(),
                    primary: best.clone(),
                })
                .await;
            notified.push(target);
        }

        Evaluation::Switched {
            from,
            to: best,
            notified,
        }
    }

    /// Returns the election state.
    #[must_use]
    pub const fn election(&self) -> &Election {
        &self.election
    }

    /// Returns the prober.
    #[must_use]
    pub const fn prober(&self) -> &P {
        &self.prober
    }

    /// Returns the transport driver.
    #[must_use]
    pub const fn driver(&self) -> &D {
        &self.driver
    }

    /// Returns the transport driver mutably.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    async fn apply_all(&mut self, actions: Vec<SyncAction>) {
        for action in actions {
            debug!(action = ?action, "Applying sync action");
            self.driver.apply(action).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct StaticProber {
        online: Mutex<HashSet<String>>,
        probes: Mutex<Vec<String>>,
    }

    impl StaticProber {
        fn with_online(hosts: &[&str]) -> Self {
            let prober = Self::default();
            prober.set_online(hosts);
            prober
        }

        fn set_online(&self, hosts: &[&str]) {
            *self.online.lock().unwrap() = hosts.iter().map(|h| (*h).to_string()).collect();
        }
    }

    #[async_trait]
    impl Prober for StaticProber {
        async fn is_online(&self, address: &Address) -> bool {
            self.probes.lock().unwrap().push(address.to_string());
            self.online.lock().unwrap().contains(address.as_str())
        }
    }

    #[derive(Default)]
    struct Recording(Vec<SyncAction>);

    #[async_trait]
    impl TransportDriver for Recording {
        async fn apply(&mut self, action: SyncAction) {
            self.0.push(action);
        }
    }

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn roots(hosts: &[&str]) -> Vec<Address> {
        hosts.iter().map(|h| addr(h)).collect()
    }

    #[tokio::test]
    async fn test_start_as_primary_starts_server_only() {
        let sync = SyncCoordinator::start(
            roots(&["host3", "host1", "host2"]),
            addr("host1"),
            StaticProber::with_online(&["host1", "host2", "host3"]),
            Recording::default(),
        )
        .await;

        assert_eq!(sync.election().elected(), Some(&addr("host1")));
        assert_eq!(
            sync.driver().0,
            vec![SyncAction::StartServer {
                connect_to: addr("host1")
            }]
        );
    }

    #[tokio::test]
    async fn test_start_as_follower_sends_no_notifications() {
        let sync = SyncCoordinator::start(
            roots(&["host1", "host2", "host3"]),
            addr("host3"),
            StaticProber::with_online(&["host2", "host3"]),
            Recording::default(),
        )
        .await;

        assert_eq!(
            sync.driver().0,
            vec![SyncAction::StartClient {
                target: addr("host2")
            }]
        );
    }

    #[tokio::test]
    async fn test_probing_stops_at_first_online() {
        let sync = SyncCoordinator::start(
            roots(&["host1", "host2", "host3"]),
            addr("host2"),
            StaticProber::with_online(&["host1", "host2", "host3"]),
            Recording::default(),
        )
        .await;

        assert_eq!(*sync.prober().probes.lock().unwrap(), vec!["host1".to_string()]);
    }

    #[tokio::test]
    async fn test_unchanged_evaluation_applies_nothing() {
        let mut sync = SyncCoordinator::start(
            roots(&["host1", "host2"]),
            addr("host2"),
            StaticProber::with_online(&["host1", "host2"]),
            Recording::default(),
        )
        .await;
        sync.driver_mut().0.clear();

        assert_eq!(sync.evaluate().await, Evaluation::Unchanged { best: addr("host1") });
        assert_eq!(sync.evaluate().await, Evaluation::Unchanged { best: addr("host1") });
        assert!(sync.driver().0.is_empty());
    }

    #[tokio::test]
    async fn test_failover_notifies_outranked_online_candidates() {
        let mut sync = SyncCoordinator::start(
            roots(&["host3", "host1", "host2"]),
            addr("host1"),
            StaticProber::with_online(&["host1", "host2", "host3"]),
            Recording::default(),
        )
        .await;
        sync.driver_mut().0.clear();

        sync.prober().set_online(&["host2", "host3"]);
        let evaluation = sync.evaluate().await;

        assert_eq!(
            evaluation,
            Evaluation::Switched {
                from: Some(addr("host1")),
                to: addr("host2"),
                notified: vec![addr("host3")],
            }
        );
        assert_eq!(
            sync.driver().0,
            vec![
                SyncAction::ShutdownServer,
                SyncAction::ShutdownClient,
                SyncAction::StartClient {
                    target: addr("host2")
                },
                SyncAction::Notify {
                    target: addr("host3"),
                    primary: addr("host2")
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_nothing_online_falls_back_to_local() {
        let sync = SyncCoordinator::start(
            roots(&["host1", "host2"]),
            addr("10.0.0.9"),
            StaticProber::default(),
            Recording::default(),
        )
        .await;

        assert_eq!(sync.select_best().await, addr("10.0.0.9"));
        assert_eq!(
            sync.driver().0,
            vec![SyncAction::StartServer {
                connect_to: addr("10.0.0.9")
            }]
        );
    }
}
