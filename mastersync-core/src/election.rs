//! Deterministic primary election planner.
//!
//! The planner owns the ranked candidate set and the currently elected
//! address. It never probes anything itself: the caller selects the best
//! address (the first reachable candidate in rank order, or the local address
//! when none is reachable) and passes it to [`Election::advance`], which
//! returns the transport actions needed to follow the new primary.
//!
//! # Ordering of actions
//!
//! On a switch, shutdowns always come before starts so a node never has two
//! servers bound to the coordination port at once:
//!
//! 1. `ShutdownServer` if this node was the outgoing primary
//! 2. `ShutdownClient` for the client that followed the outgoing primary
//! 3. `StartServer` if this node is the incoming primary, else `StartClient`
//!
//! Demotion notices (`Notify`) are issued afterwards by the coordinator for
//! each reachable candidate in [`Election::outranked`].

use crate::types::Address;

/// The role this node plays for the currently elected address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// This node is the elected primary and runs the sync server.
    Primary,
    /// This node follows another primary with a sync client.
    Follower,
}

/// A transport action for the coordinator's driver to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// Shut down this node's sync server.
    ShutdownServer,
    /// Shut down the client following the previous primary.
    ShutdownClient,
    /// Start a sync server; once it is bound, start a client to `connect_to`.
    StartServer {
        /// Address the post-bind client connects to (this node).
        connect_to: Address,
    },
    /// Start a sync client following `target`.
    StartClient {
        /// The primary to follow.
        target: Address,
    },
    /// Tell `target` that `primary` is now the elected primary.
    Notify {
        /// The outranked candidate to notify.
        target: Address,
        /// The newly elected primary.
        primary: Address,
    },
}

/// Result of feeding a newly selected best address to the planner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The elected address did not change; nothing to do.
    Unchanged,
    /// The elected address changed.
    Switched {
        /// The previously elected address, if any.
        from: Option<Address>,
        /// Actions to execute in order.
        actions: Vec<SyncAction>,
    },
}

/// Ranked candidate set plus the currently elected address.
#[derive(Debug, Clone)]
pub struct Election {
    /// Candidates, sorted ascending by ordering key, without duplicates.
    candidates: Vec<Address>,
    /// This node's externally resolved address.
    local: Address,
    /// The currently elected primary, `None` before the first advance.
    elected: Option<Address>,
}

impl Election {
    /// Creates a planner over the given candidates.
    ///
    /// Candidates are sorted by ordering key once here and never re-sorted.
    #[must_use]
    pub fn new(candidates: impl IntoIterator<Item = Address>, local: Address) -> Self {
        let mut candidates: Vec<Address> = candidates.into_iter().collect();
        candidates.sort();
        candidates.dedup();

        Self {
            candidates,
            local,
            elected: None,
        }
    }

    /// Returns the candidates in rank order (lowest ordering key first).
    #[must_use]
    pub fn candidates(&self) -> &[Address] {
        &self.candidates
    }

    /// Returns this node's address, the fallback when nothing is reachable.
    #[must_use]
    pub const fn local(&self) -> &Address {
        &self.local
    }

    /// Returns the currently elected address.
    #[must_use]
    pub const fn elected(&self) -> Option<&Address> {
        self.elected.as_ref()
    }

    /// Returns this node's role, or `None` before the first advance.
    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.elected.as_ref().map(|elected| {
            if *elected == self.local {
                Role::Primary
            } else {
                Role::Follower
            }
        })
    }

    /// Turns the result of a rank-order scan into the best address.
    ///
    /// `first_reachable` is the first candidate, in [`Election::candidates`]
    /// order, that answered its probe. With no reachable candidate the local
    /// address wins.
    #[must_use]
    pub fn best_or_local(&self, first_reachable: Option<&Address>) -> Address {
        first_reachable.unwrap_or(&self.local).clone()
    }

    /// Records `best` as the elected address and plans the transport changes.
    pub fn advance(&mut self, best: Address) -> Transition {
        if self.elected.as_ref() == Some(&best) {
            return Transition::Unchanged;
        }

        let mut actions = Vec::with_capacity(3);
        if let Some(previous) = &self.elected {
            if *previous == self.local {
                actions.push(SyncAction::ShutdownServer);
            }
            actions.push(SyncAction::ShutdownClient);
        }

        if best == self.local {
            actions.push(SyncAction::StartServer {
                connect_to: best.clone(),
            });
        } else {
            actions.push(SyncAction::StartClient {
                target: best.clone(),
            });
        }

        let from = self.elected.replace(best);
        Transition::Switched { from, actions }
    }

    /// Returns the candidates ranked after `best`.
    ///
    /// These are the nodes that may still believe they are primary and must
    /// be told to stand down. `best` itself need not be a candidate (the
    /// local fallback), so the comparison is by ordering key.
    pub fn outranked<'a>(&'a self, best: &'a Address) -> impl Iterator<Item = &'a Address> + 'a {
        self.candidates.iter().filter(move |candidate| *candidate > best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn election(local: &str, roots: &[&str]) -> Election {
        Election::new(roots.iter().map(|r| addr(r)), addr(local))
    }

    #[test]
    fn test_candidates_ranked_and_deduplicated() {
        let e = election("host1", &["host3", "host1", "host2", "host1"]);
        assert_eq!(e.candidates(), &[addr("host1"), addr("host2"), addr("host3")]);
        assert_eq!(e.elected(), None);
        assert_eq!(e.role(), None);
    }

    #[test]
    fn test_best_is_first_reachable() {
        let e = election("host3", &["host3", "host1", "host2"]);
        let first = &e.candidates()[0];
        assert_eq!(e.best_or_local(Some(first)), addr("host1"));
    }

    #[test]
    fn test_best_falls_back_to_local() {
        let e = election("me", &["host1", "host2"]);
        assert_eq!(e.best_or_local(None), addr("me"));

        let empty = election("me", &[]);
        assert!(empty.candidates().is_empty());
        assert_eq!(empty.best_or_local(None), addr("me"));
    }

    #[test]
    fn test_initial_advance_as_primary() {
        let mut e = election("host1", &["host1", "host2"]);
        let transition = e.advance(addr("host1"));
        assert_eq!(
            transition,
            Transition::Switched {
                from: None,
                actions: vec![SyncAction::StartServer {
                    connect_to: addr("host1")
                }],
            }
        );
        assert_eq!(e.role(), Some(Role::Primary));
    }

    #[test]
    fn test_initial_advance_as_follower() {
        let mut e = election("host2", &["host1", "host2"]);
        let transition = e.advance(addr("host1"));
        assert_eq!(
            transition,
            Transition::Switched {
                from: None,
                actions: vec![SyncAction::StartClient {
                    target: addr("host1")
                }],
            }
        );
        assert_eq!(e.role(), Some(Role::Follower));
    }

    #[test]
    fn test_unchanged_best_plans_nothing() {
        let mut e = election("host2", &["host1", "host2"]);
        let _ = e.advance(addr("host1"));
        assert_eq!(e.advance(addr("host1")), Transition::Unchanged);
        assert_eq!(e.advance(addr("host1")), Transition::Unchanged);
    }

    #[test]
    fn test_demotion_shuts_server_down_first() {
        let mut e = election("host1", &["host1", "host2", "host3"]);
        let _ = e.advance(addr("host1"));

        let transition = e.advance(addr("host2"));
        assert_eq!(
            transition,
            Transition::Switched {
                from: Some(addr("host1")),
                actions: vec![
                    SyncAction::ShutdownServer,
                    SyncAction::ShutdownClient,
                    SyncAction::StartClient {
                        target: addr("host2")
                    },
                ],
            }
        );
        assert_eq!(e.role(), Some(Role::Follower));
    }

    #[test]
    fn test_promotion_replaces_client_with_server() {
        let mut e = election("host2", &["host1", "host2"]);
        let _ = e.advance(addr("host1"));

        let transition = e.advance(addr("host2"));
        assert_eq!(
            transition,
            Transition::Switched {
                from: Some(addr("host1")),
                actions: vec![
                    SyncAction::ShutdownClient,
                    SyncAction::StartServer {
                        connect_to: addr("host2")
                    },
                ],
            }
        );
        assert_eq!(e.role(), Some(Role::Primary));
    }

    #[test]
    fn test_outranked_lists_lower_ranked_candidates() {
        let e = election("host1", &["host3", "host1", "host2"]);
        let best = addr("host2");
        let outranked: Vec<_> = e.outranked(&best).cloned().collect();
        assert_eq!(outranked, vec![addr("host3")]);

        let best = addr("host1");
        let outranked: Vec<_> = e.outranked(&best).cloned().collect();
        assert_eq!(outranked, vec![addr("host2"), addr("host3")]);
    }

    #[test]
    fn test_outranked_for_local_fallback() {
        // The fallback need not be a candidate; rank is by key.
        let e = election("c", &["ab", "c0"]);
        let best = addr("c");
        let outranked: Vec<_> = e.outranked(&best).cloned().collect();
        assert_eq!(outranked, vec![addr("ab"), addr("c0")]);
    }
}
