//! In-memory stand-ins for the network.
//!
//! A [`SimulatedNetwork`] is the set of hosts currently reachable. Every
//! node's [`SimulatedProber`] answers from the same set, so flipping a host
//! on or off is seen by all nodes at their next evaluation. Transport
//! actions are captured by [`RecordingDriver`] instead of opening sockets.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use mastersync_core::{Address, SyncAction};
use mastersync_runtime::Prober;
use mastersync_server::{Evaluation, SyncCoordinator, TransportDriver};

/// A coordinator wired to simulated probes and a recording driver.
pub type SimulatedNode = SyncCoordinator<SimulatedProber, RecordingDriver>;

/// Parses a host into an [`Address`].
///
/// # Panics
/// Panics if `host` is not a valid address.
#[must_use]
pub fn addr(host: &str) -> Address {
    Address::new(host).expect("valid test address")
}

/// Shared reachability state.
#[derive(Debug, Clone, Default)]
pub struct SimulatedNetwork {
    online: Arc<Mutex<BTreeSet<String>>>,
}

impl SimulatedNetwork {
    /// Creates a network where exactly `hosts` are reachable.
    #[must_use]
    pub fn with_online(hosts: &[&str]) -> Self {
        let network = Self::default();
        for host in hosts {
            network.bring_up(host);
        }
        network
    }

    /// Makes `host` reachable.
    pub fn bring_up(&self, host: &str) {
        self.lock().insert(host.to_string());
    }

    /// Makes `host` unreachable.
    pub fn take_down(&self, host: &str) {
        self.lock().remove(host);
    }

    /// Returns true if `host` is reachable.
    #[must_use]
    pub fn is_up(&self, host: &str) -> bool {
        self.lock().contains(host)
    }

    /// Returns a prober that answers from this network.
    #[must_use]
    pub fn prober(&self) -> SimulatedProber {
        SimulatedProber {
            network: self.clone(),
            probes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeSet<String>> {
        self.online.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Prober backed by a [`SimulatedNetwork`]. Records every probe.
#[derive(Debug, Clone)]
pub struct SimulatedProber {
    network: SimulatedNetwork,
    probes: Arc<Mutex<Vec<Address>>>,
}

impl SimulatedProber {
    /// Returns and clears the probe log.
    #[must_use]
    pub fn take_probes(&self) -> Vec<Address> {
        std::mem::take(&mut *self.probes.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[async_trait]
impl Prober for SimulatedProber {
    async fn is_online(&self, address: &Address) -> bool {
        self.probes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(address.clone());
        self.network.is_up(address.as_str())
    }
}

/// Driver that records actions instead of executing them.
#[derive(Debug, Default)]
pub struct RecordingDriver {
    actions: Vec<SyncAction>,
}

impl RecordingDriver {
    /// Returns the recorded actions.
    #[must_use]
    pub fn actions(&self) -> &[SyncAction] {
        &self.actions
    }

    /// Returns and clears the recorded actions.
    pub fn take(&mut self) -> Vec<SyncAction> {
        std::mem::take(&mut self.actions)
    }
}

#[async_trait]
impl TransportDriver for RecordingDriver {
    async fn apply(&mut self, action: SyncAction) {
        self.actions.push(action);
    }
}

/// Starts a node for `local` over `roots` on `network`.
pub async fn start_node(network: &SimulatedNetwork, roots: &[&str], local: &str) -> SimulatedNode {
    SyncCoordinator::start(
        roots.iter().map(|root| addr(root)),
        addr(local),
        network.prober(),
        RecordingDriver::default(),
    )
    .await
}

/// A set of nodes sharing one network.
pub struct SimulatedCluster {
    network: SimulatedNetwork,
    nodes: Vec<(String, SimulatedNode)>,
}

impl SimulatedCluster {
    /// Starts one node per root, with every root reachable.
    pub async fn start(roots: &[&str]) -> Self {
        let network = SimulatedNetwork::with_online(roots);
        let mut nodes = Vec::with_capacity(roots.len());
        for local in roots {
            nodes.push(((*local).to_string(), start_node(&network, roots, local).await));
        }
        Self { network, nodes }
    }

    /// Returns the shared network.
    #[must_use]
    pub const fn network(&self) -> &SimulatedNetwork {
        &self.network
    }

    /// Returns the node running as `host`.
    ///
    /// # Panics
    /// Panics if there is no such node.
    #[must_use]
    pub fn node(&self, host: &str) -> &SimulatedNode {
        self.nodes
            .iter()
            .find(|(name, _)| name == host)
            .map(|(_, node)| node)
            .expect("node exists")
    }

    /// Clears every node's recorded actions.
    pub fn clear_actions(&mut self) {
        for (_, node) in &mut self.nodes {
            let _ = node.driver_mut().take();
        }
    }

    /// Runs one evaluation on every reachable node, in start order.
    pub async fn tick(&mut self) -> Vec<(String, Evaluation)> {
        let mut results = Vec::new();
        for (name, node) in &mut self.nodes {
            if self.network.is_up(name) {
                results.push((name.clone(), node.evaluate().await));
            }
        }
        results
    }

    /// Returns the elected address of every reachable node.
    #[must_use]
    pub fn elected(&self) -> Vec<(String, Option<Address>)> {
        self.nodes
            .iter()
            .filter(|(name, _)| self.network.is_up(name))
            .map(|(name, node)| (name.clone(), node.election().elected().cloned()))
            .collect()
    }
}
