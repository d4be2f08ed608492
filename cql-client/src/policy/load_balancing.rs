//! Host ordering policies.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use rand::Rng;

use crate::listener::HostStateListener;
use crate::metadata::Host;

/// An ordered sequence of hosts to try.
pub type QueryPlan = Box<dyn Iterator<Item = Arc<Host>> + Send>;

/// Orders hosts for connection attempts.
///
/// Policies track host liveness through the [`HostStateListener`]
/// callbacks they inherit.
pub trait LoadBalancingPolicy: HostStateListener {
    /// Seeds the policy with the hosts known at startup.
    fn init(&self, hosts: &[Arc<Host>]);

    /// Returns a fresh ordering of candidate hosts.
    ///
    /// The plan may be empty. Each call may produce a different order.
    fn new_query_plan(&self) -> QueryPlan;
}

impl std::fmt::Debug for dyn LoadBalancingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LoadBalancingPolicy")
    }
}

/// Rotates through the live hosts, starting one position later on each plan.
///
/// The first plan starts at a random offset so that clients started
/// together do not all pick the same node.
#[derive(Debug)]
pub struct RoundRobinPolicy {
    live_hosts: RwLock<Vec<Arc<Host>>>,
    index: AtomicUsize,
}

impl RoundRobinPolicy {
    /// Creates a new round-robin policy.
    pub fn new() -> Self {
        Self {
            live_hosts: RwLock::new(Vec::new()),
            index: AtomicUsize::new(rand::thread_rng().gen_range(0..usize::MAX / 2)),
        }
    }

    fn add(&self, host: &Arc<Host>) {
        let mut hosts = self.live_hosts.write().unwrap_or_else(PoisonError::into_inner);
        if !hosts.iter().any(|h| h.address() == host.address()) {
            hosts.push(Arc::clone(host));
        }
    }

    fn remove(&self, host: &Arc<Host>) {
        self.live_hosts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|h| h.address() != host.address());
    }
}

impl Default for RoundRobinPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl HostStateListener for RoundRobinPolicy {
    fn on_up(&self, host: &Arc<Host>) {
        self.add(host);
    }

    fn on_down(&self, host: &Arc<Host>) {
        self.remove(host);
    }

    fn on_add(&self, host: &Arc<Host>) {
        self.add(host);
    }

    fn on_remove(&self, host: &Arc<Host>) {
        self.remove(host);
    }
}

impl LoadBalancingPolicy for RoundRobinPolicy {
    fn init(&self, hosts: &[Arc<Host>]) {
        for host in hosts.iter().filter(|h| h.is_up()) {
            self.add(host);
        }
    }

    fn new_query_plan(&self) -> QueryPlan {
        let snapshot = self
            .live_hosts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if snapshot.is_empty() {
            return Box::new(std::iter::empty());
        }
        let start = self.index.fetch_add(1, Ordering::Relaxed) % snapshot.len();
        let len = snapshot.len();
        Box::new((0..len).map(move |i| Arc::clone(&snapshot[(start + i) % len])))
    }
}

/// Creates the default load balancing policy (round-robin).
pub fn default_load_balancing_policy() -> Arc<dyn LoadBalancingPolicy> {
    Arc::new(RoundRobinPolicy::new())
}
