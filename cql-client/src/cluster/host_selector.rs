//! Candidate host ordering for the control connection.

use std::sync::Arc;

use tracing::trace;

use crate::listener::HostStateListener;
use crate::metadata::Host;
use crate::policy::{LoadBalancingPolicy, QueryPlan};

/// Adapts a [`LoadBalancingPolicy`] to produce candidate sequences for
/// control connection rounds.
#[derive(Debug, Clone)]
pub struct HostSelector {
    policy: Arc<dyn LoadBalancingPolicy>,
}

impl HostSelector {
    /// Wraps a load balancing policy.
    pub fn new(policy: Arc<dyn LoadBalancingPolicy>) -> Self {
        Self { policy }
    }

    /// Seeds the policy with the known hosts.
    pub fn init(&self, hosts: &[Arc<Host>]) {
        trace!(hosts = hosts.len(), "initializing host selector");
        self.policy.init(hosts);
    }

    /// Returns a fresh candidate sequence. It may be empty.
    pub fn candidates(&self) -> QueryPlan {
        self.policy.new_query_plan()
    }
}

impl HostStateListener for HostSelector {
    fn on_up(&self, host: &Arc<Host>) {
        self.policy.on_up(host);
    }

    fn on_down(&self, host: &Arc<Host>) {
        self.policy.on_down(host);
    }

    fn on_add(&self, host: &Arc<Host>) {
        self.policy.on_add(host);
    }

    fn on_remove(&self, host: &Arc<Host>) {
        self.policy.on_remove(host);
    }
}
