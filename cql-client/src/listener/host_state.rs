//! Host lifecycle notifications.

use std::sync::Arc;

use crate::metadata::Host;

/// Receives host lifecycle notifications from the cluster metadata.
///
/// Callbacks run synchronously on the notifying task and must not block.
/// All methods have default empty implementations.
pub trait HostStateListener: Send + Sync {
    /// Called when a host becomes reachable again.
    fn on_up(&self, _host: &Arc<Host>) {}

    /// Called when a host is marked unreachable.
    fn on_down(&self, _host: &Arc<Host>) {}

    /// Called when a host joins the known set.
    fn on_add(&self, _host: &Arc<Host>) {}

    /// Called when a host leaves the known set.
    fn on_remove(&self, _host: &Arc<Host>) {}
}

impl std::fmt::Debug for dyn HostStateListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HostStateListener")
    }
}
