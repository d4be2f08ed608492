//! Cluster node records.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};

/// Liveness state of a host as last reported to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HostState {
    /// The host is believed reachable.
    Up = 0,
    /// The host is believed unreachable.
    Down = 1,
}

impl HostState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Up,
            _ => Self::Down,
        }
    }
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "UP"),
            Self::Down => write!(f, "DOWN"),
        }
    }
}

/// A node of the cluster.
///
/// Hosts are shared as `Arc<Host>` between the metadata store, policies and
/// listeners; the liveness state is updated in place.
#[derive(Debug)]
pub struct Host {
    address: SocketAddr,
    state: AtomicU8,
}

impl Host {
    /// Creates a host that is initially up.
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            state: AtomicU8::new(HostState::Up as u8),
        }
    }

    /// Returns the host's native protocol address.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Returns the current liveness state.
    pub fn state(&self) -> HostState {
        HostState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns `true` if the host is believed reachable.
    pub fn is_up(&self) -> bool {
        self.state() == HostState::Up
    }

    /// Marks the host up. Returns `true` if the state changed.
    pub fn set_up(&self) -> bool {
        self.transition(HostState::Up)
    }

    /// Marks the host down. Returns `true` if the state changed.
    pub fn set_down(&self) -> bool {
        self.transition(HostState::Down)
    }

    fn transition(&self, to: HostState) -> bool {
        self.state.swap(to as u8, Ordering::AcqRel) != to as u8
    }
}

impl PartialEq for Host {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for Host {}

impl std::hash::Hash for Host {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Host[{}]", self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_starts_up() {
        let host = Host::new("10.0.0.1:9042".parse().unwrap());
        assert!(host.is_up());
        assert_eq!(host.state(), HostState::Up);
    }

    #[test]
    fn test_host_transitions_report_changes() {
        let host = Host::new("10.0.0.1:9042".parse().unwrap());
        assert!(host.set_down());
        assert!(!host.set_down());
        assert_eq!(host.state(), HostState::Down);
        assert!(host.set_up());
        assert!(host.is_up());
    }

    #[test]
    fn test_host_equality_by_address() {
        let a = Host::new("10.0.0.1:9042".parse().unwrap());
        let b = Host::new("10.0.0.1:9042".parse().unwrap());
        b.set_down();
        assert_eq!(a, b);
    }

    #[test]
    fn test_host_display() {
        let host = Host::new("10.0.0.1:9042".parse().unwrap());
        assert_eq!(host.to_string(), "Host[10.0.0.1:9042]");
        assert_eq!(HostState::Down.to_string(), "DOWN");
    }
}
