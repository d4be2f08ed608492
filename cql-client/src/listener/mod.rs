//! Listener traits and events.

mod host_state;
mod lifecycle;

pub use host_state::HostStateListener;
pub use lifecycle::{ControlConnectionEvent, ControlConnectionState};
