//! Control connection and the protocols it runs.

mod control_connection;
mod host_selector;
pub mod reconnection;
pub mod schema;
pub mod topology;

pub use control_connection::{ControlConnection, ControlConnectionBuilder, RefreshOutcome};
pub use host_selector::HostSelector;
pub use reconnection::{ReconnectionHandler, ReconnectionSlot, SessionHandle, SessionOutcome};
pub use schema::{SchemaQueries, SchemaScope};
pub use topology::TopologyDiff;
