//! Control connection state and lifecycle events.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

/// Observable state of the control connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ControlConnectionState {
    /// No connection has been attempted yet, or the initial attempt failed.
    #[default]
    Disconnected,
    /// The initial connection round is running.
    Connecting,
    /// An active administrative connection is installed.
    Connected,
    /// A reconnection session is running.
    Reconnecting,
    /// The control connection has been shut down.
    Closed,
}

impl ControlConnectionState {
    /// Returns a human-readable name for this state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Reconnecting => "RECONNECTING",
            Self::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for ControlConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Events published by the control connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlConnectionEvent {
    /// A new administrative connection was installed.
    Connected {
        /// Address of the node the connection talks to.
        address: SocketAddr,
    },
    /// A candidate host could not be brought up.
    ConnectionFailed {
        /// Address of the candidate.
        address: SocketAddr,
        /// Failure description.
        message: String,
    },
    /// A failed reconnection attempt was rescheduled.
    ReconnectionScheduled {
        /// Delay before the next attempt.
        next_delay: Duration,
    },
    /// An error outside the known connection-failure kinds was observed.
    UnexpectedError {
        /// Failure description.
        message: String,
    },
    /// The control connection was shut down.
    Closed,
}

impl ControlConnectionEvent {
    /// Returns a human-readable name for this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "CONNECTED",
            Self::ConnectionFailed { .. } => "CONNECTION_FAILED",
            Self::ReconnectionScheduled { .. } => "RECONNECTION_SCHEDULED",
            Self::UnexpectedError { .. } => "UNEXPECTED_ERROR",
            Self::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for ControlConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected { address } => write!(f, "{} ({})", self.name(), address),
            Self::ConnectionFailed { address, message } => {
                write!(f, "{} ({}: {})", self.name(), address, message)
            }
            Self::ReconnectionScheduled { next_delay } => {
                write!(f, "{} (in {} ms)", self.name(), next_delay.as_millis())
            }
            Self::UnexpectedError { message } => write!(f, "{} ({})", self.name(), message),
            Self::Closed => write!(f, "{}", self.name()),
        }
    }
}
