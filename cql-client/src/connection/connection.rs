//! A single administrative connection to one node.

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use cql_core::{Request, Response, Result};
use tokio_util::sync::CancellationToken;

use crate::metadata::Host;

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generates a new unique connection ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw ID value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A live request/response channel to a single node.
///
/// Implementations carry one request at a time or multiplex internally; the
/// control connection only relies on `send` completing with the response to
/// the request it was given.
#[async_trait]
pub trait Connection: Send + Sync + fmt::Debug {
    /// Returns the connection's unique identifier.
    fn id(&self) -> ConnectionId;

    /// Returns the address of the node this connection talks to.
    fn address(&self) -> SocketAddr;

    /// Sends a request and waits for its response.
    ///
    /// Fails with [`CqlError::Connection`](cql_core::CqlError::Connection)
    /// if the channel breaks before the response arrives.
    async fn send(&self, request: Request) -> Result<Response>;

    /// Returns `true` once the connection has been closed.
    fn is_closed(&self) -> bool;

    /// Closes the connection. Closing an already closed connection is a no-op.
    async fn close(&self);
}

/// Opens connections to cluster nodes.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + fmt::Debug {
    /// Opens a connection to the given host.
    ///
    /// Fails with [`CqlError::Connection`](cql_core::CqlError::Connection)
    /// carrying the host's address when the node cannot be reached.
    async fn open(&self, host: &Host) -> Result<Arc<dyn Connection>>;
}

/// Result of awaiting an operation that may be abandoned.
///
/// Abandonment is a normal outcome rather than an error: callers can tell
/// "the operation was cancelled" apart from "the operation failed".
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Awaited<T> {
    /// The operation completed.
    Ready(T),
    /// The operation was abandoned before it completed.
    Cancelled,
}

impl<T> Awaited<T> {
    /// Returns `true` if the operation was abandoned.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Converts into an `Option`, mapping `Cancelled` to `None`.
    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Cancelled => None,
        }
    }

    /// Maps the completed value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Awaited<U> {
        match self {
            Self::Ready(value) => Awaited::Ready(f(value)),
            Self::Cancelled => Awaited::Cancelled,
        }
    }
}

/// Awaits `future` unless `cancel` fires first.
pub async fn await_or_cancel<F, T>(cancel: &CancellationToken, future: F) -> Result<Awaited<T>>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(Awaited::Cancelled),
        result = future => result.map(Awaited::Ready),
    }
}
