//! Connection abstractions for talking to cluster nodes.

mod connection;

pub use connection::{await_or_cancel, Awaited, Connection, ConnectionFactory, ConnectionId};
