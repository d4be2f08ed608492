//! Request and response messages.

use std::fmt;

use super::rows::Rows;
use crate::error::{CqlError, Result};

/// Category of server-pushed events a connection can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// A node joined, left or moved in the ring.
    TopologyChange,
    /// A node went up or down.
    StatusChange,
    /// A keyspace, table or type was created, altered or dropped.
    SchemaChange,
}

impl EventType {
    /// All event categories, in registration order.
    pub const ALL: [EventType; 3] = [
        EventType::TopologyChange,
        EventType::StatusChange,
        EventType::SchemaChange,
    ];

    /// Returns the protocol name of this event category.
    pub fn name(self) -> &'static str {
        match self {
            Self::TopologyChange => "TOPOLOGY_CHANGE",
            Self::StatusChange => "STATUS_CHANGE",
            Self::SchemaChange => "SCHEMA_CHANGE",
        }
    }

    /// Parses a protocol event name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "TOPOLOGY_CHANGE" => Some(Self::TopologyChange),
            "STATUS_CHANGE" => Some(Self::StatusChange),
            "SCHEMA_CHANGE" => Some(Self::SchemaChange),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A request sent to a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Registers the connection for pushed events of the given categories.
    Register {
        /// Event categories to receive.
        events: Vec<EventType>,
    },
    /// Executes a CQL statement.
    Query {
        /// Statement text.
        cql: String,
    },
}

impl Request {
    /// Creates a registration request for the given event categories.
    pub fn register(events: impl IntoIterator<Item = EventType>) -> Self {
        Self::Register {
            events: events.into_iter().collect(),
        }
    }

    /// Creates a query request.
    pub fn query(cql: impl Into<String>) -> Self {
        Self::Query { cql: cql.into() }
    }

    /// Returns the statement text if this is a query.
    pub fn cql(&self) -> Option<&str> {
        match self {
            Self::Query { cql } => Some(cql),
            Self::Register { .. } => None,
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Register { events } => {
                write!(f, "REGISTER [")?;
                for (i, event) in events.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", event)?;
                }
                write!(f, "]")
            }
            Self::Query { cql } => write!(f, "QUERY {}", cql),
        }
    }
}

/// A response received from a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Acknowledges a registration.
    Ready,
    /// A statement completed without a result set.
    Void,
    /// A statement returned rows.
    Rows(Rows),
    /// The node rejected the request.
    Error {
        /// Protocol error code.
        code: i32,
        /// Message sent by the node.
        message: String,
    },
}

impl Response {
    /// Converts the response into its result set.
    ///
    /// # Errors
    ///
    /// Returns [`CqlError::Server`] for error responses and
    /// [`CqlError::Protocol`] for any other non-rows response.
    pub fn into_rows(self) -> Result<Rows> {
        match self {
            Self::Rows(rows) => Ok(rows),
            Self::Error { code, message } => Err(CqlError::Server { code, message }),
            other => Err(CqlError::Protocol(format!(
                "expected rows, got {}",
                other.kind()
            ))),
        }
    }

    /// Checks that the response acknowledges the request without error.
    pub fn into_ack(self) -> Result<()> {
        match self {
            Self::Ready | Self::Void => Ok(()),
            Self::Error { code, message } => Err(CqlError::Server { code, message }),
            Self::Rows(_) => Err(CqlError::Protocol(
                "expected acknowledgement, got rows".to_string(),
            )),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Ready => "READY",
            Self::Void => "VOID",
            Self::Rows(_) => "ROWS",
            Self::Error { .. } => "ERROR",
        }
    }
}
