//! Core types for the CQL driver: the error taxonomy and the typed protocol
//! messages exchanged over an administrative connection.

#![warn(missing_docs)]

pub mod error;
pub mod protocol;

pub use error::{CqlError, NoHostAvailable, Result};
pub use protocol::{EventType, Request, Response, Row, Rows};
