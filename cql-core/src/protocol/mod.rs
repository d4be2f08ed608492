//! Typed CQL protocol messages.
//!
//! Byte-level framing is handled by the transport; this module only models the
//! requests the control channel issues and the responses it consumes.

mod message;
mod rows;
pub mod value;

pub use message::{EventType, Request, Response};
pub use rows::{Row, Rows};
