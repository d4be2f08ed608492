//! Error types for CQL driver operations.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// The main error type for CQL driver operations.
#[derive(Debug, Error)]
pub enum CqlError {
    /// A specific node is unreachable or the channel to it broke mid-operation.
    #[error("connection error on {address}: {message}")]
    Connection {
        /// Address of the node the failure relates to.
        address: SocketAddr,
        /// Human readable description of the failure.
        message: String,
    },

    /// Every candidate host of a selection round failed.
    #[error(transparent)]
    NoHostAvailable(#[from] NoHostAvailable),

    /// The node answered the request with an error response.
    #[error("server error 0x{code:04x}: {message}")]
    Server {
        /// Protocol error code.
        code: i32,
        /// Message sent by the node.
        message: String,
    },

    /// The node answered with something the driver cannot interpret.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The caller passed arguments that violate the operation's contract.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not valid in the component's current state.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Configuration errors (invalid settings).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// I/O errors from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CqlError {
    /// Creates a connection error for the given address.
    pub fn connection(address: SocketAddr, message: impl Into<String>) -> Self {
        Self::Connection {
            address,
            message: message.into(),
        }
    }

    /// Returns `true` for failures caused by unreachable nodes or broken channels.
    ///
    /// These are the expected, operational failures that retry logic handles
    /// routinely. A [`NoHostAvailable`] aggregate only ever contains such
    /// failures, so it is classified the same way.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::NoHostAvailable(_))
    }

    /// Returns the node address this error relates to, if any.
    pub fn address(&self) -> Option<SocketAddr> {
        match self {
            Self::Connection { address, .. } => Some(*address),
            _ => None,
        }
    }
}

/// Aggregate failure of a host selection round.
///
/// Maps every attempted address to the reason the attempt failed. Entries are
/// kept ordered by address so the rendered message is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoHostAvailable {
    errors: BTreeMap<SocketAddr, String>,
}

impl NoHostAvailable {
    /// Creates an aggregate from per-address failure messages.
    pub fn new(errors: BTreeMap<SocketAddr, String>) -> Self {
        Self { errors }
    }

    /// Returns the per-address failure messages.
    pub fn errors(&self) -> &BTreeMap<SocketAddr, String> {
        &self.errors
    }

    /// Returns the number of hosts that were tried.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Returns `true` if no host was tried at all.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for NoHostAvailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            return write!(f, "no host available (no host was tried)");
        }
        write!(f, "no host available (tried: ")?;
        for (i, (address, message)) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} ({})", address, message)?;
        }
        write!(f, ")")
    }
}

impl std::error::Error for NoHostAvailable {}

/// A specialized `Result` type for CQL driver operations.
pub type Result<T> = std::result::Result<T, CqlError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_connection_error_display() {
        let err = CqlError::connection(addr("10.0.0.1:9042"), "connection refused");
        assert_eq!(
            err.to_string(),
            "connection error on 10.0.0.1:9042: connection refused"
        );
    }

    #[test]
    fn test_connection_error_is_classified_known() {
        let err = CqlError::connection(addr("10.0.0.1:9042"), "reset");
        assert!(err.is_connection_error());
        assert_eq!(err.address(), Some(addr("10.0.0.1:9042")));
    }

    #[test]
    fn test_no_host_available_is_classified_known() {
        let err: CqlError = NoHostAvailable::default().into();
        assert!(err.is_connection_error());
        assert_eq!(err.address(), None);
    }

    #[test]
    fn test_other_errors_are_not_connection_errors() {
        let errors = [
            CqlError::Server {
                code: 0x2200,
                message: "invalid query".to_string(),
            },
            CqlError::Protocol("unexpected response".to_string()),
            CqlError::InvalidArgument("table without keyspace".to_string()),
            CqlError::IllegalState("not connected".to_string()),
            CqlError::Configuration("bad port".to_string()),
        ];
        for err in errors {
            assert!(!err.is_connection_error(), "{err}");
        }
    }

    #[test]
    fn test_server_error_display() {
        let err = CqlError::Server {
            code: 0x2200,
            message: "unconfigured table".to_string(),
        };
        assert_eq!(err.to_string(), "server error 0x2200: unconfigured table");
    }

    #[test]
    fn test_no_host_available_display_is_ordered() {
        let mut errors = BTreeMap::new();
        errors.insert(addr("10.0.0.2:9042"), "timed out".to_string());
        errors.insert(addr("10.0.0.1:9042"), "refused".to_string());
        let err = NoHostAvailable::new(errors);

        assert_eq!(err.len(), 2);
        assert_eq!(
            err.to_string(),
            "no host available (tried: 10.0.0.1:9042 (refused), 10.0.0.2:9042 (timed out))"
        );
    }

    #[test]
    fn test_no_host_available_empty_display() {
        let err = NoHostAvailable::default();
        assert!(err.is_empty());
        assert_eq!(err.to_string(), "no host available (no host was tried)");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused");
        let err: CqlError = io_err.into();
        assert!(matches!(err, CqlError::Io(_)));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CqlError>();
    }
}
