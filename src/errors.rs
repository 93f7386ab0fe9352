/// Gateway-wide error type.
///
/// Only `Config` and `Listener` are allowed to reach `main` and turn into a
/// process exit. Every other variant is handled at the connection that
/// produced it: converted into a status code, logged, and dropped.
use std::fmt;
use std::io;

#[derive(Debug)]
pub enum GatewayError {
    /// Fatal at startup: missing or unparsable configuration.
    Config(String),

    /// Fatal at startup: the listener could not be bound.
    Listener(io::Error),

    /// Per-connection I/O failure. Never propagated past the connection
    /// that produced it.
    Io(io::Error),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Config(msg) => write!(f, "configuration error: {}", msg),
            GatewayError::Listener(err) => write!(f, "listener setup failed: {}", err),
            GatewayError::Io(err) => write!(f, "socket error: {}", err),
        }
    }
}

impl std::error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GatewayError::Listener(err) | GatewayError::Io(err) => Some(err),
            GatewayError::Config(_) => None,
        }
    }
}

impl From<io::Error> for GatewayError {
    fn from(err: io::Error) -> Self {
        GatewayError::Io(err)
    }
}
