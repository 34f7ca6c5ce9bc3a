//! Common error types for the VIP agent crates.

use std::fmt;

/// A specialized Result type for agent operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for agent operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Coordination error: {0}")]
    Coordination(String),

    #[error("Campaign canceled")]
    Canceled,

    #[error("Session expired: lease {lease:x} is no longer held")]
    SessionExpired { lease: i64 },

    #[error("Invalid address {input:?}: expected a bare IPv4 or IPv6 address")]
    AddressParse { input: String },

    #[error("Kernel rejected {op}: {source}")]
    Kernel {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Netlink error: {0}")]
    Netlink(String),

    #[error("Unknown error: {0}")]
    Other(String),
}

impl Error {
    /// Create a new configuration error.
    pub fn config(msg: impl fmt::Display) -> Self {
        Error::Config(msg.to_string())
    }

    /// Create a new connection error.
    pub fn connection(msg: impl fmt::Display) -> Self {
        Error::Connection(msg.to_string())
    }

    /// Create a new coordination error.
    pub fn coordination(msg: impl fmt::Display) -> Self {
        Error::Coordination(msg.to_string())
    }

    /// Create a new address parse error.
    pub fn address_parse(input: impl Into<String>) -> Self {
        Error::AddressParse {
            input: input.into(),
        }
    }

    /// Create a kernel error from a raw errno value.
    pub fn kernel(op: &'static str, errno: i32) -> Self {
        Error::Kernel {
            op,
            source: std::io::Error::from_raw_os_error(errno),
        }
    }

    /// Create a new netlink error.
    pub fn netlink(msg: impl fmt::Display) -> Self {
        Error::Netlink(msg.to_string())
    }

    /// Create a new other error.
    pub fn other(msg: impl fmt::Display) -> Self {
        Error::Other(msg.to_string())
    }

    /// Raw errno carried by a kernel error, if any.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Error::Kernel { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}
