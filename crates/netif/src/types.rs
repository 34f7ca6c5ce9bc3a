//! Address data types.

use common::{Error, Result};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Host address: a single IP with a full-length prefix (/32 or /128).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostAddress(IpAddr);

impl HostAddress {
    /// Parse a bare IPv4 or IPv6 address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AddressParse`] for anything else, including input
    /// that already carries a `/prefix`.
    pub fn parse(input: &str) -> Result<Self> {
        input
            .parse::<IpAddr>()
            .map(Self)
            .map_err(|_| Error::address_parse(input))
    }

    /// The address itself
    pub fn ip(&self) -> IpAddr {
        self.0
    }

    /// Prefix length (32 for IPv4, 128 for IPv6)
    pub fn prefix_len(&self) -> u8 {
        match self.0 {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        }
    }
}

impl From<IpAddr> for HostAddress {
    fn from(ip: IpAddr) -> Self {
        Self(ip)
    }
}

impl FromStr for HostAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0, self.prefix_len())
    }
}

/// Result of an address mutation at the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressChange {
    /// The kernel table was modified
    Applied,
    /// The table was already in the requested state
    Unchanged,
}
