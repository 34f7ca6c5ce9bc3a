//! Kernel address table abstraction.

use crate::types::{AddressChange, HostAddress};
use common::Result;

/// Node-local interface address table.
///
/// Implementations report "already in the requested state" as
/// [`AddressChange::Unchanged`] rather than as an error.
#[cfg_attr(test, mockall::automock)]
pub trait AddressTable: Send + Sync {
    /// Resolve an interface name to its index. `None` if no such interface.
    fn link_index(&self, name: &str) -> Result<Option<u32>>;

    /// Add `addr` to the interface with the given index.
    fn add_address(&self, index: u32, addr: HostAddress) -> Result<AddressChange>;

    /// Remove `addr` from the interface with the given index.
    fn del_address(&self, index: u32, addr: HostAddress) -> Result<AddressChange>;
}
