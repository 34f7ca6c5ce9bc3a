//! In-process address table.
//!
//! Models one host's interfaces and their addresses so several simulated
//! hosts can run side by side in a single test process.

use crate::table::AddressTable;
use crate::types::{AddressChange, HostAddress};
use common::{Error, Result};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Host {
    links: HashMap<String, u32>,
    addresses: HashMap<u32, BTreeSet<HostAddress>>,
    mutations: usize,
    reject_errno: Option<i32>,
}

/// In-memory [`AddressTable`].
#[derive(Debug, Default)]
pub struct MemoryAddressTable {
    host: Mutex<Host>,
}

impl MemoryAddressTable {
    /// Create a host with no interfaces.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a host with the named interfaces.
    pub fn with_links(names: &[&str]) -> Self {
        let table = Self::new();
        for name in names {
            table.add_link(name);
        }
        table
    }

    fn host(&self) -> MutexGuard<'_, Host> {
        self.host.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an interface, returning its index.
    pub fn add_link(&self, name: &str) -> u32 {
        let mut host = self.host();
        let next = host.links.len() as u32 + 1;
        *host.links.entry(name.to_string()).or_insert(next)
    }

    /// Addresses currently on the named interface.
    pub fn addresses(&self, name: &str) -> Vec<HostAddress> {
        let host = self.host();
        host.links
            .get(name)
            .and_then(|index| host.addresses.get(index))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of add/delete requests that reached the table.
    pub fn mutations(&self) -> usize {
        self.host().mutations
    }

    /// Make every later mutation fail with `errno`, as a kernel refusing
    /// the operation would (e.g. `EPERM` without CAP_NET_ADMIN).
    pub fn reject_mutations(&self, errno: i32) {
        self.host().reject_errno = Some(errno);
    }
}

impl AddressTable for MemoryAddressTable {
    fn link_index(&self, name: &str) -> Result<Option<u32>> {
        Ok(self.host().links.get(name).copied())
    }

    fn add_address(&self, index: u32, addr: HostAddress) -> Result<AddressChange> {
        let mut host = self.host();
        host.mutations += 1;
        if let Some(errno) = host.reject_errno {
            return Err(Error::kernel("address add", errno));
        }
        if host.addresses.entry(index).or_default().insert(addr) {
            Ok(AddressChange::Applied)
        } else {
            Ok(AddressChange::Unchanged)
        }
    }

    fn del_address(&self, index: u32, addr: HostAddress) -> Result<AddressChange> {
        let mut host = self.host();
        host.mutations += 1;
        if let Some(errno) = host.reject_errno {
            return Err(Error::kernel("address delete", errno));
        }
        let removed = host
            .addresses
            .get_mut(&index)
            .is_some_and(|set| set.remove(&addr));
        if removed {
            Ok(AddressChange::Applied)
        } else {
            Ok(AddressChange::Unchanged)
        }
    }
}
