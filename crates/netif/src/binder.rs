//! Attach and detach the advertised address on a named interface.

use crate::table::AddressTable;
use crate::types::{AddressChange, HostAddress};
use common::Result;
use std::sync::Arc;
use tracing::{info, warn};

/// What an attach or detach call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// The address was added or removed
    Changed,
    /// The address was already present (attach) or absent (detach)
    Unchanged,
    /// The interface does not exist on this host; nothing was touched
    InterfaceAbsent,
}

/// Translates leadership into the presence of the VIP on this host.
///
/// A missing interface is not an error: nodes without the interface are
/// allowed to take part in the election. It is logged at WARN so a
/// mistyped interface name stays visible.
#[derive(Clone)]
pub struct InterfaceBinder {
    table: Arc<dyn AddressTable>,
}

impl InterfaceBinder {
    /// Create a binder over the given address table.
    pub fn new(table: Arc<dyn AddressTable>) -> Self {
        Self { table }
    }

    /// Add `ip` (as a host address) to `iface`.
    ///
    /// # Errors
    ///
    /// - [`common::Error::AddressParse`] if `ip` is not a bare IP address
    /// - [`common::Error::Kernel`] if the kernel rejects the add for any
    ///   reason other than the address already being present
    pub fn attach(&self, iface: &str, ip: &str) -> Result<BindOutcome> {
        let Some(index) = self.table.link_index(iface)? else {
            warn!(iface = %iface, ip = %ip, "Interface not found, skipping attach");
            return Ok(BindOutcome::InterfaceAbsent);
        };
        let addr = HostAddress::parse(ip)?;

        match self.table.add_address(index, addr)? {
            AddressChange::Applied => {
                info!(iface = %iface, addr = %addr, "Address attached");
                Ok(BindOutcome::Changed)
            }
            AddressChange::Unchanged => {
                info!(iface = %iface, addr = %addr, "Address already attached");
                Ok(BindOutcome::Unchanged)
            }
        }
    }

    /// Remove `ip` (as a host address) from `iface`.
    ///
    /// # Errors
    ///
    /// - [`common::Error::AddressParse`] if `ip` is not a bare IP address
    /// - [`common::Error::Kernel`] if the kernel rejects the removal for any
    ///   reason other than the address already being absent
    pub fn detach(&self, iface: &str, ip: &str) -> Result<BindOutcome> {
        let Some(index) = self.table.link_index(iface)? else {
            warn!(iface = %iface, ip = %ip, "Interface not found, skipping detach");
            return Ok(BindOutcome::InterfaceAbsent);
        };
        let addr = HostAddress::parse(ip)?;

        match self.table.del_address(index, addr)? {
            AddressChange::Applied => {
                info!(iface = %iface, addr = %addr, "Address detached");
                Ok(BindOutcome::Changed)
            }
            AddressChange::Unchanged => {
                info!(iface = %iface, addr = %addr, "Address already detached");
                Ok(BindOutcome::Unchanged)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::MockAddressTable;
    use common::Error;
    use mockall::predicate::*;

    fn vip() -> HostAddress {
        HostAddress::parse("10.0.0.5").unwrap()
    }

    #[test]
    fn test_attach_absent_interface_is_noop() {
        let mut table = MockAddressTable::new();
        table
            .expect_link_index()
            .withf(|name: &str| name == "eth9")
            .times(1)
            .returning(|_| Ok(None));
        table.expect_add_address().times(0);
        table.expect_del_address().times(0);

        let binder = InterfaceBinder::new(Arc::new(table));
        assert_eq!(
            binder.attach("eth9", "10.0.0.5").unwrap(),
            BindOutcome::InterfaceAbsent
        );
    }

    #[test]
    fn test_detach_absent_interface_is_noop() {
        let mut table = MockAddressTable::new();
        table.expect_link_index().returning(|_| Ok(None));
        table.expect_del_address().times(0);

        let binder = InterfaceBinder::new(Arc::new(table));
        assert_eq!(
            binder.detach("eth9", "10.0.0.5").unwrap(),
            BindOutcome::InterfaceAbsent
        );
    }

    #[test]
    fn test_attach_adds_host_address() {
        let mut table = MockAddressTable::new();
        table.expect_link_index().withf(|name: &str| name == "eth0").returning(|_| Ok(Some(2)));
        table
            .expect_add_address()
            .with(eq(2), eq(vip()))
            .times(1)
            .returning(|_, _| Ok(AddressChange::Applied));

        let binder = InterfaceBinder::new(Arc::new(table));
        assert_eq!(binder.attach("eth0", "10.0.0.5").unwrap(), BindOutcome::Changed);
    }

    #[test]
    fn test_attach_already_present_succeeds() {
        let mut table = MockAddressTable::new();
        table.expect_link_index().returning(|_| Ok(Some(2)));
        table
            .expect_add_address()
            .returning(|_, _| Ok(AddressChange::Unchanged));

        let binder = InterfaceBinder::new(Arc::new(table));
        assert_eq!(binder.attach("eth0", "10.0.0.5").unwrap(), BindOutcome::Unchanged);
    }

    #[test]
    fn test_attach_malformed_address() {
        let mut table = MockAddressTable::new();
        table.expect_link_index().returning(|_| Ok(Some(2)));
        table.expect_add_address().times(0);

        let binder = InterfaceBinder::new(Arc::new(table));
        let result = binder.attach("eth0", "10.0.0.500");
        assert!(matches!(result, Err(Error::AddressParse { .. })));
    }

    #[test]
    fn test_attach_kernel_rejection_propagates() {
        let mut table = MockAddressTable::new();
        table.expect_link_index().returning(|_| Ok(Some(2)));
        table
            .expect_add_address()
            .returning(|_, _| Err(Error::kernel("address add", libc::EPERM)));

        let binder = InterfaceBinder::new(Arc::new(table));
        let err = binder.attach("eth0", "10.0.0.5").unwrap_err();
        assert_eq!(err.errno(), Some(libc::EPERM));
    }

    #[test]
    fn test_detach_never_attached_succeeds() {
        let mut table = MockAddressTable::new();
        table.expect_link_index().returning(|_| Ok(Some(2)));
        table
            .expect_del_address()
            .with(eq(2), eq(vip()))
            .times(1)
            .returning(|_, _| Ok(AddressChange::Unchanged));

        let binder = InterfaceBinder::new(Arc::new(table));
        assert_eq!(binder.detach("eth0", "10.0.0.5").unwrap(), BindOutcome::Unchanged);
    }

    #[test]
    fn test_lookup_failure_propagates() {
        let mut table = MockAddressTable::new();
        table
            .expect_link_index()
            .returning(|_| Err(Error::kernel("interface lookup", libc::EINVAL)));

        let binder = InterfaceBinder::new(Arc::new(table));
        assert!(binder.attach("eth0", "10.0.0.5").is_err());
    }
}
