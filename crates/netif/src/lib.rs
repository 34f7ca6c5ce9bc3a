//! Virtual IP attachment via rtnetlink.
//!
//! This crate adds and removes a single host address (/32 or /128) on a
//! named interface through direct netlink requests, treating "already in the
//! requested state" as success.
//!
//! # Example
//!
//! ```no_run
//! use netif::{InterfaceBinder, NetlinkAddressTable};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let binder = InterfaceBinder::new(Arc::new(NetlinkAddressTable::new()?));
//!
//! // Requires CAP_NET_ADMIN
//! binder.attach("eth0", "10.0.0.5")?;
//! binder.detach("eth0", "10.0.0.5")?;
//! # Ok(())
//! # }
//! ```

mod binder;
mod memory;
mod netlink;
mod table;
mod types;

pub use binder::{BindOutcome, InterfaceBinder};
pub use memory::MemoryAddressTable;
pub use netlink::NetlinkAddressTable;
pub use table::AddressTable;
pub use types::{AddressChange, HostAddress};
