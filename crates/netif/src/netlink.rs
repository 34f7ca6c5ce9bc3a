//! rtnetlink communication layer.
//!
//! This module provides low-level netlink socket operations for adding and
//! removing interface addresses (RTM_NEWADDR / RTM_DELADDR) on a
//! NETLINK_ROUTE socket.

use crate::table::AddressTable;
use crate::types::{AddressChange, HostAddress};
use common::{Error, Result};
use netlink_packet_core::{
    NLM_F_ACK, NLM_F_CREATE, NLM_F_EXCL, NLM_F_REQUEST, NetlinkMessage, NetlinkPayload,
};
use netlink_packet_route::address::{AddressAttribute, AddressMessage};
use netlink_packet_route::{AddressFamily, RouteNetlinkMessage};
use netlink_sys::{Socket, SocketAddr, protocols::NETLINK_ROUTE};
use nix::errno::Errno;
use std::net::IpAddr;
use std::sync::Mutex;
use tracing::{debug, trace};

/// Receive buffer size
const RECV_BUF_SIZE: usize = 8192;

/// Netlink socket wrapper for address operations.
struct RouteSocket {
    socket: Socket,
    sequence: u32,
}

impl RouteSocket {
    /// Create a new NETLINK_ROUTE socket connected to the kernel.
    fn new() -> Result<Self> {
        debug!("Creating netlink route socket");

        let mut socket = Socket::new(NETLINK_ROUTE)
            .map_err(|e| Error::netlink(format!("Failed to create netlink socket: {}", e)))?;

        socket
            .bind(&SocketAddr::new(0, 0))
            .map_err(|e| Error::netlink(format!("Failed to bind netlink socket: {}", e)))?;

        socket
            .connect(&SocketAddr::new(0, 0))
            .map_err(|e| Error::netlink(format!("Failed to connect netlink socket: {}", e)))?;

        Ok(Self {
            socket,
            sequence: 0,
        })
    }

    /// Get the next sequence number.
    fn next_sequence(&mut self) -> u32 {
        self.sequence = self.sequence.wrapping_add(1);
        self.sequence
    }

    /// Send a request and wait for the kernel's acknowledgement.
    ///
    /// Returns `Ok(None)` on success or `Ok(Some(errno))` if the kernel
    /// rejected the request.
    fn request_ack(&mut self, payload: RouteNetlinkMessage, flags: u16) -> Result<Option<i32>> {
        let sequence = self.next_sequence();

        let mut nlmsg = NetlinkMessage::from(payload);
        nlmsg.header.flags = flags | NLM_F_REQUEST | NLM_F_ACK;
        nlmsg.header.sequence_number = sequence;
        nlmsg.finalize();

        let mut buf = vec![0u8; nlmsg.buffer_len()];
        nlmsg.serialize(&mut buf[..]);

        trace!("Sending netlink message: {:?}", nlmsg);

        self.socket
            .send(&buf[..], 0)
            .map_err(|e| Error::netlink(format!("Failed to send netlink message: {}", e)))?;

        loop {
            let mut buf = Vec::with_capacity(RECV_BUF_SIZE);
            let len = self
                .socket
                .recv(&mut buf, 0)
                .map_err(|e| Error::netlink(format!("Failed to receive netlink message: {}", e)))?;

            let mut offset = 0;
            while offset < len {
                let message = NetlinkMessage::<RouteNetlinkMessage>::deserialize(&buf[offset..len])
                    .map_err(|e| Error::netlink(format!("Failed to parse netlink message: {}", e)))?;

                trace!("Received netlink message: {:?}", message);

                if message.header.sequence_number == sequence {
                    match message.payload {
                        NetlinkPayload::Error(err) => {
                            return Ok(err.code.map(|code| -code.get()));
                        }
                        NetlinkPayload::Done(_) => return Ok(None),
                        _ => {}
                    }
                }

                let msg_len = message.header.length as usize;
                if msg_len == 0 {
                    break;
                }
                offset += msg_len;
            }
        }
    }
}

fn address_message(index: u32, addr: HostAddress) -> AddressMessage {
    let mut msg = AddressMessage::default();
    msg.header.index = index;
    msg.header.prefix_len = addr.prefix_len();
    match addr.ip() {
        IpAddr::V4(_) => {
            msg.header.family = AddressFamily::Inet;
            msg.attributes.push(AddressAttribute::Local(addr.ip()));
        }
        IpAddr::V6(_) => {
            msg.header.family = AddressFamily::Inet6;
        }
    }
    msg.attributes.push(AddressAttribute::Address(addr.ip()));
    msg
}

/// [`AddressTable`] backed by the kernel via rtnetlink.
///
/// Requires CAP_NET_ADMIN for mutations.
pub struct NetlinkAddressTable {
    socket: Mutex<RouteSocket>,
}

impl NetlinkAddressTable {
    /// Open a netlink route socket.
    pub fn new() -> Result<Self> {
        Ok(Self {
            socket: Mutex::new(RouteSocket::new()?),
        })
    }

    fn request(&self, payload: RouteNetlinkMessage, flags: u16) -> Result<Option<i32>> {
        let mut socket = self
            .socket
            .lock()
            .map_err(|_| Error::netlink("netlink socket lock poisoned"))?;
        socket.request_ack(payload, flags)
    }
}

impl AddressTable for NetlinkAddressTable {
    fn link_index(&self, name: &str) -> Result<Option<u32>> {
        match nix::net::if_::if_nametoindex(name) {
            Ok(index) => Ok(Some(index)),
            Err(Errno::ENODEV) => Ok(None),
            Err(errno) => Err(Error::kernel("interface lookup", errno as i32)),
        }
    }

    fn add_address(&self, index: u32, addr: HostAddress) -> Result<AddressChange> {
        let msg = RouteNetlinkMessage::NewAddress(address_message(index, addr));
        match self.request(msg, NLM_F_CREATE | NLM_F_EXCL)? {
            None => Ok(AddressChange::Applied),
            Some(libc::EEXIST) => Ok(AddressChange::Unchanged),
            Some(errno) => Err(Error::kernel("address add", errno)),
        }
    }

    fn del_address(&self, index: u32, addr: HostAddress) -> Result<AddressChange> {
        let msg = RouteNetlinkMessage::DelAddress(address_message(index, addr));
        match self.request(msg, 0)? {
            None => Ok(AddressChange::Applied),
            Some(libc::EADDRNOTAVAIL | libc::ENOENT | libc::ESRCH) => Ok(AddressChange::Unchanged),
            Some(errno) => Err(Error::kernel("address delete", errno)),
        }
    }
}
