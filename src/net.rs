//! Low-level multicast socket option helpers.
//!
//! The bridge only ever runs against IPv4 mDNS (`MDNS_V6_IP` is reserved but
//! unjoined), and its control-message handling already depends on `nix`,
//! which is unix-only — so unlike the interface-agnostic socket layer this
//! crate was adapted from, `MulticastSocketEx` only has a unix impl.

use std::net::Ipv4Addr;

/// Binds a socket's *outbound* multicast interface, so a send through it
/// egresses on one specific NIC rather than whatever the OS picks by
/// default — lets one logical write fan out as one send per interface.
pub(crate) trait MulticastSocketEx {
	fn set_multicast_if(&self, iface: Ipv4Addr) -> Result<(), std::io::Error>;
}

impl MulticastSocketEx for tokio::net::UdpSocket {
	fn set_multicast_if(&self, iface: Ipv4Addr) -> Result<(), std::io::Error> {
		use std::os::unix::io::AsRawFd;
		unsafe {
			let iface = libc::in_addr { s_addr: u32::from(iface).to_be() };
			let res = libc::setsockopt(
				self.as_raw_fd(),
				libc::IPPROTO_IP,
				libc::IP_MULTICAST_IF,
				&iface as *const _ as *const _,
				std::mem::size_of::<libc::in_addr>() as libc::socklen_t,
			);
			if res == 0 {
				Ok(())
			} else {
				Err(std::io::Error::last_os_error())
			}
		}
	}
}

impl MulticastSocketEx for std::net::UdpSocket {
	fn set_multicast_if(&self, iface: Ipv4Addr) -> Result<(), std::io::Error> {
		use std::os::unix::io::AsRawFd;
		unsafe {
			let iface = libc::in_addr { s_addr: u32::from(iface).to_be() };
			let res = libc::setsockopt(
				self.as_raw_fd(),
				libc::IPPROTO_IP,
				libc::IP_MULTICAST_IF,
				&iface as *const _ as *const _,
				std::mem::size_of::<libc::in_addr>() as libc::socklen_t,
			);
			if res == 0 {
				Ok(())
			} else {
				Err(std::io::Error::last_os_error())
			}
		}
	}
}
