//! Interface enumeration and per-interface transmit descriptors.

use crate::config::Config;
use crate::errors::SocketError;
use nix::net::if_::InterfaceFlags;
use std::net::{IpAddr, Ipv4Addr};

/// An interface selected for multicast join/transmit: its name (for logging)
/// and its IPv4 address (for `IP_MULTICAST_IF`/`join_multicast_v4`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SelectedInterface {
	pub(crate) name: String,
	pub(crate) addr: Ipv4Addr,
}

/// Per-interface control block: binds an outbound multicast write to one
/// egress interface, so a single logical "broadcast to the mesh" transmits
/// once per participating interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TransmitDescriptor {
	pub(crate) name: String,
	pub(crate) addr: Ipv4Addr,
}

const REQUIRED_FLAGS: InterfaceFlags = InterfaceFlags::IFF_UP.union(InterfaceFlags::IFF_MULTICAST);

/// Interfaces that are up, multicast-capable, and either named in
/// `config.monitor` or (if `monitor` is empty) every such interface except
/// loopback.
pub(crate) fn select_interfaces(config: &Config) -> Result<Vec<SelectedInterface>, SocketError> {
	let addrs = nix::ifaddrs::getifaddrs().map_err(|err| SocketError::InterfaceEnumeration(std::io::Error::from_raw_os_error(err as i32)))?;

	let monitor_all = config.monitor.is_empty();
	let mut selected = Vec::new();

	for iface in addrs {
		if !iface.flags.contains(REQUIRED_FLAGS) {
			continue;
		}

		let is_loopback = iface.flags.contains(InterfaceFlags::IFF_LOOPBACK);
		let in_monitor = config.monitor.iter().any(|name| name == &iface.interface_name);

		if !in_monitor {
			if !monitor_all || is_loopback {
				continue;
			}
		}

		let Some(addr) = iface.address.as_ref().and_then(nix_addr_to_ipv4) else {
			continue;
		};

		let candidate = SelectedInterface { name: iface.interface_name, addr };
		if !selected.contains(&candidate) {
			selected.push(candidate);
		}
	}

	if selected.is_empty() {
		return Err(SocketError::NoInterfaces);
	}

	Ok(selected)
}

fn nix_addr_to_ipv4(addr: &nix::sys::socket::SockaddrStorage) -> Option<Ipv4Addr> {
	addr.as_sockaddr_in().map(|sin| sin.ip())
}

pub(crate) fn build_transmit(interfaces: &[SelectedInterface]) -> Vec<TransmitDescriptor> {
	interfaces.iter().map(|iface| TransmitDescriptor { name: iface.name.clone(), addr: iface.addr }).collect()
}

/// Whether `candidate` equals any literal in `deny_ip`.
pub(crate) fn is_denied_ip(deny_ip: &[String], candidate: &IpAddr) -> bool {
	deny_ip.iter().any(|denied| denied == &candidate.to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn deny_ip_matches_literal() {
		let deny = vec!["192.0.2.5".to_string()];
		assert!(is_denied_ip(&deny, &"192.0.2.5".parse().unwrap()));
		assert!(!is_denied_ip(&deny, &"192.0.2.6".parse().unwrap()));
	}
}
