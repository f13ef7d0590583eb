//! Multicast listener sockets and the per-interface transmit path.
//!
//! Per-packet control information (arrival TTL, arrival interface, source
//! IP) isn't reachable through any safe wrapper in this crate's dependency
//! stack, so the receive path walks the kernel's `cmsghdr` chain directly
//! with `libc`'s `CMSG_*` macros — the same register `net.rs` reaches for
//! when `socket2`/`tokio` don't expose an option.

use crate::config::Config;
use crate::errors::SocketError;
use crate::iface::{SelectedInterface, TransmitDescriptor};
use crate::net::MulticastSocketEx;
use crate::{MAX_DATAGRAM_SIZE, MDNS_PORT, MDNS_V4_IP};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::os::unix::io::AsRawFd;

/// Which half of the listener pair a packet arrived on, or an outbound
/// write should go out through: a well-known-port listener and an
/// ephemeral-port listener, both joined to the multicast group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SocketKind {
	Low,
	High,
}

/// Per-packet control metadata a receive task requires before it will
/// apply the rest of the wire→mesh pipeline.
#[derive(Debug, Clone)]
pub(crate) struct RecvControl {
	pub(crate) source: IpAddr,
	pub(crate) ttl: Option<u8>,
	pub(crate) arrival_ifindex: Option<i32>,
}

impl RecvControl {
	/// Absent control metadata means no arrival TTL could be read back — the
	/// one field the loop-break check depends on.
	fn is_present(&self) -> bool {
		self.ttl.is_some()
	}
}

/// One bound, joined, non-blocking multicast listener.
pub(crate) struct ListenerSocket {
	pub(crate) kind: SocketKind,
	socket: tokio::net::UdpSocket,
}

impl ListenerSocket {
	fn open(kind: SocketKind, port: u16, listen_ip: Ipv4Addr, interfaces: &[SelectedInterface]) -> Result<Self, SocketError> {
		let which = match kind {
			SocketKind::Low => "low",
			SocketKind::High => "high",
		};
		let bind_err = |source| SocketError::Bind { which, source };

		let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(bind_err)?;
		socket.set_reuse_address(true).map_err(bind_err)?;
		socket.set_reuse_port(true).map_err(bind_err)?;

		enable_control_info(&socket).map_err(SocketError::ControlMessage)?;

		socket.bind(&SocketAddr::new(IpAddr::V4(listen_ip), port).into()).map_err(bind_err)?;

		for iface in interfaces {
			socket
				.join_multicast_v4(&MDNS_V4_IP, &iface.addr)
				.map_err(|source| SocketError::JoinMulticast { iface: iface.name.clone(), source })?;
		}

		socket.set_nonblocking(true).map_err(bind_err)?;
		let socket = tokio::net::UdpSocket::from_std(socket.into()).map_err(bind_err)?;

		Ok(Self { kind, socket })
	}

	/// Binds the well-known port listener (the "low" socket).
	pub(crate) fn bind_low(config: &Config, interfaces: &[SelectedInterface]) -> Result<Self, SocketError> {
		Self::open(SocketKind::Low, MDNS_PORT, config.listen_ip, interfaces)
	}

	/// Binds the ephemeral-port listener (the "high" socket).
	pub(crate) fn bind_high(config: &Config, interfaces: &[SelectedInterface]) -> Result<Self, SocketError> {
		Self::open(SocketKind::High, 0, config.listen_ip, interfaces)
	}

	/// Reads one datagram and its control metadata. Loops past readiness
	/// notifications that don't yield a usable packet rather than surfacing
	/// them — a transient read error is not fatal.
	pub(crate) async fn recv(&self) -> Result<(Vec<u8>, RecvControl), SocketError> {
		loop {
			self.socket.readable().await.map_err(SocketError::ControlMessage)?;

			match recv_with_control(&self.socket) {
				Ok((data, control)) => return Ok((data, control)),
				Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => continue,
				Err(err) => {
					log::warn!("{:?} socket read error: {err}", self.kind);
					continue;
				}
			}
		}
	}

	/// Writes one datagram to the mDNS multicast group through `iface`'s
	/// egress interface. The payload is forwarded byte-exact — no
	/// re-serialization.
	pub(crate) async fn send_via(&self, iface: &TransmitDescriptor, payload: &[u8]) -> std::io::Result<()> {
		self.socket.set_multicast_if(iface.addr)?;
		self.socket.send_to(payload, SocketAddr::V4(SocketAddrV4::new(MDNS_V4_IP, MDNS_PORT))).await?;
		Ok(())
	}
}

/// Enables `IP_RECVTTL` and `IP_PKTINFO` so every read also yields the
/// packet's arrival TTL and arrival interface.
fn enable_control_info(socket: &Socket) -> std::io::Result<()> {
	set_ip_opt(socket, libc::IP_RECVTTL)?;
	set_ip_opt(socket, libc::IP_PKTINFO)?;
	Ok(())
}

fn set_ip_opt(socket: &Socket, opt: libc::c_int) -> std::io::Result<()> {
	let enable: libc::c_int = 1;
	let res = unsafe {
		libc::setsockopt(
			socket.as_raw_fd(),
			libc::IPPROTO_IP,
			opt,
			&enable as *const _ as *const libc::c_void,
			std::mem::size_of::<libc::c_int>() as libc::socklen_t,
		)
	};
	if res == 0 {
		Ok(())
	} else {
		Err(std::io::Error::last_os_error())
	}
}

/// One `recvmsg(2)` call, decoding the `IP_TTL` and `IP_PKTINFO` ancillary
/// messages the socket was configured to deliver.
fn recv_with_control(socket: &tokio::net::UdpSocket) -> std::io::Result<(Vec<u8>, RecvControl)> {
	let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
	let mut cmsg_buf = [0u8; 128];
	let mut src: libc::sockaddr_in = unsafe { std::mem::zeroed() };

	let mut iov = libc::iovec { iov_base: buf.as_mut_ptr() as *mut libc::c_void, iov_len: buf.len() };

	let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
	msg.msg_name = &mut src as *mut _ as *mut libc::c_void;
	msg.msg_namelen = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
	msg.msg_iov = &mut iov;
	msg.msg_iovlen = 1;
	msg.msg_control = cmsg_buf.as_mut_ptr() as *mut libc::c_void;
	msg.msg_controllen = cmsg_buf.len();

	let n = unsafe { libc::recvmsg(socket.as_raw_fd(), &mut msg, 0) };
	if n < 0 {
		return Err(std::io::Error::last_os_error());
	}
	buf.truncate(n as usize);

	let source = IpAddr::V4(Ipv4Addr::from(u32::from_be(src.sin_addr.s_addr)));

	let mut ttl = None;
	let mut arrival_ifindex = None;

	unsafe {
		let mut cmsg_ptr = libc::CMSG_FIRSTHDR(&msg);
		while !cmsg_ptr.is_null() {
			let cmsg = &*cmsg_ptr;
			match (cmsg.cmsg_level, cmsg.cmsg_type) {
				(libc::IPPROTO_IP, libc::IP_TTL) => {
					let data = libc::CMSG_DATA(cmsg_ptr) as *const libc::c_int;
					ttl = Some((*data) as u8);
				}
				(libc::IPPROTO_IP, libc::IP_PKTINFO) => {
					let pktinfo = libc::CMSG_DATA(cmsg_ptr) as *const libc::in_pktinfo;
					arrival_ifindex = Some((*pktinfo).ipi_ifindex);
				}
				_ => {}
			}
			cmsg_ptr = libc::CMSG_NXTHDR(&msg, cmsg_ptr);
		}
	}

	Ok((buf, RecvControl { source, ttl, arrival_ifindex }))
}

/// The bridge's bound listener pair plus the transmit descriptors every
/// mesh→wire write fans out over.
pub(crate) struct Listeners {
	pub(crate) low: ListenerSocket,
	pub(crate) high: ListenerSocket,
	pub(crate) transmit: Vec<TransmitDescriptor>,
}

pub(crate) fn bind(config: &Config, interfaces: &[SelectedInterface]) -> Result<Listeners, SocketError> {
	let low = ListenerSocket::bind_low(config, interfaces)?;
	let high = ListenerSocket::bind_high(config, interfaces)?;
	let transmit = crate::iface::build_transmit(interfaces);

	Ok(Listeners { low, high, transmit })
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	#[test]
	fn control_is_absent_without_ttl() {
		let control = RecvControl { source: "127.0.0.1".parse().unwrap(), ttl: None, arrival_ifindex: None };
		assert!(!control.is_present());
	}

	#[test]
	fn control_is_present_with_ttl() {
		let control = RecvControl { source: "127.0.0.1".parse().unwrap(), ttl: Some(1), arrival_ifindex: None };
		assert!(control.is_present());
	}

	/// Exercises the raw `cmsghdr` walk in [`recv_with_control`] against a
	/// real multicast datagram over loopback — the riskiest code in this
	/// module since neither `socket2` nor `tokio` expose this metadata.
	#[tokio::test]
	async fn recv_reports_source_and_ttl_over_loopback() {
		let iface = SelectedInterface { name: "lo".to_string(), addr: Ipv4Addr::LOCALHOST };
		let listener = ListenerSocket::open(SocketKind::Low, 0, Ipv4Addr::UNSPECIFIED, std::slice::from_ref(&iface)).expect("bind loopback listener");
		let local_port = listener.socket.local_addr().expect("local addr").port();

		let sender = std::net::UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind sender");
		sender.set_multicast_loop_v4(true).expect("enable loopback");
		sender.set_multicast_ttl_v4(42).expect("set ttl");
		sender.set_multicast_if_v4(&Ipv4Addr::LOCALHOST).expect("set multicast if");
		sender.send_to(b"hello", (MDNS_V4_IP, local_port)).expect("send datagram");

		let (data, control) = tokio::time::timeout(Duration::from_secs(2), listener.recv()).await.expect("recv timed out").expect("recv failed");

		assert_eq!(data, b"hello");
		assert_eq!(control.source, IpAddr::V4(Ipv4Addr::LOCALHOST));
		assert_eq!(control.ttl, Some(42));
	}
}
