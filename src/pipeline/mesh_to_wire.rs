//! The broker callback: turns a mesh publish back into a multicast write,
//! classifying which listener socket's bound port it should egress from.

use crate::config::Config;
use crate::envelope::MeshEnvelope;
use crate::filter::{self, CompiledFilters, FilterDecision};
use crate::iface::TransmitDescriptor;
use crate::socket::ListenerSocket;
use std::sync::Arc;
use tokio::sync::mpsc;
use trust_dns_client::op::Message as DnsMessage;

/// Drains `incoming` for the lifetime of the bridge; each message is
/// independent, errors never abort the loop.
pub(crate) async fn run(
	mut incoming: mpsc::Receiver<Vec<u8>>,
	config: Arc<Config>,
	filters: Arc<CompiledFilters>,
	unique_id: Arc<str>,
	low: Arc<ListenerSocket>,
	high: Arc<ListenerSocket>,
	transmit: Arc<Vec<TransmitDescriptor>>,
) {
	while let Some(bytes) = incoming.recv().await {
		let envelope = match MeshEnvelope::from_bytes(&bytes) {
			Ok(envelope) => envelope,
			Err(err) => {
				log::warn!("failed to deserialize mesh envelope: {err}");
				continue;
			}
		};

		// Never write back our own traffic.
		if envelope.sender == *unique_id {
			continue;
		}

		// Unlike the wire→mesh direction, a parse failure here is dropped
		// outright — there is nothing left to republish once the wire write
		// is the only remaining step.
		let message = match DnsMessage::from_vec(&envelope.data) {
			Ok(message) => message,
			Err(err) => {
				log::warn!("failed to parse mesh envelope data from {} as a DNS message: {err}", envelope.sender);
				continue;
			}
		};

		if filter::decide(&filters, &message) == FilterDecision::Discard {
			continue;
		}

		let port_matched = filter::label_match(&message, &filters.port_regexes);
		let socket = match classify_port(config.high_port, port_matched) {
			PortTarget::Low => &low,
			PortTarget::High => &high,
		};

		// One write per participating interface, byte-exact.
		for iface in transmit.iter() {
			if let Err(err) = socket.send_via(iface, &envelope.data).await {
				log::error!("failed to write to {}: {err}", iface.name);
			}
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PortTarget {
	Low,
	High,
}

/// `HighPort` inverts which listener a `PortFilter` match routes to.
fn classify_port(high_port: bool, port_matched: bool) -> PortTarget {
	match (high_port, port_matched) {
		(false, false) => PortTarget::Low,
		(false, true) => PortTarget::High,
		(true, false) => PortTarget::High,
		(true, true) => PortTarget::Low,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn port_classification_truth_table() {
		assert_eq!(classify_port(false, false), PortTarget::Low);
		assert_eq!(classify_port(false, true), PortTarget::High);
		assert_eq!(classify_port(true, false), PortTarget::High);
		assert_eq!(classify_port(true, true), PortTarget::Low);
	}
}
