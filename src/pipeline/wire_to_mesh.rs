//! Per-socket receive task: reads one datagram, filters it, and republishes
//! it to the mesh topic.

use crate::broker::MeshTransport;
use crate::config::Config;
use crate::envelope::MeshEnvelope;
use crate::filter::{self, CompiledFilters, FilterDecision};
use crate::socket::ListenerSocket;
use std::sync::Arc;
use trust_dns_client::op::Message as DnsMessage;

/// Runs until the socket itself fails fatally; per-packet errors are only
/// logged, and the loop continues.
pub(crate) async fn run(socket: Arc<ListenerSocket>, config: Arc<Config>, filters: Arc<CompiledFilters>, unique_id: Arc<str>, transport: Arc<dyn MeshTransport>) {
	loop {
		let (data, control) = match socket.recv().await {
			Ok(pair) => pair,
			Err(err) => {
				log::error!("{:?} listener failed fatally: {err}", socket.kind);
				return;
			}
		};

		// Control metadata (arrival TTL) is required to evaluate the loop-break
		// check below; drop the packet rather than guess.
		if control.ttl.is_none() {
			log::debug!("dropping packet from {} with no control metadata", control.source);
			continue;
		}

		// A packet whose TTL matches FilterTTL is assumed to be this bridge's
		// own traffic looping back in through an upstream rewriter.
		if is_loop_break(config.filter_ttl, control.ttl) {
			log::trace!("dropping packet from {}: TTL matched FilterTTL={:?}", control.source, config.filter_ttl);
			continue;
		}

		if crate::iface::is_denied_ip(&config.deny_ip, &control.source) {
			log::debug!("dropping packet from denied source {}", control.source);
			continue;
		}

		// A packet that fails to parse is filtered as an empty message instead
		// of being dropped outright, so allow/deny polarity still decides its fate.
		let message = match DnsMessage::from_vec(&data) {
			Ok(message) => message,
			Err(err) => {
				log::warn!("failed to parse datagram from {} as a DNS message: {err}", control.source);
				DnsMessage::new()
			}
		};

		if filter::decide(&filters, &message) == FilterDecision::Discard {
			continue;
		}

		let envelope = MeshEnvelope::new(unique_id.as_ref(), data);
		if let Err(err) = transport.publish(&config.topic, envelope.to_bytes()).await {
			log::error!("failed to publish to {}: {err}", config.topic);
		}
	}
}

/// True when `FilterTTL` is configured and the packet's arrival TTL matches
/// it exactly. An unset `FilterTTL` never drops anything, including TTL-0
/// traffic.
fn is_loop_break(filter_ttl: Option<u8>, arrival_ttl: Option<u8>) -> bool {
	filter_ttl.is_some() && filter_ttl == arrival_ttl
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unset_filter_ttl_never_breaks_the_loop() {
		assert!(!is_loop_break(None, Some(0)));
		assert!(!is_loop_break(None, Some(64)));
		assert!(!is_loop_break(None, None));
	}

	#[test]
	fn matching_ttl_breaks_the_loop() {
		assert!(is_loop_break(Some(1), Some(1)));
	}

	#[test]
	fn non_matching_ttl_does_not_break_the_loop() {
		assert!(!is_loop_break(Some(1), Some(64)));
		assert!(!is_loop_break(Some(1), None));
	}
}
