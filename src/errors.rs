//! Error types for every fallible boundary in the bridge, one enum per
//! module boundary rather than a single catch-all.

use crate::filter::FilterError;
use crate::identity::IdentityError;

#[derive(Debug, Error)]
/// Failed to build a valid [`Config`](crate::Config).
pub enum ConfigError {
	#[error("{0}")]
	Filter(#[from] FilterError),

	#[error("invalid broker URI: {0}")]
	BrokerUri(String),

	#[error("topic must not be empty")]
	EmptyTopic,
}

#[derive(Debug, Error)]
/// Failed to stand up the listener sockets or interface set.
pub enum SocketError {
	#[error("failed to enumerate network interfaces: {0}")]
	InterfaceEnumeration(#[source] std::io::Error),

	#[error("no usable network interfaces matched the monitor list")]
	NoInterfaces,

	#[error("failed to create or bind the {which} mDNS socket: {source}")]
	Bind {
		which: &'static str,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to join multicast group on {iface}: {source}")]
	JoinMulticast {
		iface: String,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to read control message metadata: {0}")]
	ControlMessage(#[source] std::io::Error),
}

#[derive(Debug, Error)]
/// Failed to establish or maintain the broker session.
pub enum BrokerError {
	#[error("invalid broker URI: {0}")]
	InvalidUri(String),

	#[error("timed out connecting to the broker")]
	ConnectTimeout,

	#[error("broker connection error: {0}")]
	Connection(#[from] rumqttc::ConnectionError),

	#[error("broker client error: {0}")]
	Client(#[from] rumqttc::ClientError),
}

#[derive(Debug, Error)]
/// Fatal, top-level bridge failure. Anything narrower is logged and
/// swallowed at its own call site instead of tearing down the whole bridge.
pub enum BridgeError {
	#[error("configuration error: {0}")]
	Config(#[from] ConfigError),

	#[error("identity resolution failed: {0}")]
	Identity(#[from] IdentityError),

	#[error("socket setup failed: {0}")]
	Socket(#[from] SocketError),

	#[error("broker session failed permanently: {0}")]
	Broker(#[from] BrokerError),

	#[error("a bridge task panicked: {0}")]
	TaskPanicked(#[from] tokio::task::JoinError),
}
