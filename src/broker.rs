//! Broker session: connects, subscribes, and turns broker-delivered
//! publishes into a channel the mesh→wire pipeline reads.

use crate::config::Config;
use crate::errors::BrokerError;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS, TlsConfiguration, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// The publish half of a broker session, narrowed to what the wire→mesh
/// pipeline needs so it can be driven by a mock in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait MeshTransport: Send + Sync {
	async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError>;
}

#[async_trait]
impl MeshTransport for AsyncClient {
	async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
		AsyncClient::publish(self, topic, QoS::AtMostOnce, false, payload).await?;
		Ok(())
	}
}

/// A connected broker session: `client` publishes (wire→mesh direction),
/// `incoming` yields the raw bytes of every message delivered on the
/// subscribed topic (mesh→wire direction), and `event_loop_task` is the
/// task draining the connection — callers that support shutdown must abort
/// it alongside their own tasks to actually close the connection.
pub(crate) struct BrokerSession {
	pub(crate) client: Arc<dyn MeshTransport>,
	pub(crate) incoming: mpsc::Receiver<Vec<u8>>,
	pub(crate) event_loop_task: JoinHandle<()>,
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const CHANNEL_CAPACITY: usize = 64;
const INFLIGHT: u16 = 16;

fn build_mqtt_options(unique_id: &str, config: &Config) -> MqttOptions {
	let mut options = MqttOptions::new(unique_id, config.server.host.clone(), config.server.port);
	options.set_keep_alive(Duration::from_secs(30));

	if let (Some(username), Some(password)) = (&config.server.username, &config.server.password) {
		options.set_credentials(username, password);
	}

	if config.server.tls {
		options.set_transport(Transport::Tls(TlsConfiguration::Native));
	}

	options
}

/// Builds `MqttOptions` from the parsed broker URI, connects with a
/// 3-second per-attempt timeout and unbounded retries, subscribes once to
/// `config.topic` at QoS 0, then spawns the task that drains the event
/// loop for the lifetime of the bridge.
pub(crate) async fn connect(unique_id: &str, config: &Config) -> Result<BrokerSession, BrokerError> {
	let options = build_mqtt_options(unique_id, config);
	let (client, mut event_loop) = AsyncClient::new(options, INFLIGHT.into());

	await_connack(&mut event_loop).await;

	let client = Arc::new(client);
	client.subscribe(config.topic.clone(), QoS::AtMostOnce).await?;

	let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
	let topic = config.topic.clone();
	let event_loop_task = tokio::spawn(drain_event_loop(event_loop, topic, tx, client.clone()));

	Ok(BrokerSession { client, incoming: rx, event_loop_task })
}

/// Polls the event loop until a `ConnAck` arrives, retrying indefinitely
/// past transient errors and per-attempt timeouts.
async fn await_connack(event_loop: &mut rumqttc::EventLoop) {
	loop {
		match tokio::time::timeout(CONNECT_TIMEOUT, event_loop.poll()).await {
			Ok(Ok(Event::Incoming(Incoming::ConnAck(_)))) => return,
			Ok(Ok(_)) => continue,
			Ok(Err(err)) => {
				log::warn!("broker connection attempt failed: {err}");
			}
			Err(_) => {
				log::warn!("broker connect attempt timed out after {CONNECT_TIMEOUT:?}");
			}
		}
	}
}

/// Forwards every publish on `topic` into `tx`. rumqttc reconnects on its
/// own after a connection loss, but does not replay the subscribe — every
/// `ConnAck` past the first one is therefore a reconnect, and the topic is
/// resubscribed explicitly so the mesh→wire direction doesn't go dark.
async fn drain_event_loop(mut event_loop: rumqttc::EventLoop, topic: String, tx: mpsc::Sender<Vec<u8>>, client: Arc<AsyncClient>) {
	loop {
		match event_loop.poll().await {
			Ok(Event::Incoming(Incoming::Publish(publish))) => {
				if publish.topic == topic && tx.send(publish.payload.to_vec()).await.is_err() {
					return;
				}
			}
			Ok(Event::Incoming(Incoming::ConnAck(_))) => {
				if let Err(err) = client.subscribe(topic.clone(), QoS::AtMostOnce).await {
					log::error!("failed to resubscribe to {topic} after reconnect: {err}");
				}
			}
			Ok(_) => {}
			Err(err) => {
				log::warn!("broker connection lost: {err}; will resubscribe on reconnect");
			}
		}
	}
}
