//! The coordinator: wires the identity, filter, socket and broker layers
//! together and supervises the bridge's tasks.

use crate::broker::{self, BrokerSession};
use crate::config::Config;
use crate::errors::BridgeError;
use crate::filter::CompiledFilters;
use crate::iface::{self, TransmitDescriptor};
use crate::pipeline::{mesh_to_wire, wire_to_mesh};
use crate::identity;
use crate::socket::{self, ListenerSocket};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A fully assembled bridge instance: one per mesh segment.
///
/// Construct with [`Bridge::build`]; run it in the foreground with
/// [`run`](Self::run), which blocks for the process lifetime the way the
/// original core does, or in the background with
/// [`run_in_background`](Self::run_in_background) to get back a
/// [`BridgeHandle`] that supports graceful shutdown.
pub struct Bridge {
	config: Arc<Config>,
	unique_id: Arc<str>,
	filters: Arc<CompiledFilters>,
	low: Arc<ListenerSocket>,
	high: Arc<ListenerSocket>,
	transmit: Arc<Vec<TransmitDescriptor>>,
	broker: BrokerSession,
}

impl Bridge {
	/// Resolves identity, compiles filters, selects interfaces, binds the
	/// listener pair, and connects to the broker — everything that must
	/// succeed before the bridge can run at all.
	pub async fn build(config: Config) -> Result<Self, BridgeError> {
		let config = Arc::new(config);

		let unique_id: Arc<str> = Arc::from(identity::resolve(&config)?);
		log::info!("bridge identity: {unique_id}");

		let filters = Arc::new(config.compile_filters()?);
		log::debug!(
			"compiled {} label pattern(s) ({}), {} port pattern(s)",
			filters.label_regexes.len(),
			if filters.deny_mode { "deny" } else { "allow" },
			filters.port_regexes.len(),
		);

		let interfaces = iface::select_interfaces(&config)?;
		log::info!("monitoring {} interface(s): {}", interfaces.len(), interfaces.iter().map(|i| i.name.as_str()).collect::<Vec<_>>().join(", "));

		let listeners = socket::bind(&config, &interfaces)?;
		let broker = broker::connect(&unique_id, &config).await?;

		Ok(Self {
			config,
			unique_id,
			filters,
			low: Arc::new(listeners.low),
			high: Arc::new(listeners.high),
			transmit: Arc::new(listeners.transmit),
			broker,
		})
	}

	fn spawn_tasks(self) -> [JoinHandle<()>; 4] {
		let wire_low = tokio::spawn(wire_to_mesh::run(self.low.clone(), self.config.clone(), self.filters.clone(), self.unique_id.clone(), self.broker.client.clone()));
		let wire_high = tokio::spawn(wire_to_mesh::run(self.high.clone(), self.config.clone(), self.filters.clone(), self.unique_id.clone(), self.broker.client.clone()));
		let mesh = tokio::spawn(mesh_to_wire::run(self.broker.incoming, self.config, self.filters, self.unique_id, self.low, self.high, self.transmit));

		[wire_low, wire_high, mesh, self.broker.event_loop_task]
	}

	/// Runs until a task panics or exits. No socket error is fatal, so
	/// under normal operation this future never resolves — it only returns
	/// `Err` if a task itself panics.
	pub async fn run(self) -> Result<(), BridgeError> {
		let [wire_low, wire_high, mesh, event_loop] = self.spawn_tasks();
		tokio::try_join!(wire_low, wire_high, mesh, event_loop)?;
		Ok(())
	}

	/// Spawns the bridge's tasks and returns a [`BridgeHandle`] that can
	/// shut them down on demand.
	pub fn run_in_background(self) -> BridgeHandle {
		let handles = self.spawn_tasks();
		BridgeHandle { handles: Some(handles) }
	}
}

/// A running bridge. Dropping this without calling
/// [`shutdown`](Self::shutdown) leaves the bridge running in the
/// background — call `shutdown` to stop it.
pub struct BridgeHandle {
	handles: Option<[JoinHandle<()>; 4]>,
}

impl BridgeHandle {
	/// Aborts every task, including the broker's event-loop task, closing its
	/// connection. The current pipeline stages have no cooperative
	/// cancellation point, so shutdown is immediate rather than
	/// drain-to-quiescence.
	pub fn shutdown(mut self) {
		if let Some(handles) = self.handles.take() {
			for handle in handles {
				handle.abort();
			}
		}
	}
}
