//! State shared by the session, the inventory controller and the event pump.
//!
//! All mutable state lives in one [`EngineState`] behind one lock. The lock
//! is never held across a transport round-trip, so the event pump keeps
//! draining tag events while a command waits on the device.
//!
//! Operator commands are additionally serialised against each other by the
//! `commands` gate, which *is* held across the round-trip.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

use crate::aggregator::TagAggregator;
use crate::inventory::InventoryCore;
use crate::session::SessionCore;
use crate::sink::DisplaySink;
use crate::transport::Transport;
use crate::types::SessionSnapshot;

pub(crate) struct EngineState {
    pub(crate) session: SessionCore,
    pub(crate) inventory: InventoryCore,
    pub(crate) tags: TagAggregator,
    /// Event pump of the current link
    pub(crate) pump: Option<JoinHandle<()>>,
}

impl EngineState {
    fn new() -> Self {
        Self {
            session: SessionCore::new(),
            inventory: InventoryCore::default(),
            tags: TagAggregator::new(),
            pump: None,
        }
    }

    pub(crate) fn snapshot(&self) -> Option<SessionSnapshot> {
        let link = self.session.link()?;
        Some(SessionSnapshot {
            address: link.endpoint.address.clone(),
            port: link.endpoint.port,
            link_id: link.id,
            state: self.session.state(),
            identity: self.session.identity().clone(),
            capabilities: self.session.capabilities(),
            antenna_powers: self.session.antenna_powers().clone(),
            inventory: self.inventory.state(),
            protocol: self.inventory.protocol(),
        })
    }
}

pub(crate) struct Shared {
    pub(crate) state: Mutex<EngineState>,
    pub(crate) commands: Arc<Mutex<()>>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) sink: Arc<dyn DisplaySink>,
    pub(crate) heartbeat: bool,
}

impl Shared {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        sink: Arc<dyn DisplaySink>,
        heartbeat: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(EngineState::new()),
            commands: Arc::new(Mutex::new(())),
            transport,
            sink,
            heartbeat,
        })
    }

    /// Logs an operator-facing message and forwards it to the sink.
    pub(crate) fn log(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        info!("{}", message);
        self.sink.on_log(message);
    }
}
