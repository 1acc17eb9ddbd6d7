//! Reader facade
//!
//! [`RfidReader`] bundles a [`Session`], an [`InventoryController`] and the
//! tag table behind one handle. Front ends talk to this type; the session and
//! controller stay reachable for code that only needs one half.

use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;

use crate::aggregator::{TagKey, TagRecord};
use crate::config::{ReaderConfig, DEFAULT_READER_PORT};
use crate::error::{ConnectError, PowerError, StartError};
use crate::inventory::request::StartRequest;
use crate::inventory::{not_startable, InventoryController};
use crate::session::Session;
use crate::shared::Shared;
use crate::sink::DisplaySink;
use crate::transport::{Endpoint, Transport};
use crate::types::{
    AntennaMask, AntennaPowerMap, DeviceInfo, InventoryState, ReadMode, SessionSnapshot,
    SessionState, TagProtocol,
};

/// Connection, inventory and tag table of one reader. Cheap to clone.
#[derive(Clone)]
pub struct RfidReader {
    session: Session,
    inventory: InventoryController,
    config: ReaderConfig,
}

impl RfidReader {
    /// Reader with default configuration.
    pub fn new(transport: Arc<dyn Transport>, sink: Arc<dyn DisplaySink>) -> Self {
        Self::with_config(transport, sink, &ReaderConfig::default())
    }

    /// Reader using `config` for heartbeat, endpoint and inventory defaults.
    pub fn with_config(
        transport: Arc<dyn Transport>,
        sink: Arc<dyn DisplaySink>,
        config: &ReaderConfig,
    ) -> Self {
        let shared = Shared::new(transport, sink, config.reader.heartbeat);
        let session = Session::new(shared);
        let inventory = InventoryController::new(session.clone());
        Self {
            session,
            inventory,
            config: config.clone(),
        }
    }

    /// The connection half.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The inventory half.
    pub fn inventory(&self) -> &InventoryController {
        &self.inventory
    }

    /// Configuration the reader was built with.
    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    // ---- connection ----

    /// Connects to `address:port`.
    #[instrument(skip(self), err)]
    pub async fn connect(
        &self,
        address: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<DeviceInfo, ConnectError> {
        self.session
            .connect(Endpoint::new(address, port), timeout)
            .await
    }

    /// Connects on the reader's factory port (8160).
    pub async fn connect_default(
        &self,
        address: &str,
        timeout: Duration,
    ) -> Result<DeviceInfo, ConnectError> {
        self.connect(address, DEFAULT_READER_PORT, timeout).await
    }

    /// Connects to the configured endpoint with the configured timeout.
    pub async fn connect_configured(&self) -> Result<DeviceInfo, ConnectError> {
        let reader = &self.config.reader;
        self.session
            .connect(reader.endpoint(), reader.connect_timeout())
            .await
    }

    /// Stops any scan and closes the link. Safe to call in any state.
    pub async fn disconnect(&self) {
        self.session.disconnect().await;
    }

    /// Sets one antenna's transmit power (dBm).
    pub async fn set_antenna_power(&self, antenna: u8, power: i32) -> Result<(), PowerError> {
        self.session.set_antenna_power(antenna, power).await
    }

    // ---- inventory ----

    /// Starts an EPC 6C scan.
    pub async fn start_epc(
        &self,
        antennas: AntennaMask,
        mode: ReadMode,
        read_tid: bool,
        read_user_data: bool,
    ) -> Result<(), StartError> {
        self.inventory
            .start_epc(antennas, mode, read_tid, read_user_data)
            .await
    }

    /// Starts an ISO 6B scan.
    pub async fn start_iso6b(
        &self,
        antennas: AntennaMask,
        mode: ReadMode,
    ) -> Result<(), StartError> {
        self.inventory.start_iso6b(antennas, mode).await
    }

    /// Starts a GB scan.
    pub async fn start_gb(
        &self,
        antennas: AntennaMask,
        mode: ReadMode,
        read_tid: bool,
        read_user_data: bool,
    ) -> Result<(), StartError> {
        self.inventory
            .start_gb(antennas, mode, read_tid, read_user_data)
            .await
    }

    /// Starts `protocol` with the configured inventory defaults.
    ///
    /// GJB has no start request and is rejected as a usage error.
    pub async fn start_default(&self, protocol: TagProtocol) -> Result<(), StartError> {
        let mode = self.config.inventory.mode;
        let antennas = self.config.inventory.antennas();
        let options = self.config.inventory.options();
        let request = StartRequest::for_protocol(protocol, antennas, mode, options)
            .ok_or_else(|| not_startable(protocol))?;
        self.inventory.start(request).await
    }

    /// Stops the running scan. Returns whether the device acknowledged.
    pub async fn stop(&self) -> bool {
        self.inventory.stop().await
    }

    // ---- tag table ----

    /// Empties the tag table. Scan and connection state are untouched.
    pub async fn clear_tags(&self) {
        self.session.shared().state.lock().await.tags.clear();
    }

    /// Tag records in first-seen order.
    pub async fn tags(&self) -> Vec<TagRecord> {
        self.session.shared().state.lock().await.tags.snapshot()
    }

    /// Record for one identity.
    pub async fn tag(&self, key: &TagKey) -> Option<TagRecord> {
        self.session.shared().state.lock().await.tags.get(key).cloned()
    }

    /// Distinct identities since the last clear.
    pub async fn unique_tags(&self) -> usize {
        self.session.shared().state.lock().await.tags.unique_tags()
    }

    /// Observations aggregated since the last clear.
    pub async fn total_reads(&self) -> u64 {
        self.session.shared().state.lock().await.tags.total_reads()
    }

    // ---- status ----

    /// Connection state.
    pub async fn state(&self) -> SessionState {
        self.session.state().await
    }

    /// Scan state.
    pub async fn inventory_state(&self) -> InventoryState {
        self.inventory.state().await
    }

    /// True while a scan runs.
    pub async fn is_reading(&self) -> bool {
        self.inventory.is_reading().await
    }

    /// Protocol of the last accepted start.
    pub async fn current_protocol(&self) -> Option<TagProtocol> {
        self.inventory.current_protocol().await
    }

    /// Cached device identity and capabilities.
    pub async fn device_info(&self) -> DeviceInfo {
        self.session.device_info().await
    }

    /// Cached antenna powers.
    pub async fn antenna_powers(&self) -> AntennaPowerMap {
        self.session.antenna_powers().await
    }

    /// Current session view, `None` when not connected.
    pub async fn snapshot(&self) -> Option<SessionSnapshot> {
        self.session.snapshot().await
    }
}
