//! Inventory control
//!
//! Starts and stops protocol-specific tag scans. One protocol is active at a
//! time; starting requires a connected, idle session. The scan state flips to
//! `Reading` only after the device accepts the start request, and back to
//! `Idle` when the device acknowledges a stop or the link goes away.
//!
//! GJB tags are receive-only: their events are aggregated, but there is no
//! start request for them.

pub mod events;
pub mod request;

use tracing::warn;

use crate::error::{CommandError, StartError};
use crate::session::Session;
use crate::types::{AntennaMask, InventoryState, ReadMode, TagProtocol};

use request::{ReadOptions, StartRequest};

/// Usage error for a protocol without a start request.
pub(crate) fn not_startable(protocol: TagProtocol) -> CommandError {
    CommandError::InvalidArgument(format!(
        "{} inventories cannot be started",
        protocol.display_name()
    ))
}

/// Scan state and the protocol of the last accepted start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InventoryCore {
    state: InventoryState,
    protocol: Option<TagProtocol>,
}

impl InventoryCore {
    /// Current scan state.
    pub fn state(&self) -> InventoryState {
        self.state
    }

    /// Protocol of the last accepted start.
    pub fn protocol(&self) -> Option<TagProtocol> {
        self.protocol
    }

    /// True while a scan runs.
    pub fn is_reading(&self) -> bool {
        self.state == InventoryState::Reading
    }

    pub(crate) fn begin(&mut self, protocol: TagProtocol) {
        self.state = InventoryState::Reading;
        self.protocol = Some(protocol);
    }

    /// Back to idle; the last protocol is kept for display.
    pub(crate) fn reset(&mut self) {
        self.state = InventoryState::Idle;
    }
}

/// Starts and stops scans over a [`Session`]. Cheap to clone.
#[derive(Clone)]
pub struct InventoryController {
    session: Session,
}

impl InventoryController {
    /// Controller for `session`.
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// Starts an EPC (6C) inventory.
    pub async fn start_epc(
        &self,
        antennas: AntennaMask,
        mode: ReadMode,
        read_tid: bool,
        read_user_data: bool,
    ) -> Result<(), StartError> {
        let options = ReadOptions::new(read_tid, read_user_data);
        self.start(StartRequest::epc(antennas, mode, options)).await
    }

    /// Starts an ISO 6B inventory. TID and user data are always read.
    pub async fn start_iso6b(
        &self,
        antennas: AntennaMask,
        mode: ReadMode,
    ) -> Result<(), StartError> {
        self.start(StartRequest::iso6b(antennas, mode)).await
    }

    /// Starts a GB inventory.
    pub async fn start_gb(
        &self,
        antennas: AntennaMask,
        mode: ReadMode,
        read_tid: bool,
        read_user_data: bool,
    ) -> Result<(), StartError> {
        let options = ReadOptions::new(read_tid, read_user_data);
        self.start(StartRequest::gb(antennas, mode, options)).await
    }

    /// Sends a prepared start request.
    pub async fn start(&self, start: StartRequest) -> Result<(), StartError> {
        let shared = self.session.shared();
        let _gate = shared.commands.lock().await;

        if !start.protocol.can_start() {
            return Err(not_startable(start.protocol));
        }
        if start.antennas.is_empty() {
            return Err(CommandError::InvalidArgument(
                "antenna mask selects no antenna".to_string(),
            ));
        }

        let link = {
            let state = shared.state.lock().await;
            let link = state.session.current_link().ok_or(CommandError::NotConnected)?;
            if state.inventory.is_reading() {
                return Err(CommandError::AlreadyReading);
            }
            if let Some(caps) = state.session.capabilities() {
                if !caps.covers(start.antennas) {
                    return Err(CommandError::InvalidArgument(format!(
                        "antenna mask {:#b} exceeds the device's {} antennas",
                        start.antennas.bits(),
                        caps.antenna_count
                    )));
                }
            }
            link
        };

        let protocol = start.protocol;
        let response = shared.transport.send(start.request).await?;
        if !response.is_ok() {
            shared.log(format!(
                "Failed to start {} inventory: {}",
                protocol.display_name(),
                response.message
            ));
            return Err(CommandError::Rejected {
                code: response.code,
                message: response.message,
            });
        }

        {
            let mut state = shared.state.lock().await;
            if !state.session.is_current(link) {
                return Err(CommandError::NotConnected);
            }
            state.inventory.begin(protocol);
        }
        shared.log(format!("Started {} inventory", protocol.display_name()));
        Ok(())
    }

    /// Stops the running scan. Returns whether the device acknowledged.
    pub async fn stop(&self) -> bool {
        let shared = self.session.shared();
        let _gate = shared.commands.lock().await;

        let current = shared.state.lock().await.session.current_link();
        let Some(link) = current else {
            return false;
        };

        match self.session.stop_inventory().await {
            Ok(response) if response.is_ok() => {
                let mut state = shared.state.lock().await;
                if state.session.is_current(link) {
                    state.inventory.reset();
                }
                drop(state);
                shared.log("Inventory stopped");
                true
            }
            Ok(response) => {
                shared.log(format!("Failed to stop inventory: {}", response.message));
                false
            }
            Err(e) => {
                warn!("Stop request failed: {}", e);
                false
            }
        }
    }

    /// Current scan state.
    pub async fn state(&self) -> InventoryState {
        self.session.shared().state.lock().await.inventory.state()
    }

    /// True while a scan runs.
    pub async fn is_reading(&self) -> bool {
        self.state().await == InventoryState::Reading
    }

    /// Protocol of the last accepted start, if any.
    pub async fn current_protocol(&self) -> Option<TagProtocol> {
        self.session.shared().state.lock().await.inventory.protocol()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_keeps_protocol_after_reset() {
        let mut core = InventoryCore::default();
        assert_eq!(core.state(), InventoryState::Idle);
        assert_eq!(core.protocol(), None);

        core.begin(TagProtocol::Gb);
        assert!(core.is_reading());
        core.reset();
        assert!(!core.is_reading());
        assert_eq!(core.protocol(), Some(TagProtocol::Gb));
    }
}
