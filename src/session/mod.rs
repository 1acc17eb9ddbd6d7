//! Reader session
//!
//! Owns the connection lifecycle and the device metadata cache:
//!
//! - `connect` opens the transport, enables heartbeat monitoring, starts the
//!   event pump for the new link and runs the device-info query sequence.
//! - `disconnect` stops a running inventory (best effort), closes the link and
//!   clears the cache. Calling it on a disconnected session does nothing.
//! - `set_antenna_power` updates one antenna and, on success, the cache.
//! - Pushed disconnects (heartbeat loss) are handled at most once per link.
//!
//! No operation is retried; the caller decides whether to try again.

mod state;

pub use state::{Link, SessionCore};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{CommandError, ConnectError, PowerError, TransportError};
use crate::inventory::events;
use crate::shared::Shared;
use crate::transport::{Endpoint, Request, Response};
use crate::types::{AntennaPowerMap, DeviceInfo, SessionSnapshot, SessionState};

/// Queries run after every successful connect, in order.
const DEVICE_INFO_SEQUENCE: [Request; 4] = [
    Request::ReaderInfo,
    Request::BasebandVersion,
    Request::Capabilities,
    Request::GetPower,
];

/// Handle to the session half of a reader. Cheap to clone.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    /// Connects to `endpoint`, failing after `timeout`.
    ///
    /// Must be called on a disconnected session. Returns whatever the
    /// device-info queries managed to collect; individual query failures are
    /// logged and skipped.
    ///
    /// Dropping the returned future before the link is up rolls the session
    /// back to `Disconnected`; the next command waits for that to finish.
    pub async fn connect(
        &self,
        endpoint: Endpoint,
        timeout: Duration,
    ) -> Result<DeviceInfo, ConnectError> {
        let gate = self.shared.commands.clone().lock_owned().await;

        self.shared.state.lock().await.session.begin_connect()?;
        let mut attempt = ConnectAttempt::new(self.shared.clone(), gate);
        self.shared.log(format!("Connecting to {endpoint}..."));

        let events = match self.open(&endpoint, timeout).await {
            Ok(events) => events,
            Err(err) => {
                self.shared.state.lock().await.session.abort_connect();
                attempt.disarm();
                self.shared.log(format!("Connection failed: {err}"));
                return Err(err);
            }
        };

        if self.shared.heartbeat {
            if let Err(e) = self.shared.transport.set_heartbeat(true).await {
                warn!(endpoint = %endpoint, "Failed to enable heartbeat: {}", e);
            }
        }

        let link = {
            let mut state = self.shared.state.lock().await;
            let link = state.session.complete_connect(endpoint.clone());
            state.inventory.reset();
            state.pump = Some(events::spawn_pump(self.shared.clone(), link, events));
            link
        };
        attempt.disarm();
        self.shared.log("Connected");

        let info = self.query_device_info(link).await;

        let snapshot = {
            let state = self.shared.state.lock().await;
            if !state.session.is_current(link) {
                return Err(ConnectError::LinkLost);
            }
            state.snapshot()
        };
        self.shared.sink.on_connection_changed(snapshot);
        Ok(info)
    }

    async fn open(
        &self,
        endpoint: &Endpoint,
        timeout: Duration,
    ) -> Result<crate::transport::EventStream, ConnectError> {
        let address = endpoint.to_string();
        match tokio::time::timeout(timeout, self.shared.transport.open(endpoint, timeout)).await {
            Ok(Ok(events)) => Ok(events),
            Ok(Err(TransportError::Timeout(_))) => Err(ConnectError::Timeout { address, timeout }),
            Ok(Err(TransportError::Refused(reason))) => {
                Err(ConnectError::Refused { address, reason })
            }
            Ok(Err(e)) => Err(ConnectError::Transport(e)),
            Err(_) => {
                // The open future was dropped mid-flight; release whatever it set up.
                if let Err(e) = self.shared.transport.close().await {
                    debug!("close after open timeout failed: {}", e);
                }
                Err(ConnectError::Timeout { address, timeout })
            }
        }
    }

    async fn query_device_info(&self, link: Uuid) -> DeviceInfo {
        for request in DEVICE_INFO_SEQUENCE {
            let name = request.name();
            match self.shared.transport.send(request).await {
                Ok(response) if response.is_ok() => {
                    let lines = self
                        .shared
                        .state
                        .lock()
                        .await
                        .session
                        .apply_device_info(link, response.payload);
                    for line in lines {
                        self.shared.log(line);
                    }
                }
                Ok(response) => {
                    warn!(
                        query = name,
                        code = response.code,
                        "Device-info query failed: {}",
                        response.message
                    );
                }
                Err(e) => {
                    warn!(query = name, "Device-info query failed: {}", e);
                }
            }

            if !self.shared.state.lock().await.session.is_current(link) {
                break;
            }
        }

        self.shared.state.lock().await.session.device_info()
    }

    /// Tears the link down. No-op unless connected.
    pub async fn disconnect(&self) {
        let _gate = self.shared.commands.lock().await;

        let (was_reading, pump) = {
            let mut state = self.shared.state.lock().await;
            if !state.session.begin_disconnect() {
                return;
            }
            (state.inventory.is_reading(), state.pump.take())
        };

        if was_reading {
            match self.stop_inventory().await {
                Ok(response) if response.is_ok() => debug!("Inventory stopped before disconnect"),
                Ok(response) => debug!(code = response.code, "Stop before disconnect rejected"),
                Err(e) => debug!("Stop before disconnect failed: {}", e),
            }
        }

        if let Err(e) = self.shared.transport.close().await {
            warn!("Error while closing link: {}", e);
        }

        {
            let mut state = self.shared.state.lock().await;
            state.session.finish_disconnect();
            state.inventory.reset();
        }
        if let Some(pump) = pump {
            pump.abort();
        }

        self.shared.log("Disconnected");
        self.shared.sink.on_connection_changed(None);
    }

    /// Sets the transmit power of one antenna (1-based).
    ///
    /// The device validates the power; a rejection leaves the cache untouched.
    pub async fn set_antenna_power(&self, antenna: u8, power: i32) -> Result<(), PowerError> {
        let _gate = self.shared.commands.lock().await;

        if antenna == 0 {
            return Err(CommandError::InvalidArgument(
                "antenna indices start at 1".to_string(),
            ));
        }

        let link = {
            let state = self.shared.state.lock().await;
            let link = state.session.current_link().ok_or(CommandError::NotConnected)?;
            if let Some(caps) = state.session.capabilities() {
                if antenna > caps.antenna_count {
                    return Err(CommandError::InvalidArgument(format!(
                        "antenna {antenna} does not exist (device has {})",
                        caps.antenna_count
                    )));
                }
            }
            link
        };

        let request = Request::SetPower {
            powers: BTreeMap::from([(antenna, power)]),
        };
        let response = self.shared.transport.send(request).await?;
        if !response.is_ok() {
            self.shared
                .log(format!("Failed to set power: {}", response.message));
            return Err(CommandError::Rejected {
                code: response.code,
                message: response.message,
            });
        }

        if !self
            .shared
            .state
            .lock()
            .await
            .session
            .set_antenna_power(link, antenna, power)
        {
            return Err(CommandError::NotConnected);
        }
        self.shared
            .log(format!("Antenna {antenna} power set to {power} dBm"));
        Ok(())
    }

    /// Sends the stop-inventory request. Callers hold the command gate.
    pub(crate) async fn stop_inventory(&self) -> Result<Response, TransportError> {
        self.shared.transport.send(Request::Stop).await
    }

    /// Connection state.
    pub async fn state(&self) -> SessionState {
        self.shared.state.lock().await.session.state()
    }

    /// True when connected.
    pub async fn is_connected(&self) -> bool {
        self.state().await == SessionState::Connected
    }

    /// Cached identity and capabilities of the connected device.
    pub async fn device_info(&self) -> DeviceInfo {
        self.shared.state.lock().await.session.device_info()
    }

    /// Cached antenna powers.
    pub async fn antenna_powers(&self) -> AntennaPowerMap {
        self.shared.state.lock().await.session.antenna_powers().clone()
    }

    /// Snapshot of the current link, if any.
    pub async fn snapshot(&self) -> Option<SessionSnapshot> {
        self.shared.state.lock().await.snapshot()
    }
}

/// Holds the command gate for one `connect` call and undoes a half-finished
/// connect if the call is dropped before the link is established.
struct ConnectAttempt {
    shared: Arc<Shared>,
    gate: Option<OwnedMutexGuard<()>>,
    armed: bool,
}

impl ConnectAttempt {
    fn new(shared: Arc<Shared>, gate: OwnedMutexGuard<()>) -> Self {
        Self {
            shared,
            gate: Some(gate),
            armed: true,
        }
    }

    /// The session no longer sits in `Connecting` on our behalf.
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ConnectAttempt {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let shared = self.shared.clone();
        // The gate moves into the rollback so no command sees `Connecting`.
        let gate = self.gate.take();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let _gate = gate;
                    rollback_connect(&shared).await;
                });
            }
            Err(_) => {
                if let Ok(mut state) = shared.state.try_lock() {
                    state.session.abort_connect();
                }
            }
        }
    }
}

async fn rollback_connect(shared: &Shared) {
    let was_connecting = {
        let mut state = shared.state.lock().await;
        let connecting = state.session.state() == SessionState::Connecting;
        state.session.abort_connect();
        connecting
    };
    if !was_connecting {
        return;
    }
    if let Err(e) = shared.transport.close().await {
        debug!("close after cancelled connect failed: {}", e);
    }
    shared.log("Connection attempt cancelled");
}

/// Handles a pushed disconnect for `link`. Returns true if this signal tore
/// the session down, false if it was a duplicate or stale.
pub(crate) async fn handle_link_lost(shared: &Shared, link: Uuid, reason: &str) -> bool {
    {
        let mut state = shared.state.lock().await;
        if !state.session.link_lost(link) {
            return false;
        }
        state.inventory.reset();
        // Called from inside the pump; dropping the handle detaches it.
        state.pump = None;
    }

    warn!(%link, "Link lost: {}", reason);
    shared.log(format!("Connection lost: {reason}"));
    shared.sink.on_connection_changed(None);
    true
}
