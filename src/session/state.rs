//! Session state machine
//!
//! [`SessionCore`] holds the connection state and the device metadata cache.
//! It performs no I/O; [`Session`](super::Session) drives it from behind the
//! shared state lock.
//!
//! Transitions:
//!
//! ```text
//! Disconnected --begin_connect--> Connecting --complete_connect--> Connected
//!      ^                             |                               |   |
//!      +--------abort_connect--------+                               |   |
//!      +------------------------link_lost----------------------------+   |
//!      +--finish_disconnect-- Disconnecting <--begin_disconnect----------+
//! ```
//!
//! Only a `Connected` session for the matching link id can be torn down by
//! `link_lost`, so repeated disconnect signals for the same link are no-ops.

use uuid::Uuid;

use crate::error::ConnectError;
use crate::transport::{Endpoint, ResponsePayload};
use crate::types::{
    AntennaPowerMap, DeviceCapabilities, DeviceIdentity, DeviceInfo, SessionState,
};

/// An established link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Link id; events carry it
    pub id: Uuid,
    /// Where the link goes
    pub endpoint: Endpoint,
}

/// Connection state plus device metadata cache.
#[derive(Debug, Default)]
pub struct SessionCore {
    state: SessionState,
    link: Option<Link>,
    identity: DeviceIdentity,
    capabilities: Option<DeviceCapabilities>,
    powers: AntennaPowerMap,
}

impl SessionCore {
    /// Disconnected session with empty caches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connection state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The link, while one exists.
    pub fn link(&self) -> Option<&Link> {
        self.link.as_ref()
    }

    /// Id of the link if the session is connected.
    pub fn current_link(&self) -> Option<Uuid> {
        match self.state {
            SessionState::Connected => self.link.as_ref().map(|l| l.id),
            _ => None,
        }
    }

    /// True while connected over the link `id`.
    pub fn is_current(&self, id: Uuid) -> bool {
        self.current_link() == Some(id)
    }

    /// Cached identity.
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Cached capabilities.
    pub fn capabilities(&self) -> Option<DeviceCapabilities> {
        self.capabilities
    }

    /// Cached antenna powers.
    pub fn antenna_powers(&self) -> &AntennaPowerMap {
        &self.powers
    }

    /// Identity and capabilities together.
    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            identity: self.identity.clone(),
            capabilities: self.capabilities,
        }
    }

    /// Disconnected -> Connecting.
    pub fn begin_connect(&mut self) -> Result<(), ConnectError> {
        match self.state {
            SessionState::Disconnected => {
                self.state = SessionState::Connecting;
                Ok(())
            }
            other => Err(ConnectError::InvalidState(other)),
        }
    }

    /// Connecting -> Disconnected after a failed open.
    pub fn abort_connect(&mut self) {
        if self.state == SessionState::Connecting {
            self.reset();
        }
    }

    /// Connecting -> Connected. Returns the id of the new link.
    pub fn complete_connect(&mut self, endpoint: Endpoint) -> Uuid {
        self.reset();
        let id = Uuid::new_v4();
        self.link = Some(Link { id, endpoint });
        self.state = SessionState::Connected;
        id
    }

    /// Connected -> Disconnecting. Returns false when there is nothing to tear down.
    pub fn begin_disconnect(&mut self) -> bool {
        if self.state == SessionState::Connected {
            self.state = SessionState::Disconnecting;
            true
        } else {
            false
        }
    }

    /// Any state -> Disconnected, clearing the device cache.
    pub fn finish_disconnect(&mut self) {
        self.reset();
    }

    /// Handles a pushed disconnect for link `id`. Returns true only for the
    /// first signal of a live link.
    pub fn link_lost(&mut self, id: Uuid) -> bool {
        if self.is_current(id) {
            self.reset();
            true
        } else {
            false
        }
    }

    /// Stores a device-info query result. Ignored unless connected over `id`.
    /// Returns the operator log lines describing what was stored.
    pub fn apply_device_info(&mut self, id: Uuid, payload: ResponsePayload) -> Vec<String> {
        if !self.is_current(id) {
            return Vec::new();
        }

        match payload {
            ResponsePayload::ReaderInfo {
                serial_number,
                app_version,
            } => {
                let lines = vec![
                    format!("Serial number: {serial_number}"),
                    format!("Application version: {app_version}"),
                ];
                self.identity.serial_number = Some(serial_number);
                self.identity.app_version = Some(app_version);
                lines
            }
            ResponsePayload::BasebandVersion(version) => {
                let line = format!("Baseband version: {version}");
                self.identity.base_version = Some(version);
                vec![line]
            }
            ResponsePayload::Capabilities {
                min_power,
                max_power,
                antenna_count,
            } => {
                self.capabilities = Some(DeviceCapabilities {
                    min_power,
                    max_power,
                    antenna_count,
                });
                vec![
                    format!("Antenna count: {antenna_count}"),
                    format!("Power range: {min_power} ~ {max_power} dBm"),
                ]
            }
            ResponsePayload::Power(powers) => {
                self.powers = powers.into_iter().collect();
                self.powers
                    .iter()
                    .map(|(antenna, power)| format!("Antenna {antenna} power: {power} dBm"))
                    .collect()
            }
            ResponsePayload::None => Vec::new(),
        }
    }

    /// Records a power the device accepted. Ignored unless connected over `id`.
    pub fn set_antenna_power(&mut self, id: Uuid, antenna: u8, power: i32) -> bool {
        if !self.is_current(id) {
            return false;
        }
        self.powers.set(antenna, power);
        true
    }

    fn reset(&mut self) {
        self.state = SessionState::Disconnected;
        self.link = None;
        self.identity = DeviceIdentity::default();
        self.capabilities = None;
        self.powers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn connected() -> (SessionCore, Uuid) {
        let mut core = SessionCore::new();
        core.begin_connect().unwrap();
        let id = core.complete_connect(Endpoint::new("10.0.0.5", 8160));
        (core, id)
    }

    #[test]
    fn test_connect_only_from_disconnected() {
        let (mut core, _) = connected();
        assert!(matches!(
            core.begin_connect(),
            Err(ConnectError::InvalidState(SessionState::Connected))
        ));
    }

    #[test]
    fn test_abort_connect_returns_to_disconnected() {
        let mut core = SessionCore::new();
        core.begin_connect().unwrap();
        assert_eq!(core.state(), SessionState::Connecting);
        core.abort_connect();
        assert_eq!(core.state(), SessionState::Disconnected);
        assert!(core.begin_connect().is_ok());
    }

    #[test]
    fn test_link_lost_is_latched() {
        let (mut core, id) = connected();
        assert!(core.link_lost(id));
        assert!(!core.link_lost(id));
        assert_eq!(core.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_link_lost_ignored_while_disconnecting() {
        let (mut core, id) = connected();
        assert!(core.begin_disconnect());
        assert!(!core.link_lost(id));
        assert_eq!(core.state(), SessionState::Disconnecting);
        core.finish_disconnect();
        assert_eq!(core.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_stale_link_cannot_write_cache() {
        let (mut core, old) = connected();
        core.link_lost(old);
        core.begin_connect().unwrap();
        let new = core.complete_connect(Endpoint::new("10.0.0.5", 8160));
        assert_ne!(old, new);

        let lines = core.apply_device_info(
            old,
            ResponsePayload::BasebandVersion("1.0".into()),
        );
        assert!(lines.is_empty());
        assert!(core.identity().base_version.is_none());
        assert!(!core.set_antenna_power(old, 1, 20));
    }

    #[test]
    fn test_device_info_cleared_on_disconnect() {
        let (mut core, id) = connected();
        core.apply_device_info(
            id,
            ResponsePayload::ReaderInfo {
                serial_number: "SN-1".into(),
                app_version: "2.1".into(),
            },
        );
        core.apply_device_info(
            id,
            ResponsePayload::Capabilities {
                min_power: 10,
                max_power: 30,
                antenna_count: 4,
            },
        );
        core.apply_device_info(
            id,
            ResponsePayload::Power(BTreeMap::from([(1, 30), (2, 25)])),
        );
        assert_eq!(core.identity().serial_number.as_deref(), Some("SN-1"));
        assert_eq!(core.antenna_powers().len(), 2);

        core.begin_disconnect();
        core.finish_disconnect();
        assert_eq!(core.device_info(), DeviceInfo::default());
        assert!(core.antenna_powers().is_empty());
        assert!(core.link().is_none());
    }

    #[test]
    fn test_power_log_lines() {
        let (mut core, id) = connected();
        let lines = core.apply_device_info(
            id,
            ResponsePayload::Power(BTreeMap::from([(2, 25), (1, 30)])),
        );
        assert_eq!(
            lines,
            vec!["Antenna 1 power: 30 dBm", "Antenna 2 power: 25 dBm"]
        );
    }
}
