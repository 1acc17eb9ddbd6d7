//! Shared data model for sessions, devices and inventories.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Protocols and scan modes
// =============================================================================

/// Air protocol of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagProtocol {
    /// EPC Gen2 (ISO 18000-6C)
    #[serde(rename = "EPC_6C")]
    Epc6c,
    /// ISO 18000-6B
    #[serde(rename = "ISO_6B")]
    Iso6b,
    /// GB national standard
    #[serde(rename = "GB")]
    Gb,
    /// GJB military standard (receive-only)
    #[serde(rename = "GJB")]
    Gjb,
}

impl TagProtocol {
    /// All protocols, in dispatch-table order.
    pub const ALL: [TagProtocol; 4] = [
        TagProtocol::Epc6c,
        TagProtocol::Iso6b,
        TagProtocol::Gb,
        TagProtocol::Gjb,
    ];

    /// Human readable label for tables and status bars.
    pub fn display_name(&self) -> &'static str {
        match self {
            TagProtocol::Epc6c => "EPC (6C)",
            TagProtocol::Iso6b => "ISO 6B",
            TagProtocol::Gb => "GB",
            TagProtocol::Gjb => "GJB",
        }
    }

    /// Whether the engine can start an inventory for this protocol.
    pub fn can_start(&self) -> bool {
        !matches!(self, TagProtocol::Gjb)
    }
}

impl fmt::Display for TagProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            TagProtocol::Epc6c => "EPC_6C",
            TagProtocol::Iso6b => "ISO_6B",
            TagProtocol::Gb => "GB",
            TagProtocol::Gjb => "GJB",
        };
        f.write_str(tag)
    }
}

/// Inventory scan mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadMode {
    /// One pass over the field, then the device reports read-over.
    Single,
    /// Scan until stopped.
    #[default]
    Continuous,
}

impl ReadMode {
    /// Value carried in the inventory request.
    pub fn wire_value(&self) -> u8 {
        match self {
            ReadMode::Single => 0,
            ReadMode::Continuous => 1,
        }
    }
}

/// Bitmask of antenna ports taking part in a scan. Bit `n - 1` selects antenna `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AntennaMask(u32);

impl AntennaMask {
    /// Wraps raw mask bits.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Mask selecting a single antenna (1-based). Returns `None` outside 1..=32.
    pub fn single(antenna: u8) -> Option<Self> {
        if (1..=32).contains(&antenna) {
            Some(Self(1u32 << (antenna - 1)))
        } else {
            None
        }
    }

    /// Raw mask bits.
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// True when no antenna is selected.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Selected antenna indices in ascending order.
    pub fn antennas(&self) -> impl Iterator<Item = u8> + '_ {
        (1u8..=32).filter(move |n| self.0 & (1u32 << (n - 1)) != 0)
    }

    /// Highest selected antenna index.
    pub fn highest(&self) -> Option<u8> {
        if self.0 == 0 {
            None
        } else {
            Some((32 - self.0.leading_zeros()) as u8)
        }
    }
}

impl FromIterator<u8> for AntennaMask {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        let bits = iter
            .into_iter()
            .filter_map(AntennaMask::single)
            .fold(0u32, |acc, m| acc | m.bits());
        Self(bits)
    }
}

impl Default for AntennaMask {
    fn default() -> Self {
        Self(1)
    }
}

// =============================================================================
// Session and inventory state
// =============================================================================

/// Lifecycle of the connection to the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// No link
    #[default]
    Disconnected,
    /// Opening the link
    Connecting,
    /// Link up
    Connected,
    /// Closing the link
    Disconnecting,
}

impl SessionState {
    /// Status label for connection indicators.
    pub fn status_text(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "Disconnected",
            SessionState::Connecting => "Connecting...",
            SessionState::Connected => "Connected",
            SessionState::Disconnecting => "Disconnecting...",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Whether a scan is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InventoryState {
    /// No scan
    #[default]
    Idle,
    /// Scan running
    Reading,
}

// =============================================================================
// Device metadata
// =============================================================================

/// Identity strings reported by the device. Each field is filled by its own
/// query and stays `None` when that query failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Device serial number
    pub serial_number: Option<String>,
    /// Application firmware version
    pub app_version: Option<String>,
    /// Baseband firmware version
    pub base_version: Option<String>,
}

/// Power range and antenna count reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    /// Minimum transmit power in dBm
    pub min_power: i32,
    /// Maximum transmit power in dBm
    pub max_power: i32,
    /// Number of antenna ports
    pub antenna_count: u8,
}

impl DeviceCapabilities {
    /// True if every antenna in `mask` exists on the device.
    pub fn covers(&self, mask: AntennaMask) -> bool {
        mask.highest()
            .map_or(true, |highest| highest <= self.antenna_count)
    }
}

/// Configured power per antenna (dBm), keyed by 1-based antenna index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AntennaPowerMap(BTreeMap<u8, i32>);

impl AntennaPowerMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Power of one antenna.
    pub fn get(&self, antenna: u8) -> Option<i32> {
        self.0.get(&antenna).copied()
    }

    pub(crate) fn set(&mut self, antenna: u8, power: i32) {
        self.0.insert(antenna, power);
    }

    pub(crate) fn clear(&mut self) {
        self.0.clear();
    }

    /// Number of antennas with a known power.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if no power is known.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries in ascending antenna order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, i32)> + '_ {
        self.0.iter().map(|(a, p)| (*a, *p))
    }
}

impl FromIterator<(u8, i32)> for AntennaPowerMap {
    fn from_iter<I: IntoIterator<Item = (u8, i32)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Identity and capabilities gathered by the device-info query sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Identity strings
    pub identity: DeviceIdentity,
    /// Capabilities, if that query succeeded
    pub capabilities: Option<DeviceCapabilities>,
}

/// Read-only view of a session handed to display sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Reader address
    pub address: String,
    /// Reader port
    pub port: u16,
    /// Id of the current link
    pub link_id: Uuid,
    /// Connection state
    pub state: SessionState,
    /// Identity strings
    pub identity: DeviceIdentity,
    /// Capabilities, if known
    pub capabilities: Option<DeviceCapabilities>,
    /// Cached antenna powers
    pub antenna_powers: AntennaPowerMap,
    /// Scan state
    pub inventory: InventoryState,
    /// Protocol of the last accepted start
    pub protocol: Option<TagProtocol>,
}

impl SessionSnapshot {
    /// `address:port` of the link.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_antenna_mask_bits() {
        let mask = AntennaMask::single(1).unwrap();
        assert_eq!(mask.bits(), 0b0001);
        assert_eq!(AntennaMask::single(4).unwrap().bits(), 0b1000);
        assert!(AntennaMask::single(0).is_none());
        assert!(AntennaMask::single(33).is_none());

        let mask: AntennaMask = [1, 3].into_iter().collect();
        assert_eq!(mask.bits(), 0b0101);
        assert_eq!(mask.antennas().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(mask.highest(), Some(3));
        assert_eq!(AntennaMask::from_bits(0).highest(), None);
    }

    #[test]
    fn test_capabilities_cover_mask() {
        let caps = DeviceCapabilities {
            min_power: 10,
            max_power: 30,
            antenna_count: 4,
        };
        assert!(caps.covers(AntennaMask::from_bits(0b1111)));
        assert!(!caps.covers(AntennaMask::from_bits(0b1_0000)));
    }

    #[test]
    fn test_protocol_labels() {
        assert_eq!(TagProtocol::Epc6c.to_string(), "EPC_6C");
        assert_eq!(TagProtocol::Iso6b.display_name(), "ISO 6B");
        assert!(!TagProtocol::Gjb.can_start());
        assert_eq!(
            serde_json::to_string(&TagProtocol::Epc6c).unwrap(),
            "\"EPC_6C\""
        );
    }

    #[test]
    fn test_read_mode_wire_values() {
        assert_eq!(ReadMode::Single.wire_value(), 0);
        assert_eq!(ReadMode::Continuous.wire_value(), 1);
    }

    #[test]
    fn test_power_map_ordered() {
        let map: AntennaPowerMap = [(3, 20), (1, 30)].into_iter().collect();
        assert_eq!(map.iter().collect::<Vec<_>>(), vec![(1, 30), (3, 20)]);
        assert_eq!(map.get(3), Some(20));
        assert_eq!(map.get(2), None);
    }
}
