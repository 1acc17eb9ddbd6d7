//! Reader protocol transport abstraction
//!
//! A [`Transport`] talks to the physical reader: it opens and closes the
//! network link, performs synchronous request/response exchanges and pushes
//! asynchronous device events. The binary wire protocol lives entirely behind
//! this trait.
//!
//! Vendor SDKs usually expose pushed events as separate callback slots per
//! event kind and protocol. Here they arrive as one typed stream of
//! [`TransportEvent`]s, returned by [`Transport::open`] and owned by the
//! session's event pump.

pub mod mock;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::inventory::request::{EpcInventoryRequest, GbInventoryRequest, Iso6bInventoryRequest};
use crate::types::TagProtocol;

pub use mock::{MockDevice, MockTransport};

/// Stream of events pushed by the device for one open link.
pub type EventStream = mpsc::Receiver<TransportEvent>;

/// Network endpoint of a reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// IP address or host name
    pub address: String,
    /// TCP port
    pub port: u16,
}

impl Endpoint {
    /// Endpoint at `address:port`.
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Synchronous requests understood by the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Serial number and application version
    ReaderInfo,
    /// Baseband firmware version
    BasebandVersion,
    /// Power range and antenna count
    Capabilities,
    /// Configured power of every antenna
    GetPower,
    /// Set power for the listed antennas
    SetPower {
        /// dBm per 1-based antenna
        powers: BTreeMap<u8, i32>,
    },
    /// Start an EPC 6C inventory
    InventoryEpc(EpcInventoryRequest),
    /// Start an ISO 6B inventory
    Inventory6b(Iso6bInventoryRequest),
    /// Start a GB inventory
    InventoryGb(GbInventoryRequest),
    /// Stop any running inventory
    Stop,
}

impl Request {
    /// Short name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Request::ReaderInfo => "reader-info",
            Request::BasebandVersion => "baseband-version",
            Request::Capabilities => "capabilities",
            Request::GetPower => "get-power",
            Request::SetPower { .. } => "set-power",
            Request::InventoryEpc(_) => "inventory-epc",
            Request::Inventory6b(_) => "inventory-6b",
            Request::InventoryGb(_) => "inventory-gb",
            Request::Stop => "stop",
        }
    }
}

/// Device response to a [`Request`]. A `code` of 0 means success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Result code; 0 is success
    pub code: i32,
    /// Device message for failures
    pub message: String,
    /// Typed result data
    pub payload: ResponsePayload,
}

impl Response {
    /// Successful response with a payload.
    pub fn ok(payload: ResponsePayload) -> Self {
        Self {
            code: 0,
            message: String::new(),
            payload,
        }
    }

    /// Failed response carrying the device's message.
    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            payload: ResponsePayload::None,
        }
    }

    /// True for code 0.
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

/// Typed response payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsePayload {
    /// No data
    None,
    /// Answer to [`Request::ReaderInfo`]
    ReaderInfo {
        /// Serial number
        serial_number: String,
        /// Application firmware version
        app_version: String,
    },
    /// Answer to [`Request::BasebandVersion`]
    BasebandVersion(String),
    /// Answer to [`Request::Capabilities`]
    Capabilities {
        /// Lowest power (dBm)
        min_power: i32,
        /// Highest power (dBm)
        max_power: i32,
        /// Number of antenna ports
        antenna_count: u8,
    },
    /// Answer to [`Request::GetPower`]
    Power(BTreeMap<u8, i32>),
}

/// One tag detection as pushed by the device, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTagEvent {
    /// Protocol of the scan
    pub protocol: TagProtocol,
    /// Per-event result code; non-zero marks a malformed read
    pub result: i32,
    /// EPC as hex
    pub epc: Option<String>,
    /// TID as hex
    pub tid: Option<String>,
    /// User memory as hex
    pub user_data: Option<String>,
    /// Signal strength
    pub rssi: i32,
    /// 1-based antenna port
    pub antenna: u8,
}

impl RawTagEvent {
    /// Valid EPC-bearing event, handy for mocks and tests.
    pub fn epc(protocol: TagProtocol, epc: impl Into<String>, rssi: i32, antenna: u8) -> Self {
        Self {
            protocol,
            result: 0,
            epc: Some(epc.into()),
            tid: None,
            user_data: None,
            rssi,
            antenna,
        }
    }

    /// Valid 6B-style event identified only by TID.
    pub fn tid(protocol: TagProtocol, tid: impl Into<String>, rssi: i32, antenna: u8) -> Self {
        Self {
            protocol,
            result: 0,
            epc: None,
            tid: Some(tid.into()),
            user_data: None,
            rssi,
            antenna,
        }
    }

    /// Sets the result code.
    pub fn with_result(mut self, result: i32) -> Self {
        self.result = result;
        self
    }

    /// Adds a TID.
    pub fn with_tid(mut self, tid: impl Into<String>) -> Self {
        self.tid = Some(tid.into());
        self
    }

    /// Adds user data.
    pub fn with_user_data(mut self, user_data: impl Into<String>) -> Self {
        self.user_data = Some(user_data.into());
        self
    }
}

/// Asynchronous pushes from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The link dropped (e.g. heartbeat loss)
    Disconnected {
        /// Transport-supplied cause
        reason: String,
    },
    /// A tag was detected
    Tag(RawTagEvent),
    /// A scan pass completed
    ReadOver(TagProtocol),
}

/// Reader protocol transport binding.
///
/// Implementations serialise access to the link internally; methods take
/// `&self` so the session can share one transport between the command path
/// and the event pump.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens the link. The returned stream carries every pushed event for this
    /// link and ends when the link is closed.
    async fn open(
        &self,
        endpoint: &Endpoint,
        timeout: Duration,
    ) -> Result<EventStream, TransportError>;

    /// Closes the link. Closing an already closed link succeeds.
    async fn close(&self) -> Result<(), TransportError>;

    /// Sends one request and waits for the device's response.
    async fn send(&self, request: Request) -> Result<Response, TransportError>;

    /// Turns heartbeat monitoring on or off.
    async fn set_heartbeat(&self, enabled: bool) -> Result<(), TransportError>;
}
