//! Core library for the RFID reader control engine.
//!
//! Connects to a fixed UHF RFID reader over a [`Transport`](transport::Transport),
//! queries its identity and capabilities, runs protocol-specific tag
//! inventories (EPC 6C, ISO 6B, GB) and aggregates the streamed tag
//! observations into a de-duplicated table. Everything a front end needs is
//! reported through a [`DisplaySink`](sink::DisplaySink).
//!
//! [`RfidReader`] is the entry point:
//!
//! ```rust,ignore
//! let reader = RfidReader::new(transport, Arc::new(TracingSink));
//! reader.connect("192.168.1.168", 8160, Duration::from_secs(3)).await?;
//! reader.start_epc(AntennaMask::from_bits(0b0001), ReadMode::Continuous, true, false).await?;
//! ```

pub mod aggregator;
pub mod config;
pub mod error;
pub mod inventory;
pub mod logging;
pub mod reader;
pub mod session;
mod shared;
pub mod sink;
pub mod transport;
pub mod types;

pub use aggregator::{AggregationResult, TagAggregator, TagKey, TagRecord};
pub use config::ReaderConfig;
pub use error::{AppResult, CommandError, ConnectError, ReaderError, TransportError};
pub use reader::RfidReader;
pub use sink::{ChannelSink, DisplaySink, SinkEvent, TracingSink};
pub use types::{
    AntennaMask, DeviceCapabilities, DeviceIdentity, DeviceInfo, InventoryState, ReadMode,
    SessionSnapshot, SessionState, TagProtocol,
};
