//! Error types for the reader engine.
//!
//! Every failure in this crate is recoverable: the operator retries the
//! command that failed. The taxonomy follows the layers of the engine:
//!
//! - **`TransportError`**: raised by a [`Transport`](crate::transport::Transport)
//!   implementation (timeouts, refused connections, I/O faults, closed links).
//! - **`ConnectError`**: returned by `connect`. The session is always back in
//!   `Disconnected` when one of these is returned, and nothing is retried.
//! - **`CommandError`**: returned by start/stop/set-power commands. Carries the
//!   device's response code and message when the device rejected the request.
//!   Usage errors (wrong state, bad arguments) are reported before any request
//!   is sent.
//! - **`ConfigError`**: loading or validating [`ReaderConfig`](crate::config::ReaderConfig).
//! - **`ReaderError`**: umbrella type with `#[from]` conversions for
//!   application code that wants a single error type.
//!
//! Malformed tag events are not errors in this sense. They are described by
//! [`MalformedEvent`] for logging and dropped at the inventory boundary.

use std::time::Duration;

use thiserror::Error;

use crate::types::{SessionState, TagProtocol};

/// Convenience alias for results using the umbrella error type.
pub type AppResult<T> = std::result::Result<T, ReaderError>;

/// Failures reported by a transport binding.
#[derive(Error, Debug)]
pub enum TransportError {
    /// No answer within the deadline
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The peer refused the link
    #[error("connection refused: {0}")]
    Refused(String),

    /// No link is open
    #[error("link is closed")]
    Closed,

    /// Socket failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other binding failure
    #[error("transport fault: {0}")]
    Fault(String),
}

/// Failures of `connect`.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// The session was not `Disconnected`
    #[error("cannot connect while session is {0}")]
    InvalidState(SessionState),

    /// The link did not open in time
    #[error("connection to {address} timed out after {timeout:?}")]
    Timeout {
        /// Endpoint as `address:port`
        address: String,
        /// Deadline that expired
        timeout: Duration,
    },

    /// The reader refused the link
    #[error("connection to {address} refused: {reason}")]
    Refused {
        /// Endpoint as `address:port`
        address: String,
        /// Why the link was refused
        reason: String,
    },

    /// Other transport failure while opening
    #[error("transport error: {0}")]
    Transport(TransportError),

    /// The link dropped before the query sequence finished
    #[error("link was lost while querying device information")]
    LinkLost,
}

/// Failures of start, stop and set-power commands.
#[derive(Error, Debug)]
pub enum CommandError {
    /// No link is up
    #[error("reader is not connected")]
    NotConnected,

    /// A scan is already running
    #[error("an inventory is already running")]
    AlreadyReading,

    /// Bad antenna, power or protocol
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The device answered with a non-zero code
    #[error("device rejected request (code {code}): {message}")]
    Rejected {
        /// Device result code
        code: i32,
        /// Device message
        message: String,
    },

    /// The request never got an answer
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl CommandError {
    /// True for errors raised before any request reached the device.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            CommandError::NotConnected
                | CommandError::AlreadyReading
                | CommandError::InvalidArgument(_)
        )
    }
}

/// Error returned by `set_antenna_power`.
pub type PowerError = CommandError;

/// Error returned by the inventory start commands.
pub type StartError = CommandError;

/// Configuration loading and validation failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading or merging a source failed
    #[error("Configuration load error: {0}")]
    Load(#[from] Box<figment::Error>),

    /// A value failed validation
    #[error("Configuration validation error: {0}")]
    Validation(String),

    /// Encoding the defaults failed
    #[error("Configuration serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Writing the defaults failed
    #[error("Configuration write error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}

/// A tag event whose per-event result code was non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MalformedEvent {
    /// Protocol of the scan
    pub protocol: TagProtocol,
    /// Per-event result code
    pub code: i32,
}

impl std::fmt::Display for MalformedEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "discarded {} event with result code {}",
            self.protocol, self.code
        )
    }
}

/// Umbrella error for application code.
#[derive(Error, Debug)]
pub enum ReaderError {
    /// Configuration failure
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Connect failure
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Command failure
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Subscriber installation failure
    #[error("Logging setup error: {0}")]
    Logging(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_display_carries_device_message() {
        let err = CommandError::Rejected {
            code: 3,
            message: "power out of range".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "device rejected request (code 3): power out of range"
        );
        assert!(!err.is_usage_error());
    }

    #[test]
    fn test_usage_errors() {
        assert!(CommandError::AlreadyReading.is_usage_error());
        assert!(CommandError::NotConnected.is_usage_error());
        assert!(CommandError::InvalidArgument("mask".into()).is_usage_error());
        assert!(!CommandError::Transport(TransportError::Closed).is_usage_error());
    }

    #[test]
    fn test_connect_error_display() {
        let err = ConnectError::Timeout {
            address: "10.0.0.5:8160".into(),
            timeout: Duration::from_millis(3000),
        };
        assert!(err.to_string().contains("10.0.0.5:8160"));

        let err = ConnectError::InvalidState(SessionState::Connected);
        assert_eq!(err.to_string(), "cannot connect while session is Connected");
    }

    #[test]
    fn test_umbrella_conversion() {
        let err: ReaderError = CommandError::NotConnected.into();
        assert_eq!(err.to_string(), "reader is not connected");
    }

    #[test]
    fn test_malformed_event_display() {
        let event = MalformedEvent {
            protocol: TagProtocol::Gb,
            code: 2,
        };
        assert_eq!(event.to_string(), "discarded GB event with result code 2");
    }
}
