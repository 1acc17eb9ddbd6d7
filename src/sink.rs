//! Display sink notifications
//!
//! The engine reports everything a front end needs through [`DisplaySink`].
//! Notifications are delivered on the engine's own tasks; a sink that has to
//! update a UI thread marshals them itself, e.g. by draining a
//! [`ChannelSink`] from that thread.

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::aggregator::AggregationResult;
use crate::types::SessionSnapshot;

/// Receiver of engine notifications. Implementations must not block.
pub trait DisplaySink: Send + Sync {
    /// Connection came up (`Some`) or went away (`None`).
    fn on_connection_changed(&self, snapshot: Option<SessionSnapshot>);

    /// Operator-facing log line.
    fn on_log(&self, message: &str);

    /// A tag observation was aggregated (or reported as transient).
    fn on_tag_observed(&self, result: &AggregationResult);

    /// The device finished a scan pass; start controls may be re-enabled.
    fn on_scan_idle(&self);
}

/// Owned form of a sink notification.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    /// See [`DisplaySink::on_connection_changed`]
    ConnectionChanged(Option<SessionSnapshot>),
    /// See [`DisplaySink::on_log`]
    Log(String),
    /// See [`DisplaySink::on_tag_observed`]
    TagObserved(AggregationResult),
    /// See [`DisplaySink::on_scan_idle`]
    ScanIdle,
}

/// Forwards notifications over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    /// Creates the sink and the receiving end for the front end.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: SinkEvent) {
        // Front end gone; nothing left to notify.
        let _ = self.tx.send(event);
    }
}

impl DisplaySink for ChannelSink {
    fn on_connection_changed(&self, snapshot: Option<SessionSnapshot>) {
        self.forward(SinkEvent::ConnectionChanged(snapshot));
    }

    fn on_log(&self, message: &str) {
        self.forward(SinkEvent::Log(message.to_string()));
    }

    fn on_tag_observed(&self, result: &AggregationResult) {
        self.forward(SinkEvent::TagObserved(result.clone()));
    }

    fn on_scan_idle(&self) {
        self.forward(SinkEvent::ScanIdle);
    }
}

/// Sink that only writes to the tracing subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DisplaySink for TracingSink {
    fn on_connection_changed(&self, snapshot: Option<SessionSnapshot>) {
        match snapshot {
            Some(s) => info!(endpoint = %s.endpoint(), state = %s.state, "connection changed"),
            None => info!("connection closed"),
        }
    }

    fn on_log(&self, message: &str) {
        debug!(target: "rfid_reader::sink", "{}", message);
    }

    fn on_tag_observed(&self, result: &AggregationResult) {
        if let Some(record) = result.record() {
            debug!(
                key = %record.key,
                count = record.read_count,
                rssi = record.rssi,
                "tag observed"
            );
        }
    }

    fn on_scan_idle(&self) {
        debug!("scan idle");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_preserves_order() {
        let (sink, mut rx) = ChannelSink::new();
        sink.on_log("first");
        sink.on_scan_idle();
        sink.on_connection_changed(None);

        assert_eq!(rx.recv().await, Some(SinkEvent::Log("first".into())));
        assert_eq!(rx.recv().await, Some(SinkEvent::ScanIdle));
        assert_eq!(rx.recv().await, Some(SinkEvent::ConnectionChanged(None)));
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.on_log("nobody listening");
    }

    #[test]
    #[tracing_test::traced_test]
    fn test_tracing_sink_reports_connection_changes() {
        TracingSink.on_connection_changed(None);
        TracingSink.on_scan_idle();
        assert!(logs_contain("connection closed"));
        assert!(logs_contain("scan idle"));
    }
}
