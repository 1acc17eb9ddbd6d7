//! End-to-end walk through the reader engine against the in-memory mock.
//!
//! Run with:
//! ```bash
//! cargo run --example mock_session
//! ```
//!
//! Configuration comes from `rfid_reader.toml` if present, overridden by
//! `RFID_READER_*` variables:
//! ```bash
//! RFID_READER_APPLICATION__LOG_LEVEL=debug cargo run --example mock_session
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rfid_reader::transport::{MockTransport, RawTagEvent};
use rfid_reader::{logging, ChannelSink, ReaderConfig, RfidReader, SinkEvent, TagProtocol};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ReaderConfig::load().context("loading configuration")?;
    logging::init_from_config(&config)?;

    let mock = Arc::new(MockTransport::new().with_capacity(config.events.channel_capacity));
    let (sink, mut notifications) = ChannelSink::new();
    let reader = RfidReader::with_config(mock.clone(), Arc::new(sink), &config);

    let printer = tokio::spawn(async move {
        while let Some(event) = notifications.recv().await {
            match event {
                SinkEvent::Log(line) => println!("[log] {line}"),
                SinkEvent::ConnectionChanged(Some(s)) => {
                    println!("[status] {} {}", s.state.status_text(), s.endpoint())
                }
                SinkEvent::ConnectionChanged(None) => println!("[status] disconnected"),
                SinkEvent::TagObserved(result) => {
                    if let Some(tag) = result.record() {
                        println!(
                            "[tag] {:<8} {:<24} rssi={} ant={} count={} at {}",
                            tag.tag_type.display_name(),
                            tag.key.value(),
                            tag.rssi,
                            tag.antenna,
                            tag.read_count,
                            tag.read_time_display()
                        );
                    }
                }
                SinkEvent::ScanIdle => println!("[scan] idle"),
            }
        }
    });

    let info = reader.connect_configured().await?;
    info!(serial = ?info.identity.serial_number, "Reader ready");

    reader.start_default(TagProtocol::Epc6c).await?;
    for rssi in [-40, -42, -41] {
        let event = RawTagEvent::epc(TagProtocol::Epc6c, "3000E2801160600002", rssi, 1)
            .with_tid("E2801160");
        mock.emit_tag(event).await;
    }
    mock.emit_tag(RawTagEvent::epc(TagProtocol::Epc6c, "3000AABBCCDD", -55, 1))
        .await;
    mock.emit_read_over(TagProtocol::Epc6c).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    reader.stop().await;
    info!(
        unique = reader.unique_tags().await,
        reads = reader.total_reads().await,
        "Inventory summary"
    );

    reader.disconnect().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    printer.abort();
    Ok(())
}
