//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rfid_reader::transport::MockTransport;
use rfid_reader::{ChannelSink, RfidReader, SinkEvent};
use tokio::sync::mpsc::UnboundedReceiver;

pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(3000);

pub struct Harness {
    pub mock: Arc<MockTransport>,
    pub reader: RfidReader,
    pub events: UnboundedReceiver<SinkEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_mock(MockTransport::new())
    }

    pub fn with_mock(mock: MockTransport) -> Self {
        let mock = Arc::new(mock);
        let (sink, events) = ChannelSink::new();
        let reader = RfidReader::new(mock.clone(), Arc::new(sink));
        Self {
            mock,
            reader,
            events,
        }
    }

    /// Connects to 10.0.0.5:8160 and discards the notifications it produced.
    pub async fn connected() -> Self {
        let mut harness = Self::new();
        harness
            .reader
            .connect("10.0.0.5", 8160, CONNECT_TIMEOUT)
            .await
            .expect("connect against mock");
        harness.drain();
        harness
    }

    /// Drops every notification received so far.
    pub fn drain(&mut self) -> Vec<SinkEvent> {
        let mut seen = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            seen.push(event);
        }
        seen
    }

    /// Waits for the next notification matching `pred`, skipping others.
    pub async fn wait_for<F>(&mut self, mut pred: F) -> SinkEvent
    where
        F: FnMut(&SinkEvent) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match self.events.recv().await {
                    Some(event) if pred(&event) => return event,
                    Some(_) => continue,
                    None => panic!("sink channel closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for sink notification")
    }

    /// Waits for `n` tag notifications.
    pub async fn wait_for_tags(&mut self, n: usize) {
        for _ in 0..n {
            self.wait_for(|e| matches!(e, SinkEvent::TagObserved(_)))
                .await;
        }
    }

    /// Gives the event pump a moment to run.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
