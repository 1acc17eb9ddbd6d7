//! In-memory reader for tests and demos.
//!
//! [`MockTransport`] answers requests from a [`MockDevice`] description and
//! lets the test push device events into the open link. Power and antenna
//! checks mirror what a real reader rejects, so error paths can be exercised
//! without hardware.
//!
//! # Example
//!
//! ```rust,ignore
//! let mock = Arc::new(MockTransport::new());
//! let reader = RfidReader::new(mock.clone(), Arc::new(TracingSink));
//! reader.connect("10.0.0.5", 8160, Duration::from_secs(3)).await?;
//! mock.emit_tag(RawTagEvent::epc(TagProtocol::Epc6c, "3000E2", -40, 1)).await;
//! ```

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use super::{Endpoint, EventStream, Request, Response, ResponsePayload, Transport, TransportEvent};
use crate::error::TransportError;
use crate::transport::RawTagEvent;
use crate::types::{AntennaMask, ReadMode, TagProtocol};

/// Device the mock pretends to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockDevice {
    /// Reported serial number
    pub serial_number: String,
    /// Reported application firmware version
    pub app_version: String,
    /// Reported baseband version
    pub base_version: String,
    /// Lowest accepted power (dBm)
    pub min_power: i32,
    /// Highest accepted power (dBm)
    pub max_power: i32,
    /// Number of antenna ports
    pub antenna_count: u8,
    /// Power per antenna (dBm)
    pub powers: BTreeMap<u8, i32>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self {
            serial_number: "MOCK-0001".to_string(),
            app_version: "1.0.0".to_string(),
            base_version: "0.2.3".to_string(),
            min_power: 10,
            max_power: 30,
            antenna_count: 4,
            powers: (1..=4).map(|a| (a, 30)).collect(),
        }
    }
}

#[derive(Debug, Clone)]
enum OpenBehavior {
    Accept,
    Refuse(String),
    Hang,
}

#[derive(Debug)]
struct Inner {
    device: MockDevice,
    open_behavior: OpenBehavior,
    failures: HashMap<&'static str, (i32, String)>,
    events: Option<mpsc::Sender<TransportEvent>>,
    requests: Vec<Request>,
    heartbeat: bool,
    /// Read-mode register, set while a scan runs
    scan_mode: Option<u8>,
    opened: Vec<Endpoint>,
}

/// Scriptable in-memory transport.
#[derive(Debug)]
pub struct MockTransport {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Mock of a default 4-antenna reader.
    pub fn new() -> Self {
        Self::with_device(MockDevice::default())
    }

    /// Mock of the given device.
    pub fn with_device(device: MockDevice) -> Self {
        Self {
            inner: Mutex::new(Inner {
                device,
                open_behavior: OpenBehavior::Accept,
                failures: HashMap::new(),
                events: None,
                requests: Vec::new(),
                heartbeat: false,
                scan_mode: None,
                opened: Vec::new(),
            }),
            capacity: 1024,
        }
    }

    /// Sets the capacity of each link's event channel.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Future opens fail with `Refused`.
    pub async fn refuse_connections(&self, reason: impl Into<String>) {
        self.inner.lock().await.open_behavior = OpenBehavior::Refuse(reason.into());
    }

    /// Future opens never complete.
    pub async fn hang_connections(&self) {
        self.inner.lock().await.open_behavior = OpenBehavior::Hang;
    }

    /// Future opens succeed.
    pub async fn accept_connections(&self) {
        self.inner.lock().await.open_behavior = OpenBehavior::Accept;
    }

    /// Makes every request named `request` (see [`Request::name`]) fail with `code`.
    pub async fn fail_request(&self, request: &'static str, code: i32, message: impl Into<String>) {
        self.inner
            .lock()
            .await
            .failures
            .insert(request, (code, message.into()));
    }

    /// Removes every scripted failure.
    pub async fn clear_failures(&self) {
        self.inner.lock().await.failures.clear();
    }

    /// Pushes an event into the open link. Returns false if no link is open.
    pub async fn emit(&self, event: TransportEvent) -> bool {
        let sender = self.inner.lock().await.events.clone();
        match sender {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Pushes a tag observation.
    pub async fn emit_tag(&self, event: RawTagEvent) -> bool {
        self.emit(TransportEvent::Tag(event)).await
    }

    /// Pushes a read-over notice for `protocol`.
    pub async fn emit_read_over(&self, protocol: TagProtocol) -> bool {
        self.emit(TransportEvent::ReadOver(protocol)).await
    }

    /// Simulates heartbeat loss: pushes a disconnect and closes the link.
    pub async fn drop_link(&self, reason: impl Into<String>) -> bool {
        let sender = self.inner.lock().await.events.take();
        match sender {
            Some(tx) => tx
                .send(TransportEvent::Disconnected {
                    reason: reason.into(),
                })
                .await
                .is_ok(),
            None => false,
        }
    }

    /// Every request sent so far.
    pub async fn requests(&self) -> Vec<Request> {
        self.inner.lock().await.requests.clone()
    }

    /// Names of every request sent so far.
    pub async fn request_names(&self) -> Vec<&'static str> {
        self.inner
            .lock()
            .await
            .requests
            .iter()
            .map(Request::name)
            .collect()
    }

    /// Whether the heartbeat was switched on for the open link.
    pub async fn heartbeat_enabled(&self) -> bool {
        self.inner.lock().await.heartbeat
    }

    /// Whether a link is open.
    pub async fn is_open(&self) -> bool {
        self.inner.lock().await.events.is_some()
    }

    /// Wire value of the running scan's read mode, `None` when idle.
    pub async fn scan_mode(&self) -> Option<u8> {
        self.inner.lock().await.scan_mode
    }

    /// Endpoints passed to successful opens.
    pub async fn opened(&self) -> Vec<Endpoint> {
        self.inner.lock().await.opened.clone()
    }

    /// The device's current power table.
    pub async fn device_powers(&self) -> BTreeMap<u8, i32> {
        self.inner.lock().await.device.powers.clone()
    }
}

fn start_scan(inner: &mut Inner, antennas: AntennaMask, mode: ReadMode) -> Response {
    let fits = antennas
        .highest()
        .is_some_and(|h| h <= inner.device.antenna_count);
    if !fits {
        return Response::error(1, "invalid antenna mask");
    }
    inner.scan_mode = Some(mode.wire_value());
    Response::ok(ResponsePayload::None)
}

fn answer(inner: &mut Inner, request: &Request) -> Response {
    match request {
        Request::ReaderInfo => Response::ok(ResponsePayload::ReaderInfo {
            serial_number: inner.device.serial_number.clone(),
            app_version: inner.device.app_version.clone(),
        }),
        Request::BasebandVersion => {
            Response::ok(ResponsePayload::BasebandVersion(inner.device.base_version.clone()))
        }
        Request::Capabilities => Response::ok(ResponsePayload::Capabilities {
            min_power: inner.device.min_power,
            max_power: inner.device.max_power,
            antenna_count: inner.device.antenna_count,
        }),
        Request::GetPower => Response::ok(ResponsePayload::Power(inner.device.powers.clone())),
        Request::SetPower { powers } => {
            let device = &mut inner.device;
            for (&antenna, &power) in powers {
                if antenna == 0 || antenna > device.antenna_count {
                    return Response::error(2, format!("invalid antenna {antenna}"));
                }
                if power < device.min_power || power > device.max_power {
                    return Response::error(3, format!("power {power} dBm out of range"));
                }
            }
            device.powers.extend(powers.iter().map(|(a, p)| (*a, *p)));
            Response::ok(ResponsePayload::None)
        }
        Request::InventoryEpc(req) => start_scan(inner, req.antennas, req.mode),
        Request::Inventory6b(req) => start_scan(inner, req.antennas, req.mode),
        Request::InventoryGb(req) => start_scan(inner, req.antennas, req.mode),
        Request::Stop => {
            inner.scan_mode = None;
            Response::ok(ResponsePayload::None)
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(
        &self,
        endpoint: &Endpoint,
        timeout: Duration,
    ) -> Result<EventStream, TransportError> {
        let behavior = self.inner.lock().await.open_behavior.clone();
        match behavior {
            OpenBehavior::Accept => {
                let (tx, rx) = mpsc::channel(self.capacity);
                let mut inner = self.inner.lock().await;
                inner.events = Some(tx);
                inner.opened.push(endpoint.clone());
                debug!(%endpoint, "Mock link opened");
                Ok(rx)
            }
            OpenBehavior::Refuse(reason) => Err(TransportError::Refused(reason)),
            OpenBehavior::Hang => {
                tokio::time::sleep(timeout).await;
                Err(TransportError::Timeout(timeout))
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().await;
        inner.events = None;
        inner.heartbeat = false;
        inner.scan_mode = None;
        Ok(())
    }

    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let mut inner = self.inner.lock().await;
        if inner.events.is_none() {
            return Err(TransportError::Closed);
        }
        inner.requests.push(request.clone());

        if let Some((code, message)) = inner.failures.get(request.name()) {
            return Ok(Response::error(*code, message.clone()));
        }
        Ok(answer(&mut inner, &request))
    }

    async fn set_heartbeat(&self, enabled: bool) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().await;
        if inner.events.is_none() {
            return Err(TransportError::Closed);
        }
        inner.heartbeat = enabled;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::request::StartRequest;

    #[tokio::test]
    async fn test_send_requires_open_link() {
        let mock = MockTransport::new();
        assert!(matches!(
            mock.send(Request::Stop).await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_power_range_enforced() {
        let mock = MockTransport::new();
        let _events = mock
            .open(&Endpoint::new("127.0.0.1", 8160), Duration::from_secs(1))
            .await
            .unwrap();

        let rejected = mock
            .send(Request::SetPower {
                powers: BTreeMap::from([(1, 99)]),
            })
            .await
            .unwrap();
        assert_eq!(rejected.code, 3);
        assert_eq!(mock.device_powers().await.get(&1), Some(&30));

        let accepted = mock
            .send(Request::SetPower {
                powers: BTreeMap::from([(2, 20)]),
            })
            .await
            .unwrap();
        assert!(accepted.is_ok());
        assert_eq!(mock.device_powers().await.get(&2), Some(&20));
    }

    #[tokio::test]
    async fn test_scripted_failure_and_mask_check() {
        let mock = MockTransport::new();
        let _events = mock
            .open(&Endpoint::new("127.0.0.1", 8160), Duration::from_secs(1))
            .await
            .unwrap();
        mock.fail_request("baseband-version", 5, "unsupported").await;

        let resp = mock.send(Request::BasebandVersion).await.unwrap();
        assert_eq!(resp.code, 5);
        assert_eq!(resp.message, "unsupported");

        let start = StartRequest::iso6b(AntennaMask::from_bits(0b1_0000), ReadMode::Single);
        let resp = mock.send(start.request).await.unwrap();
        assert_eq!(resp.code, 1);
        assert_eq!(mock.request_names().await, vec!["baseband-version", "inventory-6b"]);
    }

    #[tokio::test]
    async fn test_scan_mode_follows_start_and_stop() {
        let mock = MockTransport::new();
        let _events = mock
            .open(&Endpoint::new("127.0.0.1", 8160), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(mock.scan_mode().await, None);

        let start = StartRequest::iso6b(AntennaMask::from_bits(0b0001), ReadMode::Continuous);
        assert!(mock.send(start.request).await.unwrap().is_ok());
        assert_eq!(mock.scan_mode().await, Some(1));

        assert!(mock.send(Request::Stop).await.unwrap().is_ok());
        assert_eq!(mock.scan_mode().await, None);
    }

    #[tokio::test]
    async fn test_drop_link_delivers_disconnect_then_closes() {
        let mock = MockTransport::new();
        let mut events = mock
            .open(&Endpoint::new("127.0.0.1", 8160), Duration::from_secs(1))
            .await
            .unwrap();

        assert!(mock.drop_link("heartbeat timeout").await);
        assert_eq!(
            events.recv().await,
            Some(TransportEvent::Disconnected {
                reason: "heartbeat timeout".into()
            })
        );
        assert_eq!(events.recv().await, None);
        assert!(!mock.is_open().await);
    }
}
