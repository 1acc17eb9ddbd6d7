//! Device event handling
//!
//! Every open link gets one pump task that drains the link's
//! [`EventStream`] in delivery order:
//!
//! - `Tag` events are validated and normalised through a per-protocol
//!   dispatch table, then merged into the tag table. Events with a non-zero
//!   result code are logged and dropped.
//! - `ReadOver` events tell the display sink the scan went idle. They do not
//!   change the inventory state.
//! - The first `Disconnected` event tears the session down and ends the pump.
//!
//! Events are only applied while their link is the session's current link;
//! anything still in flight after a teardown is discarded.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::aggregator::RawObservation;
use crate::error::MalformedEvent;
use crate::session;
use crate::shared::Shared;
use crate::transport::{EventStream, RawTagEvent, TransportEvent};
use crate::types::TagProtocol;

/// How a protocol's tag events map onto observations.
#[derive(Debug, Clone, Copy)]
struct ProtocolHandler {
    protocol: TagProtocol,
    /// 6B tags have no EPC bank; anything in that field is ignored
    carries_epc: bool,
}

const HANDLERS: [ProtocolHandler; 4] = [
    ProtocolHandler {
        protocol: TagProtocol::Epc6c,
        carries_epc: true,
    },
    ProtocolHandler {
        protocol: TagProtocol::Iso6b,
        carries_epc: false,
    },
    ProtocolHandler {
        protocol: TagProtocol::Gb,
        carries_epc: true,
    },
    ProtocolHandler {
        protocol: TagProtocol::Gjb,
        carries_epc: true,
    },
];

fn handler(protocol: TagProtocol) -> ProtocolHandler {
    HANDLERS
        .iter()
        .copied()
        .find(|h| h.protocol == protocol)
        .unwrap_or(ProtocolHandler {
            protocol,
            carries_epc: true,
        })
}

/// Validates a raw tag event and turns it into an observation stamped `at`.
pub fn normalize(
    event: RawTagEvent,
    at: DateTime<Utc>,
) -> Result<RawObservation, MalformedEvent> {
    if event.result != 0 {
        return Err(MalformedEvent {
            protocol: event.protocol,
            code: event.result,
        });
    }

    let handler = handler(event.protocol);
    Ok(RawObservation {
        protocol: handler.protocol,
        epc: if handler.carries_epc { event.epc } else { None },
        tid: event.tid,
        user_data: event.user_data,
        rssi: event.rssi,
        antenna: event.antenna,
        observed_at: at,
    })
}

/// Spawns the pump for `link`.
pub(crate) fn spawn_pump(
    shared: Arc<Shared>,
    link: Uuid,
    mut events: EventStream,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(%link, "Event pump started");
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Tag(raw) => on_tag(&shared, link, raw).await,
                TransportEvent::ReadOver(protocol) => on_read_over(&shared, link, protocol).await,
                TransportEvent::Disconnected { reason } => {
                    session::handle_link_lost(&shared, link, &reason).await;
                    break;
                }
            }
        }
        debug!(%link, "Event pump finished");
    })
}

async fn on_tag(shared: &Shared, link: Uuid, raw: RawTagEvent) {
    let result = {
        let mut state = shared.state.lock().await;
        if !state.session.is_current(link) {
            trace!(%link, "Discarding tag event from a closed link");
            return;
        }
        match normalize(raw, Utc::now()) {
            Ok(observation) => state.tags.observe(observation),
            Err(malformed) => {
                debug!(code = malformed.code, protocol = %malformed.protocol, "{}", malformed);
                return;
            }
        }
    };

    if let Some(record) = result.record() {
        trace!(key = %record.key, count = record.read_count, "Tag observed");
    }
    shared.sink.on_tag_observed(&result);
}

async fn on_read_over(shared: &Shared, link: Uuid, protocol: TagProtocol) {
    if !shared.state.lock().await.session.is_current(link) {
        return;
    }
    shared.log(format!("{} read over", protocol.display_name()));
    shared.sink.on_scan_idle();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::TagKey;

    #[test]
    fn test_nonzero_result_is_malformed() {
        let event = RawTagEvent::epc(TagProtocol::Epc6c, "E200", -50, 1).with_result(4);
        let err = normalize(event, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            MalformedEvent {
                protocol: TagProtocol::Epc6c,
                code: 4
            }
        );
    }

    #[test]
    fn test_iso6b_keys_on_tid() {
        let mut event = RawTagEvent::tid(TagProtocol::Iso6b, "E004015", -55, 2);
        event.epc = Some("garbage".into());
        let obs = normalize(event, Utc::now()).unwrap();
        assert_eq!(obs.epc, None);
        assert_eq!(obs.identity(), Some(TagKey::Tid("E004015".into())));
    }

    #[test]
    fn test_every_protocol_normalises() {
        for protocol in TagProtocol::ALL {
            let event = RawTagEvent::epc(protocol, "E1", -40, 1).with_tid("T1");
            let obs = normalize(event, Utc::now()).unwrap();
            assert_eq!(obs.protocol, protocol);
            assert!(obs.identity().is_some());
        }
    }

    #[test]
    fn test_gjb_carries_user_data() {
        let event = RawTagEvent::epc(TagProtocol::Gjb, "E9", -61, 3).with_user_data("00FF");
        let at = Utc::now();
        let obs = normalize(event, at).unwrap();
        assert_eq!(obs.user_data.as_deref(), Some("00FF"));
        assert_eq!(obs.antenna, 3);
        assert_eq!(obs.observed_at, at);
    }
}
