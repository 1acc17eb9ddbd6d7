//! Tag aggregation
//!
//! Turns the stream of validated tag observations into a deduplicated table
//! holding at most one [`TagRecord`] per identity. The first observation of an
//! identity inserts a record with a read count of 1; later ones update signal
//! strength and last-read time in place and bump the count.
//!
//! The identity of an observation is its EPC when present, otherwise its TID.
//! Observations with neither cannot be aggregated and are handed back as
//! [`AggregationResult::Transient`].
//!
//! [`TagAggregator::observe`] is the only way records are written. The
//! aggregator itself is not synchronised; the reader keeps it behind the same
//! lock as the rest of the session state, so an observation is never
//! half-applied relative to `clear` or `snapshot`.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::types::TagProtocol;

/// Identity under which observations are merged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagKey {
    /// Keyed by EPC
    Epc(String),
    /// Keyed by TID, for tags without an EPC
    Tid(String),
}

impl TagKey {
    /// The identity payload (hex string).
    pub fn value(&self) -> &str {
        match self {
            TagKey::Epc(v) | TagKey::Tid(v) => v,
        }
    }
}

impl fmt::Display for TagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}

/// A validated, protocol-tagged tag read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawObservation {
    /// Protocol of the scan that produced the read
    pub protocol: TagProtocol,
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
    /// Receive time
    pub observed_at: DateTime<Utc>,
}

impl RawObservation {
    /// EPC if present and non-empty, else TID, else nothing.
    pub fn identity(&self) -> Option<TagKey> {
        fn usable(field: &Option<String>) -> Option<String> {
            field
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        }

        usable(&self.epc)
            .map(TagKey::Epc)
            .or_else(|| usable(&self.tid).map(TagKey::Tid))
    }
}

/// One row of the tag table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    /// Merge identity
    pub key: TagKey,
    /// Latest EPC
    pub epc: Option<String>,
    /// Latest TID
    pub tid: Option<String>,
    /// Latest user data
    pub user_data: Option<String>,
    /// RSSI of the latest read
    pub rssi: i32,
    /// Antenna of the latest read
    pub antenna: u8,
    /// Time of the latest read
    pub last_read: DateTime<Utc>,
    /// Protocol of the latest read
    pub tag_type: TagProtocol,
    /// Reads merged into this row
    pub read_count: u32,
}

impl TagRecord {
    fn first(key: TagKey, obs: RawObservation) -> Self {
        Self {
            key,
            epc: obs.epc,
            tid: obs.tid,
            user_data: obs.user_data,
            rssi: obs.rssi,
            antenna: obs.antenna,
            last_read: obs.observed_at,
            tag_type: obs.protocol,
            read_count: 1,
        }
    }

    fn seen_again(&mut self, obs: &RawObservation) {
        self.rssi = obs.rssi;
        self.last_read = obs.observed_at;
        self.read_count = self.read_count.saturating_add(1);
    }

    /// Last-read time as `YYYY-MM-DD HH:MM:SS` in the host's local time zone.
    /// `last_read` itself stays in UTC.
    pub fn read_time_display(&self) -> String {
        self.last_read
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }
}

/// Outcome of one [`TagAggregator::observe`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregationResult {
    /// First sighting; carries the new record
    Inserted(TagRecord),
    /// Repeat sighting; carries the record after the update
    Updated(TagRecord),
    /// No usable identity; reported once and not stored
    Transient(RawObservation),
}

impl AggregationResult {
    /// The stored record, if the observation was aggregated.
    pub fn record(&self) -> Option<&TagRecord> {
        match self {
            AggregationResult::Inserted(r) | AggregationResult::Updated(r) => Some(r),
            AggregationResult::Transient(_) => None,
        }
    }

    /// True if the observation created a new row.
    pub fn is_inserted(&self) -> bool {
        matches!(self, AggregationResult::Inserted(_))
    }
}

/// Insertion-ordered tag table with O(1) lookup by identity.
#[derive(Debug, Default)]
pub struct TagAggregator {
    records: Vec<TagRecord>,
    index: HashMap<TagKey, usize>,
    total_reads: u64,
}

impl TagAggregator {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges one observation into the table.
    pub fn observe(&mut self, obs: RawObservation) -> AggregationResult {
        let Some(key) = obs.identity() else {
            return AggregationResult::Transient(obs);
        };

        self.total_reads += 1;

        if let Some(&row) = self.index.get(&key) {
            let record = &mut self.records[row];
            record.seen_again(&obs);
            return AggregationResult::Updated(record.clone());
        }

        let record = TagRecord::first(key.clone(), obs);
        self.index.insert(key, self.records.len());
        self.records.push(record.clone());
        AggregationResult::Inserted(record)
    }

    /// Empties the table and resets the running totals.
    pub fn clear(&mut self) {
        self.records.clear();
        self.index.clear();
        self.total_reads = 0;
    }

    /// Copy of all records in insertion order.
    pub fn snapshot(&self) -> Vec<TagRecord> {
        self.records.clone()
    }

    /// Record for `key`, if seen.
    pub fn get(&self, key: &TagKey) -> Option<&TagRecord> {
        self.index.get(key).map(|&row| &self.records[row])
    }

    /// Number of distinct identities seen since the last clear.
    pub fn unique_tags(&self) -> usize {
        self.records.len()
    }

    /// Number of aggregated observations since the last clear.
    pub fn total_reads(&self) -> u64 {
        self.total_reads
    }

    /// True before the first identified observation.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn obs(epc: Option<&str>, tid: Option<&str>, rssi: i32, at: DateTime<Utc>) -> RawObservation {
        RawObservation {
            protocol: TagProtocol::Epc6c,
            epc: epc.map(String::from),
            tid: tid.map(String::from),
            user_data: None,
            rssi,
            antenna: 1,
            observed_at: at,
        }
    }

    #[test]
    fn test_repeat_observations_merge() {
        let mut agg = TagAggregator::new();
        let t0 = Utc::now();
        let epc = Some("3000E2801160600002");

        assert!(agg.observe(obs(epc, None, -40, t0)).is_inserted());
        agg.observe(obs(epc, None, -42, t0 + Duration::seconds(1)));
        let last = agg.observe(obs(epc, None, -41, t0 + Duration::seconds(2)));

        let record = last.record().unwrap();
        assert_eq!(record.read_count, 3);
        assert_eq!(record.rssi, -41);
        assert_eq!(record.last_read, t0 + Duration::seconds(2));
        assert_eq!(agg.unique_tags(), 1);
        assert_eq!(agg.total_reads(), 3);
    }

    #[test]
    fn test_distinct_epcs_make_distinct_records() {
        let mut agg = TagAggregator::new();
        let now = Utc::now();
        agg.observe(obs(Some("E20001"), None, -50, now));
        agg.observe(obs(Some("E20002"), None, -50, now));

        let rows = agg.snapshot();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, TagKey::Epc("E20001".into()));
        assert_eq!(rows[1].key, TagKey::Epc("E20002".into()));
    }

    #[test]
    fn test_tid_fallback_and_transient() {
        let mut agg = TagAggregator::new();
        let now = Utc::now();

        let with_tid = agg.observe(obs(Some(""), Some("E2003412"), -60, now));
        assert_eq!(
            with_tid.record().unwrap().key,
            TagKey::Tid("E2003412".into())
        );

        let anonymous = agg.observe(obs(None, Some("  "), -60, now));
        assert!(matches!(anonymous, AggregationResult::Transient(_)));
        assert_eq!(agg.unique_tags(), 1);
        assert_eq!(agg.total_reads(), 1);
    }

    #[test]
    fn test_epc_and_tid_keys_do_not_collide() {
        let mut agg = TagAggregator::new();
        let now = Utc::now();
        agg.observe(obs(Some("ABCD"), None, -50, now));
        agg.observe(obs(None, Some("ABCD"), -50, now));
        assert_eq!(agg.unique_tags(), 2);
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut agg = TagAggregator::new();
        let now = Utc::now();
        agg.observe(obs(Some("E20001"), None, -50, now));
        agg.observe(obs(Some("E20001"), None, -50, now));
        agg.clear();

        assert!(agg.snapshot().is_empty());
        assert_eq!(agg.total_reads(), 0);

        let again = agg.observe(obs(Some("E20001"), None, -50, now));
        assert!(again.is_inserted());
        assert_eq!(again.record().unwrap().read_count, 1);
    }

    #[test]
    fn test_update_keeps_first_payload_fields() {
        let mut agg = TagAggregator::new();
        let now = Utc::now();
        let mut first = obs(Some("E20001"), Some("TID1"), -50, now);
        first.user_data = Some("DEADBEEF".into());
        agg.observe(first);

        let mut second = obs(Some("E20001"), None, -45, now);
        second.antenna = 2;
        let updated = agg.observe(second);

        let record = updated.record().unwrap();
        assert_eq!(record.tid.as_deref(), Some("TID1"));
        assert_eq!(record.user_data.as_deref(), Some("DEADBEEF"));
        assert_eq!(record.antenna, 1);
        assert_eq!(record.rssi, -45);
    }

    #[test]
    fn test_read_time_display_format() {
        let at = DateTime::parse_from_rfc3339("2024-03-05T07:08:09Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut agg = TagAggregator::new();
        let result = agg.observe(obs(Some("E1"), None, -50, at));
        let local = at.with_timezone(&Local).naive_local();
        let shown = result.record().unwrap().read_time_display();
        assert_eq!(shown, local.format("%Y-%m-%d %H:%M:%S").to_string());
        assert_eq!(shown.len(), "2024-03-05 07:08:09".len());
        assert!(shown.ends_with(":09"));
    }
}
