use crate::model::{DataEntry, DeviceMap, DeviceStatus};
use crate::normalize;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Default number of entries kept in the log.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Store shared between the HTTP handlers and the reporter.
///
/// Mutations hold the write lock for the whole operation, so an ingestion's
/// append, eviction and status update are never observed half-applied.
pub type SharedStore = Arc<RwLock<Store>>;

/// Result of a single ingestion
#[derive(Debug, Clone)]
pub struct Ingested {
    pub entry: DataEntry,
    /// Oldest entries dropped to stay within capacity
    pub evicted: usize,
}

/// Which devices a query or clear applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceFilter {
    All,
    Device(String),
    /// Matches no device, e.g. an ambiguous filter
    Nothing,
}

impl DeviceFilter {
    pub fn device(id: impl Into<String>) -> Self {
        DeviceFilter::Device(id.into())
    }

    pub fn matches(&self, device_id: &str) -> bool {
        match self {
            DeviceFilter::All => true,
            DeviceFilter::Device(id) => id == device_id,
            DeviceFilter::Nothing => false,
        }
    }
}

/// How much of a filtered result a query returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// The newest `n` entries
    Tail(usize),
    /// Everything except the oldest `n` entries
    SkipHead(usize),
}

/// Result of a query against the log
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub data: Vec<DataEntry>,
    pub total: usize,
    pub devices: DeviceMap,
}

/// Bounded in-memory log of telemetry entries plus per-device status.
///
/// Eviction is global FIFO: once the log is over capacity the oldest entries
/// go first, whichever device sent them. Device status is never evicted.
#[derive(Debug)]
pub struct Store {
    entries: VecDeque<DataEntry>,
    devices: DeviceMap,
    capacity: usize,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Store {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            devices: DeviceMap::new(),
            capacity,
        }
    }

    pub fn shared(capacity: usize) -> SharedStore {
        Arc::new(RwLock::new(Self::new(capacity)))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries currently in the log
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn device_ids(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    pub fn devices(&self) -> &DeviceMap {
        &self.devices
    }

    pub fn status(&self, device_id: &str) -> Option<&DeviceStatus> {
        self.devices.get(device_id)
    }

    /// Entries oldest first
    pub fn entries(&self) -> impl Iterator<Item = &DataEntry> {
        self.entries.iter()
    }

    /// Records a submission stamped with the current time.
    pub fn ingest(&mut self, device_id: Option<&str>, payload: Value) -> Ingested {
        self.ingest_at(device_id, payload, Utc::now())
    }

    /// Records a submission received at `received_at`.
    pub fn ingest_at(
        &mut self,
        device_id: Option<&str>,
        payload: Value,
        received_at: DateTime<Utc>,
    ) -> Ingested {
        let device_id = normalize::device_id(device_id);
        let connection_type = normalize::connection_type(&payload);

        let entry = DataEntry {
            device_id: device_id.clone(),
            timestamp: received_at,
            payload,
        };
        self.entries.push_back(entry.clone());

        let mut evicted = 0;
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
            evicted += 1;
        }

        let message_count = self
            .devices
            .get(&device_id)
            .map_or(0, |status| status.message_count)
            + 1;
        self.devices.insert(
            device_id,
            DeviceStatus {
                last_seen: received_at,
                message_count,
                connection_type,
            },
        );

        Ingested { entry, evicted }
    }

    /// Returns the entries matching `filter`, in log order and cut down by
    /// `limit`, together with the number of matches before truncation and
    /// the full device map.
    pub fn query(&self, filter: &DeviceFilter, limit: Limit) -> QueryResult {
        let matching: Vec<&DataEntry> = self
            .entries
            .iter()
            .filter(|entry| filter.matches(&entry.device_id))
            .collect();

        let total = matching.len();
        let skip = match limit {
            Limit::Tail(n) => total.saturating_sub(n),
            Limit::SkipHead(n) => n.min(total),
        };
        let data = matching.into_iter().skip(skip).cloned().collect();

        QueryResult {
            data,
            total,
            devices: self.devices.clone(),
        }
    }

    /// Removes the entries and status of the devices `filter` selects;
    /// [`DeviceFilter::All`] is a full reset. Returns how many log entries
    /// were removed.
    pub fn clear(&mut self, filter: &DeviceFilter) -> usize {
        match filter {
            DeviceFilter::All => {
                let removed = self.entries.len();
                self.entries.clear();
                self.devices.clear();
                removed
            }
            DeviceFilter::Device(id) => {
                let before = self.entries.len();
                self.entries.retain(|entry| entry.device_id != *id);
                self.devices.remove(id);
                before - self.entries.len()
            }
            DeviceFilter::Nothing => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConnectionType;
    use chrono::{Duration, TimeZone};
    use rand::Rng;
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn test_ingest_creates_entry_and_status() {
        let mut store = Store::default();
        let ingested = store.ingest_at(Some("w1"), json!({"type": 0}), at(0));

        assert_eq!(ingested.evicted, 0);
        assert_eq!(ingested.entry.device_id, "w1");
        assert_eq!(ingested.entry.timestamp, at(0));
        assert_eq!(store.len(), 1);

        let status = store.status("w1").unwrap();
        assert_eq!(status.message_count, 1);
        assert_eq!(status.last_seen, at(0));
        assert_eq!(status.connection_type, ConnectionType::WiFi);
    }

    #[test]
    fn test_connection_type_follows_latest_payload() {
        let mut store = Store::default();
        store.ingest_at(Some("w1"), json!({"type": 0}), at(0));
        assert_eq!(store.status("w1").unwrap().connection_type, ConnectionType::WiFi);

        store.ingest_at(Some("w1"), json!({"type": 1}), at(5));
        let status = store.status("w1").unwrap();
        assert_eq!(status.connection_type, ConnectionType::Bluetooth);
        assert_eq!(status.message_count, 2);
        assert_eq!(status.last_seen, at(5));
    }

    #[test]
    fn test_missing_device_id_is_unknown() {
        let mut store = Store::default();
        let ingested = store.ingest(None, json!({}));
        assert_eq!(ingested.entry.device_id, "unknown");
        assert!(store.status("unknown").is_some());

        store.ingest(Some(""), json!({}));
        assert_eq!(store.status("unknown").unwrap().message_count, 2);
    }

    #[test]
    fn test_eviction_keeps_most_recent_thousand() {
        let mut store = Store::default();
        let mut evicted = 0;
        for n in 0..1005 {
            evicted += store.ingest_at(Some("w2"), json!({ "n": n }), at(n)).evicted;
        }

        assert_eq!(evicted, 5);
        assert_eq!(store.len(), 1000);
        let numbers: Vec<i64> = store
            .entries()
            .map(|entry| entry.payload["n"].as_i64().unwrap())
            .collect();
        assert_eq!(numbers, (5..1005).collect::<Vec<_>>());
        assert_eq!(store.status("w2").unwrap().message_count, 1005);
    }

    #[test]
    fn test_eviction_is_global_not_per_device() {
        let mut store = Store::new(3);
        store.ingest_at(Some("quiet"), json!({}), at(0));
        for n in 1..=3 {
            store.ingest_at(Some("noisy"), json!({ "n": n }), at(n));
        }

        assert_eq!(store.query(&DeviceFilter::device("quiet"), Limit::Tail(50)).total, 0);
        assert_eq!(store.query(&DeviceFilter::device("noisy"), Limit::Tail(50)).total, 3);
        // Status survives eviction of the device's last entry.
        assert_eq!(store.status("quiet").unwrap().message_count, 1);
    }

    #[test]
    fn test_random_sequences_respect_capacity_and_counts() {
        let mut rng = rand::thread_rng();
        let capacity = 64;
        let mut store = Store::new(capacity);
        let mut sent: Vec<(String, u64)> = Vec::new();
        let mut counts = std::collections::HashMap::<String, u64>::new();

        for seq in 0..500u64 {
            let device = format!("dev-{}", rng.gen_range(0..5));
            store.ingest_at(Some(&device), json!({ "seq": seq }), at(seq as i64));
            *counts.entry(device.clone()).or_default() += 1;
            sent.push((device, seq));
            assert!(store.len() <= capacity);
        }

        let expected: Vec<u64> = sent[sent.len() - capacity..].iter().map(|(_, seq)| *seq).collect();
        let kept: Vec<u64> = store
            .entries()
            .map(|entry| entry.payload["seq"].as_u64().unwrap())
            .collect();
        assert_eq!(kept, expected);

        for (device, count) in counts {
            assert_eq!(store.status(&device).unwrap().message_count, count);
        }
    }

    #[test]
    fn test_query_filters_and_takes_tail() {
        let mut store = Store::default();
        for n in 0..10 {
            let device = if n % 2 == 0 { "even" } else { "odd" };
            store.ingest_at(Some(device), json!({ "n": n }), at(n));
        }

        let result = store.query(&DeviceFilter::device("even"), Limit::Tail(3));
        assert_eq!(result.total, 5);
        let numbers: Vec<i64> = result
            .data
            .iter()
            .map(|entry| entry.payload["n"].as_i64().unwrap())
            .collect();
        assert_eq!(numbers, vec![4, 6, 8]);
        assert!(result.data.iter().all(|entry| entry.device_id == "even"));
        assert_eq!(result.devices.len(), 2);
    }

    #[test]
    fn test_query_without_filter_and_large_limit() {
        let mut store = Store::default();
        for n in 0..4 {
            store.ingest_at(Some("w1"), json!({ "n": n }), at(n));
        }

        let result = store.query(&DeviceFilter::All, Limit::Tail(usize::MAX));
        assert_eq!(result.total, 4);
        assert_eq!(result.data.len(), 4);
        assert_eq!(result.data[0].payload["n"], 0);
    }

    #[test]
    fn test_query_unknown_device_is_empty() {
        let mut store = Store::default();
        store.ingest_at(Some("w1"), json!({}), at(0));

        let result = store.query(&DeviceFilter::device("ghost"), Limit::Tail(50));
        assert!(result.data.is_empty());
        assert_eq!(result.total, 0);
        assert!(result.devices.contains_key("w1"));
    }

    #[test]
    fn test_clear_single_device() {
        let mut store = Store::default();
        store.ingest_at(Some("a"), json!({}), at(0));
        store.ingest_at(Some("b"), json!({}), at(1));
        store.ingest_at(Some("a"), json!({}), at(2));

        assert_eq!(store.clear(&DeviceFilter::device("a")), 2);
        assert_eq!(store.len(), 1);
        assert!(store.status("a").is_none());
        assert_eq!(store.status("b").unwrap().message_count, 1);

        // Idempotent
        assert_eq!(store.clear(&DeviceFilter::device("a")), 0);
        assert_eq!(store.clear(&DeviceFilter::device("never-seen")), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_clear_all_then_counts_restart() {
        let mut store = Store::default();
        store.ingest_at(Some("a"), json!({}), at(0));
        store.ingest_at(Some("b"), json!({}), at(1));

        assert_eq!(store.clear(&DeviceFilter::All), 2);
        assert!(store.is_empty());
        assert_eq!(store.device_count(), 0);

        store.ingest_at(Some("a"), json!({}), at(2));
        assert_eq!(store.status("a").unwrap().message_count, 1);
    }

    #[test]
    fn test_skip_head_drops_oldest_matches() {
        let mut store = Store::default();
        for n in 0..6 {
            store.ingest_at(Some("w1"), json!({ "n": n }), at(n));
        }

        let result = store.query(&DeviceFilter::All, Limit::SkipHead(4));
        assert_eq!(result.total, 6);
        let numbers: Vec<i64> = result
            .data
            .iter()
            .map(|entry| entry.payload["n"].as_i64().unwrap())
            .collect();
        assert_eq!(numbers, vec![4, 5]);

        let result = store.query(&DeviceFilter::All, Limit::SkipHead(10));
        assert!(result.data.is_empty());
        assert_eq!(result.total, 6);
    }

    #[test]
    fn test_nothing_filter_matches_and_clears_nothing() {
        let mut store = Store::default();
        store.ingest_at(Some("a"), json!({}), at(0));
        store.ingest_at(Some("b"), json!({}), at(1));

        let result = store.query(&DeviceFilter::Nothing, Limit::Tail(50));
        assert!(result.data.is_empty());
        assert_eq!(result.total, 0);

        assert_eq!(store.clear(&DeviceFilter::Nothing), 0);
        assert_eq!(store.len(), 2);
        assert_eq!(store.device_count(), 2);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let mut store = Store::new(0);
        assert_eq!(store.capacity(), 1);
        store.ingest(Some("a"), json!({}));
        store.ingest(Some("a"), json!({}));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_shared_store_serializes_concurrent_ingestion() {
        tokio_test::block_on(async {
            let store = Store::shared(100);
            let mut handles = Vec::new();
            for task in 0..4 {
                let store = store.clone();
                handles.push(tokio::spawn(async move {
                    for n in 0..50 {
                        store
                            .write()
                            .await
                            .ingest(Some("shared"), json!({ "task": task, "n": n }));
                    }
                }));
            }
            for handle in handles {
                handle.await.unwrap();
            }

            let store = store.read().await;
            assert_eq!(store.len(), 100);
            assert_eq!(store.status("shared").unwrap().message_count, 200);
        });
    }
}
