use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Device id recorded when a submission carries none.
pub const UNKNOWN_DEVICE: &str = "unknown";

/// Device id → latest status. Ordered so responses are stable.
pub type DeviceMap = BTreeMap<String, DeviceStatus>;

/// One telemetry submission as received from a watch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataEntry {
    pub device_id: String,
    #[serde(with = "iso8601")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "data")]
    pub payload: Value,
}

/// Latest known state of a single device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    #[serde(with = "iso8601")]
    pub last_seen: DateTime<Utc>,
    pub message_count: u64,
    pub connection_type: ConnectionType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionType {
    WiFi,
    Bluetooth,
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionType::WiFi => f.write_str("WiFi"),
            ConnectionType::Bluetooth => f.write_str("Bluetooth"),
        }
    }
}

/// GET / response
#[derive(Debug, Serialize)]
pub struct ServerStatusResponse {
    pub message: &'static str,
    pub status: &'static str,
    pub received_messages: usize,
    pub devices: Vec<String>,
}

/// POST /api/data response
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub device_id: String,
    #[serde(with = "iso8601")]
    pub timestamp: DateTime<Utc>,
}

/// GET /api/data response
#[derive(Debug, Serialize)]
pub struct DataResponse {
    pub data: Vec<DataEntry>,
    pub total: usize,
    pub devices: DeviceMap,
}

/// GET /api/devices response
#[derive(Debug, Serialize)]
pub struct DevicesResponse {
    pub devices: DeviceMap,
    pub total_devices: usize,
}

/// POST /api/command response. Fields absent from the request are omitted.
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub status: &'static str,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<Value>,
}

/// DELETE /api/data response
#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub status: &'static str,
    pub message: &'static str,
}

/// Query string shared by GET and DELETE on /api/data.
///
/// Built from the raw key/value pairs so that a repeated or malformed key
/// never causes the other keys to be dropped. Values stay as text for the
/// handlers to coerce.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DataQuery {
    /// Every `limit` value, joined with `,` when repeated
    pub limit: Option<String>,
    /// Every `device_id` value, in order of appearance
    pub device_ids: Vec<String>,
}

impl DataQuery {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut limits = Vec::new();
        let mut device_ids = Vec::new();
        for (key, value) in pairs {
            match key.as_str() {
                "limit" => limits.push(value),
                "device_id" => device_ids.push(value),
                _ => {}
            }
        }

        Self {
            limit: (!limits.is_empty()).then(|| limits.join(",")),
            device_ids,
        }
    }
}

/// ISO-8601 UTC timestamps with millisecond precision, e.g. `2024-05-01T12:00:00.123Z`
pub mod iso8601 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_entry_serializes_payload_as_data() {
        let entry = DataEntry {
            device_id: "w1".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            payload: json!({"type": 0, "steps": 42}),
        };

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            value,
            json!({
                "device_id": "w1",
                "timestamp": "2024-05-01T12:00:00.000Z",
                "data": {"type": 0, "steps": 42}
            })
        );
    }

    #[test]
    fn test_status_connection_type_names() {
        let status = DeviceStatus {
            last_seen: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            message_count: 3,
            connection_type: ConnectionType::WiFi,
        };

        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["connection_type"], "WiFi");
        assert_eq!(value["message_count"], 3);
        assert_eq!(ConnectionType::Bluetooth.to_string(), "Bluetooth");
    }

    #[test]
    fn test_command_response_omits_missing_fields() {
        let response = CommandResponse {
            status: "success",
            message: "Command sent successfully",
            command: Some(json!("vibrate")),
            device_id: None,
        };

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["command"], "vibrate");
        assert!(value.get("device_id").is_none());
    }

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_data_query_collects_repeated_keys() {
        let query = DataQuery::from_pairs(pairs(&[
            ("device_id", "a"),
            ("limit", "1"),
            ("other", "x"),
            ("limit", "2"),
            ("device_id", "b"),
        ]));
        assert_eq!(query.limit.as_deref(), Some("1,2"));
        assert_eq!(query.device_ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_data_query_empty() {
        assert_eq!(DataQuery::from_pairs(Vec::new()), DataQuery::default());
    }

    #[test]
    fn test_iso8601_parses_what_it_formats() {
        let ts = Utc.timestamp_millis_opt(1_714_564_800_123).unwrap();
        let text = iso8601::format(&ts);
        assert_eq!(text, "2024-05-01T12:00:00.123Z");

        let mut de = serde_json::Deserializer::from_str("\"2024-05-01T12:00:00.123Z\"");
        assert_eq!(iso8601::deserialize(&mut de).unwrap(), ts);
    }
}
