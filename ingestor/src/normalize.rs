//! Input coercion. Nothing here rejects a request: irregular input is
//! mapped onto a default instead.

use crate::model::{ConnectionType, UNKNOWN_DEVICE};
use crate::store::{DeviceFilter, Limit};
use serde_json::Value;

/// Payload field that tells how the watch is connected.
pub const DISCRIMINATOR_FIELD: &str = "type";

/// Missing or empty ids are recorded as [`UNKNOWN_DEVICE`].
pub fn device_id(raw: Option<&str>) -> String {
    match raw {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => UNKNOWN_DEVICE.to_string(),
    }
}

/// Every `device_id` value given in a query string. None or a single empty
/// value means "no filter"; a repeated key is ambiguous and matches nothing.
pub fn device_filter(values: &[String]) -> DeviceFilter {
    match values {
        [] => DeviceFilter::All,
        [id] if id.is_empty() => DeviceFilter::All,
        [id] => DeviceFilter::device(id.as_str()),
        _ => DeviceFilter::Nothing,
    }
}

/// `type == 0` means WiFi; anything else, including a missing field, is Bluetooth.
pub fn connection_type(payload: &Value) -> ConnectionType {
    match payload.get(DISCRIMINATOR_FIELD).and_then(Value::as_f64) {
        Some(kind) if kind == 0.0 => ConnectionType::WiFi,
        _ => ConnectionType::Bluetooth,
    }
}

/// Parses the leading integer of `raw` (surrounding whitespace and a sign
/// allowed, trailing garbage ignored). A positive `n` keeps the newest `n`
/// entries, a negative one drops the oldest `n`. Absent, non-numeric and zero
/// values fall back to the newest `default`.
pub fn limit(raw: Option<&str>, default: usize) -> Limit {
    let fallback = Limit::Tail(default);
    let Some(raw) = raw else {
        return fallback;
    };

    let text = raw.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return fallback;
    }

    // Longer than usize but still a number: no practical bound.
    let n = digits[..end].parse::<usize>().unwrap_or(usize::MAX);
    match (n, negative) {
        (0, _) => fallback,
        (n, false) => Limit::Tail(n),
        (n, true) => Limit::SkipHead(n),
    }
}
