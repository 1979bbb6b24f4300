///! Sensor serial normalization
///!
///! Serials arrive from the upstream APIs in inconsistent shapes: JSON
///! numbers, quoted strings, padded strings, sometimes negative. Everything
///! downstream keys on the canonical signed integer produced here.

use serde::{Deserialize, Serialize};

/// Canonical identity of one physical sensor.
pub type Serial = i64;

/// Normalize a raw textual serial into its canonical form.
///
/// Trims whitespace and parses as a base-10 signed integer. Returns `None`
/// for empty or non-numeric input; never panics. Sign is kept verbatim:
/// `-1408232560` and `1408232560` are distinct keys.
pub fn normalize_serial(raw: &str) -> Option<Serial> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<Serial>().ok()
}

/// Normalize a serial that arrived as an arbitrary JSON value.
///
/// Accepts integer numbers and numeric strings; anything else (null, float,
/// bool, object) is invalid.
pub fn normalize_serial_value(value: &serde_json::Value) -> Option<Serial> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => normalize_serial(s),
        _ => None,
    }
}

/// A serial field as it appears on the wire, before normalization.
///
/// Deserializes from either a JSON number or a string; the catch-all variant
/// absorbs nulls and other malformed shapes so one bad field never fails the
/// surrounding record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawSerial {
    Number(i64),
    Text(String),
    Other(serde_json::Value),
}

impl RawSerial {
    pub fn normalize(&self) -> Option<Serial> {
        match self {
            RawSerial::Number(n) => Some(*n),
            RawSerial::Text(s) => normalize_serial(s),
            RawSerial::Other(v) => normalize_serial_value(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_plain_and_signed() {
        assert_eq!(normalize_serial("1995940501"), Some(1995940501));
        assert_eq!(normalize_serial("-1408232560"), Some(-1408232560));
        assert_eq!(normalize_serial("  42  "), Some(42));
    }

    #[test]
    fn test_normalize_rejects_invalid() {
        assert_eq!(normalize_serial(""), None);
        assert_eq!(normalize_serial("   "), None);
        assert_eq!(normalize_serial("abc"), None);
        assert_eq!(normalize_serial("12.5"), None);
        assert_eq!(normalize_serial("12a"), None);
    }

    #[test]
    fn test_normalize_idempotent_through_string_form() {
        for raw in ["123", " -77 ", "0", "2137168417"] {
            let first = normalize_serial(raw).unwrap();
            assert_eq!(normalize_serial(&first.to_string()), Some(first));
        }
    }

    #[test]
    fn test_normalize_value_shapes() {
        assert_eq!(normalize_serial_value(&json!(123)), Some(123));
        assert_eq!(normalize_serial_value(&json!(-9)), Some(-9));
        assert_eq!(normalize_serial_value(&json!("456")), Some(456));
        assert_eq!(normalize_serial_value(&json!(null)), None);
        assert_eq!(normalize_serial_value(&json!(4.5)), None);
        assert_eq!(normalize_serial_value(&json!({"serial": 1})), None);
    }

    #[test]
    fn test_raw_serial_deserialize() {
        let n: RawSerial = serde_json::from_str("1995940582").unwrap();
        assert_eq!(n.normalize(), Some(1995940582));
        let s: RawSerial = serde_json::from_str("\" -3 \"").unwrap();
        assert_eq!(s.normalize(), Some(-3));
        let bad: RawSerial = serde_json::from_str("null").unwrap();
        assert_eq!(bad.normalize(), None);
    }
}
