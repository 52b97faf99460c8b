//! Stream payload decoding
//!
//! Depending on server version a stream message carries a reading object,
//! a one-element array holding one, or either of those JSON-encoded a
//! second time as a string.

use serde_json::Value;

use crate::timeline::{RawReading, TimelineError, TimelineResult};

/// Decode one stream message into a raw reading
pub fn decode_stream_payload(data: &str) -> TimelineResult<RawReading> {
    let value = match serde_json::from_str::<Value>(data.trim())? {
        Value::String(inner) => serde_json::from_str::<Value>(inner.trim())?,
        other => other,
    };

    let reading = match value {
        Value::Array(items) => {
            let count = items.len();
            let first = items
                .into_iter()
                .next()
                .ok_or_else(|| TimelineError::Decode("empty reading array".to_string()))?;
            if count > 1 {
                tracing::debug!(count, "Stream payload held several readings, using the first");
            }
            first
        }
        obj @ Value::Object(_) => obj,
        other => {
            return Err(TimelineError::Decode(format!(
                "expected reading object or array, got {}",
                json_kind(&other)
            )))
        }
    };

    Ok(serde_json::from_value(reading)?)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::RawTimestamp;

    #[test]
    fn test_single_object() {
        let reading = decode_stream_payload(r#"{"value": 5.7, "timestamp": 1704067260}"#).unwrap();
        assert_eq!(reading, RawReading::new(5.7, 1704067260));
    }

    #[test]
    fn test_one_element_array() {
        let reading =
            decode_stream_payload(r#"[{"value": 5.7, "timestamp": "2024-01-01T00:01:00Z"}]"#)
                .unwrap();
        assert_eq!(
            reading.timestamp,
            RawTimestamp::Iso("2024-01-01T00:01:00Z".to_string())
        );
    }

    #[test]
    fn test_double_encoded() {
        let inner = r#"[{"value": 6.1, "timestamp": 1704067320}]"#;
        let outer = serde_json::to_string(inner).unwrap();

        let reading = decode_stream_payload(&outer).unwrap();
        assert_eq!(reading, RawReading::new(6.1, 1704067320));
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(matches!(
            decode_stream_payload("{not json"),
            Err(TimelineError::Decode(_))
        ));
        assert!(matches!(
            decode_stream_payload("[]"),
            Err(TimelineError::Decode(_))
        ));
        assert!(matches!(
            decode_stream_payload("42"),
            Err(TimelineError::Decode(_))
        ));
        assert!(matches!(
            decode_stream_payload(r#"{"value": "high"}"#),
            Err(TimelineError::Decode(_))
        ));
        assert!(matches!(
            decode_stream_payload(r#""\"still a string\"""#),
            Err(TimelineError::Decode(_))
        ));
    }
}
