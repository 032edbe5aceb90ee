use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Trace record of one call in a causal chain.
///
/// `request_id` is shared by every call of a chain, `seq` orders the calls
/// within it. A header is filled in by the tracker on the client side and
/// sealed once by [`Tracker::record`](crate::Tracker::record).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceHeader {
    pub request_id: String,
    pub seq: u64,
    pub client: String,
    pub server: String,
    pub api: String,
    pub status: bool,
    pub start: i64,
    pub end: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
}

impl TraceHeader {
    /// Sink key of this header: `"{request_id}:{seq}"`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.request_id, self.seq)
    }

    /// Wall-clock duration of the call in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        self.end - self.start
    }

    /// The `soa` metadata entry propagated to the server.
    pub fn soa(&self) -> Json {
        json!({"req": self.request_id, "rpc": self.seq})
    }

    /// Rebuilds the propagated part of a header from `soa` metadata.
    ///
    /// Returns `None` when the entry carries no request id, e.g. the
    /// `{"req": null}` sent by untraced peers.
    pub fn from_soa(soa: &Json) -> Option<Self> {
        let request_id = soa.get("req")?.as_str()?.to_string();
        let seq = match soa.get("rpc") {
            Some(Json::Number(n)) => n.as_u64()?,
            Some(Json::String(s)) => s.parse().ok()?,
            _ => 0,
        };
        Some(Self {
            request_id,
            seq,
            ..Self::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_and_soa() {
        let header = TraceHeader {
            request_id: "abc".into(),
            seq: 3,
            ..TraceHeader::default()
        };
        assert_eq!(header.key(), "abc:3");
        assert_eq!(header.soa(), json!({"req": "abc", "rpc": 3}));
        assert_eq!(TraceHeader::from_soa(&header.soa()), Some(header));
    }

    #[test]
    fn test_from_soa_without_request_id() {
        assert_eq!(TraceHeader::from_soa(&json!({"req": null})), None);
        assert_eq!(TraceHeader::from_soa(&json!({})), None);
        assert_eq!(TraceHeader::from_soa(&json!({"req": "r", "rpc": "7"})).unwrap().seq, 7);
    }

    #[test]
    fn test_serialization_skips_missing_annotation() {
        let header = TraceHeader::default();
        let value = serde_json::to_value(&header).unwrap();
        assert!(value.get("annotation").is_none());

        let decoded: TraceHeader = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_now_millis_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(now_millis() > 1_577_836_800_000);
    }
}
