//! Access-log record emitted once per request by the capture middleware.

use std::collections::BTreeMap;

use axum::http::HeaderMap;
use serde::Serialize;
use serde_json::Value;

/// One captured side of an HTTP exchange.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HttpData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub header_map: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl HttpData {
    pub fn request(headers: &HeaderMap, body: &[u8]) -> Self {
        Self {
            status_code: None,
            header_map: flatten_headers(headers),
            body: captured_body(body),
        }
    }

    pub fn response(status_code: u16, headers: &HeaderMap, body: Option<Value>) -> Self {
        Self {
            status_code: Some(status_code),
            header_map: flatten_headers(headers),
            body,
        }
    }
}

/// Structured access-log record. Absent sections are omitted when serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccessLogEntry {
    pub method: String,
    pub host: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<HttpData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<HttpData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_time_ns: u64,
}

/// Flattens multi-valued headers into one space-joined string per key.
/// Values that are not visible ASCII are rendered lossily.
pub fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut flat = BTreeMap::new();
    for key in headers.keys() {
        let joined = headers
            .get_all(key)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        flat.insert(key.as_str().to_string(), joined);
    }
    flat
}

/// Parsed JSON when the bytes are valid JSON, the raw (lossy) string otherwise.
/// An empty body yields `None`.
pub fn captured_body(bytes: &[u8]) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => Some(value),
        Err(_) => Some(Value::String(String::from_utf8_lossy(bytes).into_owned())),
    }
}
