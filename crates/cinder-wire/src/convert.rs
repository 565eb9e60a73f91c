//! Conversions between `http::HeaderMap` and the wire header multimap.

use std::collections::HashMap;

use http::header::{HeaderMap, HeaderName, HeaderValue};

use crate::HeaderValues;

/// Convert an `http::HeaderMap` into the wire header multimap, preserving
/// per-name value order. Values that are not valid UTF-8 are carried
/// lossily; the wire format is string-valued.
#[must_use]
pub fn header_map_to_wire(headers: &HeaderMap) -> HashMap<String, HeaderValues> {
    let mut wire: HashMap<String, HeaderValues> = HashMap::with_capacity(headers.keys_len());
    for name in headers.keys() {
        let values = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect();
        wire.insert(name.as_str().to_string(), HeaderValues { values });
    }
    wire
}

/// Convert a wire header multimap back into an `http::HeaderMap`.
///
/// Names or values that are not representable as HTTP headers are skipped;
/// the caller decides whether that deserves a log line.
#[must_use]
pub fn header_map_from_wire(wire: &HashMap<String, HeaderValues>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, values) in wire {
        let Ok(name) = name.parse::<HeaderName>() else {
            continue;
        };
        for value in &values.values {
            if let Ok(value) = HeaderValue::from_str(value) {
                headers.append(name.clone(), value);
            }
        }
    }
    headers
}
