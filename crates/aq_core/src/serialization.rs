//! Canonical JSON for metrics and metadata files.
//!
//! Object keys are sorted recursively and output is pretty-printed with a
//! two-space indent, so identical content always yields identical bytes.

use serde::Serialize;
use serde_json::{ser::PrettyFormatter, Map, Serializer, Value};
use std::io::Write;

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sort_keys(v)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Write `value` as canonical JSON followed by a trailing newline.
pub fn write_canonical_json<T, W>(mut writer: W, value: &T) -> Result<(), serde_json::Error>
where
    T: Serialize,
    W: Write,
{
    let sorted = sort_keys(serde_json::to_value(value)?);
    let mut serializer =
        Serializer::with_formatter(&mut writer, PrettyFormatter::with_indent(b"  "));
    sorted.serialize(&mut serializer)?;
    writer.write_all(b"\n").map_err(serde_json::Error::io)
}

pub fn canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut buffer = Vec::new();
    write_canonical_json(&mut buffer, value)?;
    Ok(buffer)
}

/// Shallow-merge the keys of `update` into `base`; `update` wins on conflict.
///
/// Non-object inputs are treated as empty objects.
pub fn merge_objects(base: Value, update: Value) -> Value {
    let mut merged = match base {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    if let Value::Object(extra) = update {
        for (key, value) in extra {
            merged.insert(key, value);
        }
    }
    Value::Object(merged)
}
