//! Helpers for the compose document's polymorphic YAML nodes.
//!
//! `labels:`, `environment:`, and (per-service) `networks:` may appear as
//! either a list of `"k=v"` strings or a map of strings. We normalize to a
//! `BTreeMap` on read (ordered, so re-serialization is deterministic and the
//! rewriter's idempotence property is byte-stable), operate on the map, and
//! always emit map form back out — the runtime accepts either.

use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;

pub fn value_to_map(value: Option<&Value>) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    match value {
        Some(Value::Mapping(mapping)) => {
            for (k, v) in mapping {
                if let (Some(key), Some(val)) = (k.as_str(), scalar_to_string(v)) {
                    map.insert(key.to_string(), val);
                }
            }
        }
        Some(Value::Sequence(seq)) => {
            for entry in seq {
                if let Some(s) = entry.as_str() {
                    if let Some((k, v)) = s.split_once('=') {
                        map.insert(k.to_string(), v.to_string());
                    } else {
                        map.insert(s.to_string(), String::new());
                    }
                }
            }
        }
        _ => {}
    }
    map
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

pub fn map_to_value(map: &BTreeMap<String, String>) -> Value {
    let mut mapping = Mapping::new();
    for (k, v) in map {
        mapping.insert(Value::String(k.clone()), Value::String(v.clone()));
    }
    Value::Mapping(mapping)
}

/// Reads a service's `ports:` or `expose:` entries, returning the
/// container-side port of each (the part after `:` in a `host:container`
/// mapping, or the bare value when unmapped).
pub fn container_ports(service: &Mapping, key: &str) -> Vec<String> {
    let mut ports = Vec::new();
    if let Some(Value::Sequence(seq)) = service.get(Value::String(key.to_string())) {
        for entry in seq {
            let raw = match entry {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => continue,
            };
            let container_part = raw.rsplit(':').next().unwrap_or(&raw);
            // strip any /tcp or /udp suffix and protocol markers for comparison but keep original text
            ports.push(container_part.to_string());
        }
    }
    ports
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_list_form_labels() {
        let value = Value::Sequence(vec![Value::String("foo=bar".into()), Value::String("baz=qux".into())]);
        let map = value_to_map(Some(&value));
        assert_eq!(map.get("foo"), Some(&"bar".to_string()));
        assert_eq!(map.get("baz"), Some(&"qux".to_string()));
    }

    #[test]
    fn normalizes_map_form_labels() {
        let mut mapping = Mapping::new();
        mapping.insert(Value::String("foo".into()), Value::String("bar".into()));
        let map = value_to_map(Some(&Value::Mapping(mapping)));
        assert_eq!(map.get("foo"), Some(&"bar".to_string()));
    }

    #[test]
    fn environment_entry_without_value_becomes_empty_string() {
        let value = Value::Sequence(vec![Value::String("NO_VALUE".into())]);
        let map = value_to_map(Some(&value));
        assert_eq!(map.get("NO_VALUE"), Some(&String::new()));
    }
}
