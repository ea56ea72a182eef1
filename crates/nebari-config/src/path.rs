//! Path-based setter over the raw YAML tree.
//!
//! Segments address mapping keys, or sequence positions when the current node
//! is a sequence and the segment is all digits. Missing mapping keys are
//! created on the way down.

use crate::error::{ConfigError, Result};
use serde_yaml::{Mapping, Value};

/// Sets `value` at `path` inside `root`.
pub fn set_nested_value(root: &mut Value, path: &[&str], value: Value) -> Result<()> {
    let Some((last, parents)) = path.split_last() else {
        return Err(ConfigError::InvalidPath {
            path: String::new(),
            reason: "empty path".to_string(),
        });
    };

    let mut cursor = root;
    for (depth, segment) in parents.iter().enumerate() {
        cursor = child_mut(cursor, segment).map_err(|reason| ConfigError::InvalidPath {
            path: path[..=depth].join("."),
            reason,
        })?;
    }

    assign(cursor, last, value).map_err(|reason| ConfigError::InvalidPath {
        path: path.join("."),
        reason,
    })
}

fn child_mut<'a>(node: &'a mut Value, segment: &str) -> std::result::Result<&'a mut Value, String> {
    if node.is_null() {
        *node = Value::Mapping(Mapping::new());
    }

    match node {
        Value::Mapping(map) => {
            let key = Value::String(segment.to_string());
            if !map.contains_key(&key) {
                map.insert(key.clone(), Value::Mapping(Mapping::new()));
            }
            map.get_mut(&key)
                .ok_or_else(|| format!("key '{}' vanished", segment))
        }
        Value::Sequence(seq) => {
            let index = parse_index(segment)?;
            let len = seq.len();
            seq.get_mut(index)
                .ok_or_else(|| format!("index {} out of range (length {})", index, len))
        }
        other => Err(format!("cannot descend into {}", kind(other))),
    }
}

fn assign(node: &mut Value, segment: &str, value: Value) -> std::result::Result<(), String> {
    if node.is_null() {
        *node = Value::Mapping(Mapping::new());
    }

    match node {
        Value::Mapping(map) => {
            map.insert(Value::String(segment.to_string()), value);
            Ok(())
        }
        Value::Sequence(seq) => {
            let index = parse_index(segment)?;
            let len = seq.len();
            match seq.get_mut(index) {
                Some(slot) => {
                    *slot = value;
                    Ok(())
                }
                None => Err(format!("index {} out of range (length {})", index, len)),
            }
        }
        other => Err(format!("cannot set a field on {}", kind(other))),
    }
}

fn parse_index(segment: &str) -> std::result::Result<usize, String> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("'{}' is not a sequence index", segment));
    }
    segment
        .parse()
        .map_err(|_| format!("'{}' is not a sequence index", segment))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
