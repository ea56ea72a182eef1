//! tf-JSON object builders
//!
//! Each builder returns a small JSON document; stages collect them and
//! [`render_objects`] deep-merges the lot into `_nebari.tf.json`.

use serde::Serialize;
use serde_json::{Map, Value};

/// Wraps `body` under the given chain of keys.
fn nest(keys: &[&str], body: Value) -> Value {
    keys.iter().rev().fold(body, |inner, key| {
        let mut map = Map::new();
        map.insert((*key).to_string(), inner);
        Value::Object(map)
    })
}

pub fn terraform(body: Value) -> Value {
    nest(&["terraform"], body)
}

pub fn required_provider(name: &str, body: Value) -> Value {
    nest(&["terraform", "required_providers", name], body)
}

pub fn provider(name: &str, body: Value) -> Value {
    nest(&["provider", name], body)
}

pub fn backend(name: &str, body: Value) -> Value {
    nest(&["terraform", "backend", name], body)
}

pub fn variable(name: &str, body: Value) -> Value {
    nest(&["variable", name], body)
}

pub fn data(resource_type: &str, name: &str, body: Value) -> Value {
    nest(&["data", resource_type, name], body)
}

pub fn resource(resource_type: &str, name: &str, body: Value) -> Value {
    nest(&["resource", resource_type, name], body)
}

pub fn output(name: &str, body: Value) -> Value {
    nest(&["output", name], body)
}

/// Merges two documents.
///
/// Objects merge key by key, arrays concatenate, and for any other
/// combination the left value is kept.
pub fn deep_merge(left: Value, right: Value) -> Value {
    match (left, right) {
        (Value::Object(mut left), Value::Object(right)) => {
            for (key, value) in right {
                let merged = match left.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                left.insert(key, merged);
            }
            Value::Object(left)
        }
        (Value::Array(mut left), Value::Array(right)) => {
            left.extend(right);
            Value::Array(left)
        }
        (left, _) => left,
    }
}

/// Folds any number of documents with [`deep_merge`], starting from `{}`.
pub fn merge_all<I>(documents: I) -> Value
where
    I: IntoIterator<Item = Value>,
{
    documents
        .into_iter()
        .fold(Value::Object(Map::new()), deep_merge)
}

/// Renders merged objects as JSON indented by four spaces.
pub fn render_objects(objects: &[Value]) -> serde_json::Result<String> {
    let merged = merge_all(objects.iter().cloned());
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    merged.serialize(&mut serializer)?;
    // serde_json only emits UTF-8
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deep_merge() {
        let left = json!({
            "a": [1, 2],
            "b": {"c": 1, "z": [5, 6]},
            "e": {"f": {"g": {}}},
            "m": 1,
        });
        let right = json!({
            "a": [3, 4],
            "b": {"d": 2, "z": [7]},
            "e": {"f": {"h": 1}},
            "m": [1],
        });

        assert_eq!(
            deep_merge(left, right),
            json!({
                "a": [1, 2, 3, 4],
                "b": {"c": 1, "d": 2, "z": [5, 6, 7]},
                "e": {"f": {"g": {}, "h": 1}},
                "m": 1,
            })
        );
    }

    #[test]
    fn test_builders_merge_into_one_terraform_block() {
        let merged = merge_all([
            required_provider("aws", json!({"source": "hashicorp/aws", "version": "5.12.0"})),
            backend("s3", json!({"bucket": "state"})),
            provider("aws", json!({"region": "us-west-2"})),
        ]);

        assert_eq!(merged["terraform"]["required_providers"]["aws"]["source"], "hashicorp/aws");
        assert_eq!(merged["terraform"]["backend"]["s3"]["bucket"], "state");
        assert_eq!(merged["provider"]["aws"]["region"], "us-west-2");
    }

    #[test]
    fn test_resource_and_data_paths() {
        let doc = merge_all([
            resource("aws_s3_bucket", "state", json!({"bucket": "b"})),
            data("aws_eks_cluster", "default", json!({"name": "c"})),
            variable("name", json!({"type": "string"})),
            output("id", json!({"value": "x"})),
        ]);
        assert_eq!(doc["resource"]["aws_s3_bucket"]["state"]["bucket"], "b");
        assert_eq!(doc["data"]["aws_eks_cluster"]["default"]["name"], "c");
        assert_eq!(doc["variable"]["name"]["type"], "string");
        assert_eq!(doc["output"]["id"]["value"], "x");
    }

    #[test]
    fn test_render_objects_uses_four_spaces() {
        let text = render_objects(&[terraform(json!({"required_version": ">= 1"}))]).unwrap();
        assert_eq!(
            text,
            "{\n    \"terraform\": {\n        \"required_version\": \">= 1\"\n    }\n}"
        );
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render_objects(&[]).unwrap(), "{}");
    }
}
