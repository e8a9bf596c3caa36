//! Operations on the JSON configuration tree.
//!
//! # Responsibilities
//! - Deep-merge incoming documents into the accumulated tree
//! - Enumerate dotted key paths for validation
//! - Resolve a dotted path to a value

use serde_json::{Map, Value};

/// Merge `incoming` into `target`.
///
/// Objects merge key by key, recursively. Arrays and scalars in `incoming`
/// replace whatever `target` held at that position.
pub fn deep_merge(target: &mut Value, incoming: Value) {
    match (target, incoming) {
        (Value::Object(dst), Value::Object(src)) => {
            for (key, value) in src {
                match dst.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, value);
                    }
                    _ => {
                        dst.insert(key, value);
                    }
                }
            }
        }
        (dst, src) => *dst = src,
    }
}

/// Collect every key path in `doc`, descending into nested objects only.
///
/// Intermediate objects are reported too, so `{"b": {"c": 1}}` yields
/// `["b", "b.c"]`. Array elements are never descended into.
pub fn key_paths(doc: &Value) -> Vec<String> {
    let mut paths = Vec::new();
    if let Value::Object(map) = doc {
        collect(map, "", &mut paths);
    }
    paths
}

fn collect(map: &Map<String, Value>, prefix: &str, out: &mut Vec<String>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        if let Value::Object(inner) = value {
            out.push(path.clone());
            collect(inner, &path, out);
        } else {
            out.push(path);
        }
    }
}

/// Resolve a dotted path such as `root.lvl2.value`.
pub fn get_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(doc, |node, segment| node.as_object()?.get(segment))
}

/// Narrow a document to its `group` subtree when the key is present.
pub fn scope(doc: Value, group: Option<&str>) -> Value {
    match (group, doc) {
        (Some(group), Value::Object(mut map)) if map.contains_key(group) => {
            map.remove(group).unwrap_or(Value::Null)
        }
        (_, doc) => doc,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_is_recursive_for_objects() {
        let mut base = json!({"db": {"host": "a", "port": 1}, "tags": [1, 2]});
        deep_merge(&mut base, json!({"db": {"port": 2}, "tags": [3]}));
        assert_eq!(base, json!({"db": {"host": "a", "port": 2}, "tags": [3]}));
    }

    #[test]
    fn merge_replaces_scalar_with_object() {
        let mut base = json!({"db": "none"});
        deep_merge(&mut base, json!({"db": {"host": "a"}}));
        assert_eq!(base, json!({"db": {"host": "a"}}));
    }

    #[test]
    fn key_paths_skip_arrays() {
        let mut paths = key_paths(&json!({"a": 1, "b": {"c": [{"d": 1}]}}));
        paths.sort();
        assert_eq!(paths, vec!["a", "b", "b.c"]);
    }

    #[test]
    fn get_path_resolves_nested_values() {
        let doc = json!({"root": {"lvl2": {"value": 7}}});
        assert_eq!(get_path(&doc, "root.lvl2.value"), Some(&json!(7)));
        assert_eq!(get_path(&doc, "root.missing"), None);
    }

    #[test]
    fn scope_falls_back_to_whole_document() {
        let doc = json!({"coin": {"symbol": "BTC"}});
        assert_eq!(scope(doc.clone(), Some("coin")), json!({"symbol": "BTC"}));
        assert_eq!(scope(doc.clone(), Some("other")), doc);
        assert_eq!(scope(doc.clone(), None), doc);
    }
}
