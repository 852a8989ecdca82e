//! # Dot-path access over JSON values
//!
//! State paths are dot-separated segments (`"user.profile.name"`). A segment
//! addresses an object key, or an array index when the current value is an
//! array and the segment parses as `usize`. The empty path addresses the root.

use crate::error::{CommonError, CommonResult};
use serde_json::{Map, Value};

/// Split a dot path into segments, rejecting empty segments.
pub fn split_path(path: &str) -> CommonResult<Vec<&str>> {
    if path.is_empty() {
        return Ok(Vec::new());
    }

    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(CommonError::InvalidPath {
            path: path.to_string(),
            reason: "empty segment".to_string(),
        });
    }

    Ok(segments)
}

/// Read the value at `path`, or `None` when any segment is missing.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let segments = split_path(path).ok()?;
    let mut current = value;

    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Read the value at `path`, treating a missing path as `null`.
pub fn get_path_or_null(value: &Value, path: &str) -> Value {
    get_path(value, path).cloned().unwrap_or(Value::Null)
}

/// Most `null` slots a single write may append to an array.
pub const MAX_ARRAY_PADDING: usize = 1024;

/// Write `new_value` at `path`, creating intermediate objects as needed.
///
/// Primitive values met along the way are replaced by empty objects. Array
/// indices past the end pad the array with `null`, up to
/// [`MAX_ARRAY_PADDING`] slots.
pub fn set_path(value: &mut Value, path: &str, new_value: Value) -> CommonResult<()> {
    let segments = split_path(path)?;
    let Some((last, parents)) = segments.split_last() else {
        *value = new_value;
        return Ok(());
    };

    let mut current = value;
    for segment in parents {
        current = child_slot(current, segment, path)?;
    }

    let index = last.parse::<usize>().ok();
    match (current, index) {
        (Value::Array(items), Some(index)) => {
            *array_slot(items, index, path)? = new_value;
        }
        (other, _) => {
            if !other.is_object() {
                *other = Value::Object(Map::new());
            }
            if let Value::Object(map) = other {
                map.insert((*last).to_string(), new_value);
            }
        }
    }

    Ok(())
}

/// Remove the value at `path`, returning it when present.
pub fn delete_path(value: &mut Value, path: &str) -> CommonResult<Option<Value>> {
    let segments = split_path(path)?;
    let Some((last, parents)) = segments.split_last() else {
        return Ok(Some(std::mem::take(value)));
    };

    let mut current = value;
    for segment in parents {
        current = match current {
            Value::Object(map) => match map.get_mut(*segment) {
                Some(next) => next,
                None => return Ok(None),
            },
            Value::Array(items) => match segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                Some(next) => next,
                None => return Ok(None),
            },
            _ => return Ok(None),
        };
    }

    Ok(match current {
        Value::Object(map) => map.remove(*last),
        Value::Array(items) => match last.parse::<usize>() {
            Ok(index) if index < items.len() => Some(items.remove(index)),
            _ => None,
        },
        _ => None,
    })
}

/// True when one path is a prefix (segment-wise) of the other.
///
/// The root path overlaps everything.
pub fn paths_overlap(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return true;
    }

    let a_segments = a.split('.');
    let b_segments = b.split('.');
    a_segments.zip(b_segments).all(|(x, y)| x == y)
}

/// Join a parent path and a child segment.
pub fn join_path(parent: &str, segment: &str) -> String {
    if parent.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", parent, segment)
    }
}

/// Every object-key path in `value`, depth first, rooted at `prefix`.
///
/// Used to describe which paths a partial-object merge touches.
pub fn object_paths(value: &Value, prefix: &str) -> Vec<String> {
    let mut paths = Vec::new();
    collect_object_paths(value, prefix, &mut paths);
    paths
}

fn collect_object_paths(value: &Value, prefix: &str, out: &mut Vec<String>) {
    if let Value::Object(map) = value {
        for (key, child) in map {
            let path = join_path(prefix, key);
            out.push(path.clone());
            collect_object_paths(child, &path, out);
        }
    }
}

fn child_slot<'a>(current: &'a mut Value, segment: &str, path: &str) -> CommonResult<&'a mut Value> {
    let index = match current {
        Value::Array(_) => segment.parse::<usize>().ok(),
        _ => None,
    };

    let slot = match (current, index) {
        (Value::Array(items), Some(index)) => array_slot(items, index, path)?,
        (other, _) => {
            if !other.is_object() {
                *other = Value::Object(Map::new());
            }
            match other {
                Value::Object(map) => map
                    .entry(segment.to_string())
                    .or_insert_with(|| Value::Object(Map::new())),
                _ => return Err(invalid(path, "parent is not an object")),
            }
        }
    };

    if !slot.is_object() && !slot.is_array() {
        *slot = Value::Object(Map::new());
    }
    Ok(slot)
}

/// Slot `index` of `items`, padding with `null` when it lies past the end.
fn array_slot<'a>(items: &'a mut Vec<Value>, index: usize, path: &str) -> CommonResult<&'a mut Value> {
    if index >= items.len() {
        if index - items.len() >= MAX_ARRAY_PADDING {
            return Err(invalid(path, "array index too far past the end"));
        }
        items.resize(index + 1, Value::Null);
    }
    Ok(&mut items[index])
}

fn invalid(path: &str, reason: &str) -> CommonError {
    CommonError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_nested_and_array_paths() {
        let state = json!({"user": {"tags": ["a", "b"], "name": "ada"}});

        assert_eq!(get_path(&state, "user.name"), Some(&json!("ada")));
        assert_eq!(get_path(&state, "user.tags.1"), Some(&json!("b")));
        assert_eq!(get_path(&state, "user.missing"), None);
        assert_eq!(get_path(&state, ""), Some(&state));
        assert_eq!(get_path_or_null(&state, "nope.deeper"), Value::Null);
    }

    #[test]
    fn test_set_creates_intermediate_objects() {
        let mut state = json!({"count": 0});
        set_path(&mut state, "settings.theme.mode", json!("dark")).unwrap();

        assert_eq!(state, json!({"count": 0, "settings": {"theme": {"mode": "dark"}}}));
    }

    #[test]
    fn test_set_replaces_primitive_parent() {
        let mut state = json!({"a": 1});
        set_path(&mut state, "a.b", json!(true)).unwrap();

        assert_eq!(state, json!({"a": {"b": true}}));
    }

    #[test]
    fn test_set_array_index_pads_with_null() {
        let mut state = json!({"items": [1]});
        set_path(&mut state, "items.3", json!(4)).unwrap();

        assert_eq!(state, json!({"items": [1, null, null, 4]}));
    }

    #[test]
    fn test_set_empty_path_replaces_root() {
        let mut state = json!({"a": 1});
        set_path(&mut state, "", json!([1, 2])).unwrap();

        assert_eq!(state, json!([1, 2]));
    }

    #[test]
    fn test_set_rejects_far_array_index() {
        let mut state = json!({"list": [], "nested": [[]]});

        let err = set_path(&mut state, "list.18446744073709551615", json!(1)).unwrap_err();
        assert!(matches!(err, CommonError::InvalidPath { .. }));
        assert!(set_path(&mut state, "list.4000000000", json!(1)).is_err());
        assert!(set_path(&mut state, "nested.0.4000000000.x", json!(1)).is_err());
        assert_eq!(state, json!({"list": [], "nested": [[]]}));

        set_path(&mut state, "list.1023", json!(1)).unwrap();
        assert_eq!(state["list"].as_array().map(Vec::len), Some(1024));
    }

    #[test]
    fn test_invalid_path_rejected() {
        let mut state = json!({});
        let err = set_path(&mut state, "a..b", json!(1)).unwrap_err();

        assert!(matches!(err, CommonError::InvalidPath { .. }));
    }

    #[test]
    fn test_delete_path() {
        let mut state = json!({"a": {"b": 1, "c": 2}, "list": [1, 2, 3]});

        assert_eq!(delete_path(&mut state, "a.b").unwrap(), Some(json!(1)));
        assert_eq!(delete_path(&mut state, "list.0").unwrap(), Some(json!(1)));
        assert_eq!(delete_path(&mut state, "a.zzz").unwrap(), None);
        assert_eq!(state, json!({"a": {"c": 2}, "list": [2, 3]}));
    }

    #[test]
    fn test_paths_overlap() {
        assert!(paths_overlap("user", "user.name"));
        assert!(paths_overlap("user.name", "user"));
        assert!(paths_overlap("", "anything"));
        assert!(!paths_overlap("user.name", "user.age"));
        assert!(!paths_overlap("count", "counter"));
    }

    #[test]
    fn test_object_paths() {
        let partial = json!({"a": {"b": 1}, "c": [1]});
        let paths = object_paths(&partial, "");

        assert_eq!(paths, vec!["a", "a.b", "c"]);
    }
}
