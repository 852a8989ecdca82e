use serde_json::Value;

/// Merge `patch` into `target`.
///
/// Objects merge recursively per key. Arrays and primitives replace.
pub fn deep_merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match target_map.get_mut(key) {
                    Some(existing) if existing.is_object() && patch_value.is_object() => {
                        deep_merge(existing, patch_value);
                    }
                    _ => {
                        target_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

/// Return `target` merged with `patch`, leaving both inputs untouched.
pub fn merged(target: &Value, patch: &Value) -> Value {
    let mut out = target.clone();
    deep_merge(&mut out, patch);
    out
}
