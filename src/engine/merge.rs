use serde_json::Value;

/// Merges `patch` into `target`: objects merge field by field, recursively;
/// anything else, arrays included, replaces the target value.
pub fn merge_deep(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(dst), Value::Object(src)) => {
            for (field, value) in src {
                match dst.get_mut(field) {
                    Some(existing) => merge_deep(existing, value),
                    None => {
                        dst.insert(field.clone(), value.clone());
                    }
                }
            }
        }
        (dst, src) => *dst = src.clone(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn nested_objects_merge_and_leaves_replace() {
        let mut target = json!({"id": 1, "profile": {"name": "a", "age": 3}, "tags": [1, 2]});
        merge_deep(&mut target, &json!({"profile": {"age": 4}, "tags": [9]}));
        assert_eq!(
            target,
            json!({"id": 1, "profile": {"name": "a", "age": 4}, "tags": [9]})
        );
    }

    #[test]
    fn non_object_patch_replaces_whole_value() {
        let mut target = json!({"id": 1});
        merge_deep(&mut target, &json!("gone"));
        assert_eq!(target, json!("gone"));
    }
}
