use serde_json::Value;

/// Drops top-level members whose value is `null`. Nested objects and
/// non-object values are returned unchanged.
pub fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(mut members) => {
            members.retain(|_, member| !member.is_null());
            Value::Object(members)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::strip_nulls;

    #[test]
    fn removes_only_top_level_nulls() {
        let stripped = strip_nulls(json!({
            "msdyn_name": "00042",
            "msdyn_instructions": null,
            "msdyn_serviceaccount": {"name": "Contoso", "phone": null},
            "tags": [null]
        }));

        assert_eq!(
            stripped,
            json!({
                "msdyn_name": "00042",
                "msdyn_serviceaccount": {"name": "Contoso", "phone": null},
                "tags": [null]
            })
        );
    }

    #[test]
    fn non_objects_pass_through() {
        assert_eq!(strip_nulls(json!([1, null])), json!([1, null]));
        assert_eq!(strip_nulls(json!(null)), json!(null));
    }
}
