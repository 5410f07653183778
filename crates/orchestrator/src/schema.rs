//! Lightweight JSON-schema argument validation.
//!
//! Covers what the tool schemas actually use: required keys, top-level
//! property types, and enum membership. Unknown keys are tolerated (the
//! identity overlay adds `user_id`, which tools never declare).

use serde_json::Value;

/// Validate `args` against a tool's declared parameter schema. Returns a
/// corrective message on mismatch, suitable for a tool-error hint.
pub(crate) fn validate_args(schema: &Value, args: &Value) -> Result<(), String> {
    let Some(args_obj) = args.as_object() else {
        return Err("arguments must be a JSON object".into());
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if !args_obj.contains_key(key) {
                return Err(format!("missing required argument '{key}'"));
            }
        }
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };

    for (key, value) in args_obj {
        let Some(spec) = properties.get(key) else {
            continue;
        };
        if value.is_null() {
            continue;
        }

        if let Some(expected) = spec.get("type").and_then(Value::as_str) {
            if !type_matches(expected, value) {
                return Err(format!(
                    "argument '{key}' must be of type {expected}, got {}",
                    type_name(value)
                ));
            }
        }

        if let Some(allowed) = spec.get("enum").and_then(Value::as_array) {
            if !allowed.contains(value) {
                let options: Vec<&str> =
                    allowed.iter().filter_map(Value::as_str).collect();
                return Err(format!(
                    "argument '{key}' must be one of: {}",
                    options.join(", ")
                ));
            }
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "estimated_duration_minutes": { "type": "integer" },
                "priority": { "type": "string", "enum": ["low", "medium", "high", "urgent"] }
            },
            "required": ["title"]
        })
    }

    #[test]
    fn accepts_valid_arguments() {
        let args = json!({ "title": "Learn Rust", "estimated_duration_minutes": 90 });
        assert!(validate_args(&schema(), &args).is_ok());
    }

    #[test]
    fn rejects_missing_required_key() {
        let err = validate_args(&schema(), &json!({})).unwrap_err();
        assert!(err.contains("title"));
    }

    #[test]
    fn rejects_wrong_type() {
        let args = json!({ "title": "x", "estimated_duration_minutes": "ninety" });
        let err = validate_args(&schema(), &args).unwrap_err();
        assert!(err.contains("integer"));
    }

    #[test]
    fn rejects_unknown_enum_value() {
        let args = json!({ "title": "x", "priority": "extreme" });
        let err = validate_args(&schema(), &args).unwrap_err();
        assert!(err.contains("low, medium, high, urgent"));
    }

    #[test]
    fn tolerates_undeclared_keys() {
        let args = json!({ "title": "x", "user_id": "u1" });
        assert!(validate_args(&schema(), &args).is_ok());
    }

    #[test]
    fn rejects_non_object_arguments() {
        assert!(validate_args(&schema(), &json!("just a string")).is_err());
    }
}
