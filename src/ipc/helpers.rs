use serde_json::{Map, Value};

pub fn str_param<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

/// Trimmed, non-empty string param.
pub fn opt_str_param(params: &Value, key: &str) -> Option<String> {
    str_param(params, key)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn bool_param(params: &Value, key: &str) -> bool {
    params.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

pub fn object_param(params: &Value, key: &str) -> Option<Map<String, Value>> {
    params.get(key).and_then(|v| v.as_object()).cloned()
}
