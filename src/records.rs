//! Record shapes stored by the lifecycle engine, plus small helpers for the
//! loosely-typed payloads the RPC layer hands in.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

pub fn now_ts() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// String view of a payload field. Numbers are rendered, everything else
/// (missing, null, bool, objects) reads as empty.
pub fn text_field(record: &Map<String, Value>, key: &str) -> String {
    match record.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

pub fn opt_text_field(record: &Map<String, Value>, key: &str) -> Option<String> {
    let v = text_field(record, key);
    if v.trim().is_empty() {
        None
    } else {
        Some(v)
    }
}

/// Attaches `id` to a stored record for responses.
pub fn with_id(id: &str, record: Value) -> Value {
    match record {
        Value::Object(mut map) => {
            map.insert("id".to_string(), Value::String(id.to_string()));
            Value::Object(map)
        }
        other => other,
    }
}

/// Children of an interior node, ordered by key, each with its id attached.
pub fn children_with_ids(node: Option<Value>) -> Vec<Value> {
    match node {
        Some(Value::Object(map)) => map.into_iter().map(|(id, v)| with_id(&id, v)).collect(),
        _ => Vec::new(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<String>,
    #[serde(default)]
    pub classes: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Enrolled,
    Moved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentRecord {
    pub status: EnrollmentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrolled_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moved_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentCurrentPointer {
    pub school_year_id: String,
    pub class_id: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveAuditRecord {
    pub ts: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_school_year_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_class_id: Option<String>,
    pub to_school_year_id: String,
    pub to_class_id: String,
    pub reason: String,
    pub actor_uid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectEnrollmentRecord {
    pub enrolled_at: String,
    pub class_subject_id: String,
    pub class_id: String,
}
