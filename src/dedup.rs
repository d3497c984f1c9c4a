//! Class/subject/teacher assignments (`/class_subjects`), deduplicated by a
//! derived composite key since the store has no uniqueness constraints.
//!
//! `create_if_absent` is idempotent against retries of the same payload. It is
//! not safe against two concurrent creators; the sidecar's one-request-at-a-time
//! loop is what serializes them.

use crate::error::{EngineError, EngineResult};
use crate::paths::{self, CLASS_SUBJECTS};
use crate::records::{children_with_ids, now_ts, opt_text_field, text_field, with_id};
use crate::store::{tree, Store};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

/// Field order and `|` separator are part of every stored composite; changing
/// either breaks duplicate detection against existing records.
pub const COMPOSITE_FIELDS: [&str; 6] = [
    "classId",
    "subjectId",
    "teacherId",
    "year",
    "term",
    "schedule",
];

pub fn compute_composite(record: &Map<String, Value>) -> String {
    COMPOSITE_FIELDS
        .iter()
        .map(|f| text_field(record, f))
        .collect::<Vec<_>>()
        .join("|")
}

/// Indexed lookup first; any query failure (typically an unindexed field)
/// falls back to scanning every assignment and recomputing its composite.
pub fn find_existing(store: &dyn Store, composite: &str) -> EngineResult<Option<String>> {
    let wanted = Value::String(composite.to_string());
    match store.query_by_field(CLASS_SUBJECTS, "composite", &wanted) {
        Ok(hits) => return Ok(hits.into_iter().map(|(id, _)| id).next()),
        Err(e) => debug!(error = %e, "composite query unavailable, scanning assignments"),
    }

    let all = store
        .get(CLASS_SUBJECTS)
        .map_err(|e| EngineError::store(CLASS_SUBJECTS, e))?;
    let Some(Value::Object(records)) = all else {
        return Ok(None);
    };
    Ok(records.into_iter().find_map(|(id, record)| match record {
        Value::Object(map) if compute_composite(&map) == composite => Some(id),
        _ => None,
    }))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOutcome {
    pub id: String,
    pub existing: bool,
    pub composite: String,
}

fn require_links(record: &Map<String, Value>) -> EngineResult<()> {
    for field in ["classId", "subjectId"] {
        if opt_text_field(record, field).is_none() {
            return Err(EngineError::invalid(format!("missing {field}")));
        }
    }
    Ok(())
}

pub fn create_if_absent(store: &dyn Store, payload: Map<String, Value>) -> EngineResult<CreateOutcome> {
    require_links(&payload)?;
    let composite = compute_composite(&payload);
    if let Some(id) = find_existing(store, &composite)? {
        return Ok(CreateOutcome {
            id,
            existing: true,
            composite,
        });
    }

    let mut record = payload;
    record.remove("id");
    record.remove("updatedAt");
    record.insert("composite".to_string(), Value::String(composite.clone()));
    record.insert("createdAt".to_string(), Value::String(now_ts()));
    let id = store
        .push_child(CLASS_SUBJECTS, Value::Object(record))
        .map_err(|e| EngineError::store(CLASS_SUBJECTS, e))?;
    Ok(CreateOutcome {
        id,
        existing: false,
        composite,
    })
}

/// Applies `patch` and refreshes the stored composite. A patch that would
/// collide with a different assignment is rejected without writing.
pub fn update(store: &dyn Store, id: &str, patch: Map<String, Value>) -> EngineResult<Value> {
    paths::require_segment(id, "assignmentId")?;
    let path = paths::class_subject(id);
    let prior = match store.get(&path).map_err(|e| EngineError::store(&path, e))? {
        Some(Value::Object(map)) => map,
        _ => return Err(EngineError::not_found("assignment", id)),
    };

    let mut patch = patch;
    for key in ["id", "composite", "createdAt"] {
        patch.remove(key);
    }
    let merged = tree::merge_object(&prior, &patch);
    require_links(&merged)?;

    let composite = compute_composite(&merged);
    if composite != text_field(&prior, "composite") {
        if let Some(other) = find_existing(store, &composite)? {
            if other != id {
                return Err(EngineError::DuplicateComposite {
                    composite,
                    existing_id: other,
                });
            }
        }
    }

    patch.insert("composite".to_string(), Value::String(composite));
    patch.insert("updatedAt".to_string(), Value::String(now_ts()));
    store
        .update(&path, patch.clone())
        .map_err(|e| EngineError::store(&path, e))?;
    Ok(with_id(id, Value::Object(tree::merge_object(&prior, &patch))))
}

pub fn delete(store: &dyn Store, id: &str) -> EngineResult<()> {
    paths::require_segment(id, "assignmentId")?;
    let path = paths::class_subject(id);
    if store
        .get(&path)
        .map_err(|e| EngineError::store(&path, e))?
        .is_none()
    {
        return Err(EngineError::not_found("assignment", id));
    }
    store.remove(&path).map_err(|e| EngineError::store(&path, e))
}

/// Every assignment, ordered by id (creation order for pushed ids).
pub fn list(store: &dyn Store) -> EngineResult<Vec<Value>> {
    let node = store
        .get(CLASS_SUBJECTS)
        .map_err(|e| EngineError::store(CLASS_SUBJECTS, e))?;
    Ok(children_with_ids(node))
}

pub fn list_by_class(store: &dyn Store, class_id: &str) -> EngineResult<Vec<Value>> {
    Ok(list(store)?
        .into_iter()
        .filter(|a| a.get("classId").and_then(|v| v.as_str()) == Some(class_id))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemStore, StoreCapabilities};
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    fn offering() -> Value {
        json!({
            "classId": "c1", "subjectId": "math", "teacherId": "t1",
            "year": "2025", "term": "Term 1", "schedule": "MWF 8:00"
        })
    }

    fn unindexed() -> MemStore {
        MemStore::with_capabilities(StoreCapabilities {
            atomic_writes: true,
            indexed_fields: Vec::new(),
        })
    }

    #[test]
    fn composite_uses_fixed_order_and_empty_for_missing() {
        assert_eq!(
            compute_composite(&obj(offering())),
            "c1|math|t1|2025|Term 1|MWF 8:00"
        );
        assert_eq!(
            compute_composite(&obj(json!({"subjectId": "s", "classId": "c"}))),
            "c|s||||"
        );
    }

    #[test]
    fn second_create_with_same_payload_returns_existing() {
        for store in [MemStore::new(), unindexed()] {
            let first = create_if_absent(&store, obj(offering())).expect("create");
            assert!(!first.existing);
            let writes = store.write_log().len();

            let second = create_if_absent(&store, obj(offering())).expect("create");
            assert!(second.existing);
            assert_eq!(second.id, first.id);
            assert_eq!(store.write_log().len(), writes, "no write on duplicate");
        }
    }

    #[test]
    fn changing_any_field_creates_a_new_record() {
        let store = MemStore::new();
        let base = create_if_absent(&store, obj(offering())).expect("create").id;
        for field in COMPOSITE_FIELDS {
            let mut payload = obj(offering());
            payload.insert(field.to_string(), json!("changed"));
            let out = create_if_absent(&store, payload).expect("create");
            assert!(!out.existing, "{field} should make a distinct offering");
            assert_ne!(out.id, base);
        }
        assert_eq!(list(&store).expect("list").len(), 7);
    }

    #[test]
    fn scan_fallback_recomputes_composites_of_legacy_records() {
        let store = MemStore::new();
        // Stored before composites existed: indexed query misses it.
        store
            .set("/class_subjects/legacy", offering())
            .expect("seed");
        let composite = compute_composite(&obj(offering()));
        assert_eq!(find_existing(&store, &composite).expect("find"), None);

        let scanning = unindexed();
        scanning
            .set("/class_subjects/legacy", offering())
            .expect("seed");
        assert_eq!(
            find_existing(&scanning, &composite).expect("find"),
            Some("legacy".to_string())
        );
    }

    #[test]
    fn create_requires_class_and_subject() {
        let store = MemStore::new();
        let err = create_if_absent(&store, obj(json!({"classId": "c1"}))).expect_err("invalid");
        assert_eq!(err.code(), "bad_params");
        assert!(store.write_log().is_empty());
    }

    #[test]
    fn update_refreshes_composite_and_rejects_collisions() {
        let store = MemStore::new();
        let a = create_if_absent(&store, obj(offering())).expect("create").id;
        let mut other = obj(offering());
        other.insert("schedule".into(), json!("TTh 9:00"));
        let b = create_if_absent(&store, other).expect("create").id;

        let err = update(&store, &b, obj(json!({"schedule": "MWF 8:00"}))).expect_err("collision");
        assert_eq!(err.code(), "duplicate_composite");

        let updated = update(&store, &b, obj(json!({"schedule": "F 13:00"}))).expect("update");
        assert_eq!(updated["composite"], json!("c1|math|t1|2025|Term 1|F 13:00"));
        assert_eq!(updated["id"], json!(b));

        let again = create_if_absent(&store, obj(offering())).expect("create");
        assert_eq!(again.id, a);
    }

    #[test]
    fn nested_assignment_ids_are_rejected() {
        let store = MemStore::new();
        let id = create_if_absent(&store, obj(offering())).expect("create").id;
        let nested = format!("{id}/classId");
        assert_eq!(
            update(&store, &nested, obj(json!({"subjectId": "x"}))).expect_err("update").code(),
            "bad_params"
        );
        assert_eq!(delete(&store, &nested).expect_err("delete").code(), "bad_params");
        assert_eq!(list_by_class(&store, "c1").expect("list").len(), 1);
    }

    #[test]
    fn delete_and_list_by_class() {
        let store = MemStore::new();
        let a = create_if_absent(&store, obj(offering())).expect("create").id;
        let mut other = obj(offering());
        other.insert("classId".into(), json!("c2"));
        create_if_absent(&store, other).expect("create");

        assert_eq!(list_by_class(&store, "c1").expect("list").len(), 1);
        delete(&store, &a).expect("delete");
        assert!(list_by_class(&store, "c1").expect("list").is_empty());
        assert_eq!(delete(&store, &a).expect_err("gone").code(), "not_found");
    }
}
