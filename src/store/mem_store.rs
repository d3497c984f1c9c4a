use super::{
    join_path, new_push_id, split_path, tree, Store, StoreCapabilities, StoreError, StoreResult,
    WriteBatch,
};
use serde_json::{Map, Value};
use std::sync::{Mutex, MutexGuard};

/// In-memory JSON tree. Failpoints reject writes under a path prefix so the
/// engine's best-effort and partial-write paths can be exercised.
#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    root: Value,
    caps: StoreCapabilities,
    failpoints: Vec<String>,
    write_log: Vec<String>,
}

impl std::fmt::Debug for MemStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("MemStore")
            .field("caps", &inner.caps)
            .field("failpoints", &inner.failpoints)
            .field("writes", &inner.write_log.len())
            .finish()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self::with_capabilities(StoreCapabilities::default())
    }

    pub fn with_capabilities(caps: StoreCapabilities) -> Self {
        Self {
            inner: Mutex::new(Inner {
                root: Value::Object(Map::new()),
                caps,
                failpoints: Vec::new(),
                write_log: Vec::new(),
            }),
        }
    }

    /// Rejects every subsequent write whose path is `prefix` or lies below it.
    #[cfg(test)]
    pub fn fail_writes_under(&self, prefix: &str) {
        self.lock().failpoints.push(normalize(prefix));
    }

    #[cfg(test)]
    pub fn clear_failpoints(&self) {
        self.lock().failpoints.clear();
    }

    /// Paths of every accepted mutation, in order.
    #[cfg(test)]
    pub fn write_log(&self) -> Vec<String> {
        self.lock().write_log.clone()
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> Value {
        self.lock().root.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn normalize(path: &str) -> String {
    format!("/{}", path.trim_matches('/'))
}

impl Inner {
    fn check_writable(&self, path: &str) -> StoreResult<()> {
        let hit = self
            .failpoints
            .iter()
            .any(|fp| path == fp || fp == "/" || path.starts_with(&format!("{fp}/")));
        if hit {
            return Err(StoreError::Rejected {
                path: path.to_string(),
                message: "failpoint".to_string(),
            });
        }
        Ok(())
    }
}

impl Store for MemStore {
    fn get(&self, path: &str) -> StoreResult<Option<Value>> {
        let segs = split_path(path)?;
        let inner = self.lock();
        Ok(tree::get_at(&inner.root, &segs).cloned())
    }

    fn set(&self, path: &str, value: Value) -> StoreResult<()> {
        let segs = split_path(path)?;
        let canonical = join_path(&segs);
        let mut inner = self.lock();
        inner.check_writable(&canonical)?;
        tree::set_at(&mut inner.root, &segs, value);
        inner.write_log.push(canonical);
        Ok(())
    }

    fn update(&self, path: &str, partial: Map<String, Value>) -> StoreResult<()> {
        let segs = split_path(path)?;
        let canonical = join_path(&segs);
        let mut inner = self.lock();
        inner.check_writable(&canonical)?;
        tree::update_at(&mut inner.root, &segs, partial);
        inner.write_log.push(canonical);
        Ok(())
    }

    fn remove(&self, path: &str) -> StoreResult<()> {
        let segs = split_path(path)?;
        let canonical = join_path(&segs);
        let mut inner = self.lock();
        inner.check_writable(&canonical)?;
        tree::remove_at(&mut inner.root, &segs);
        inner.write_log.push(canonical);
        Ok(())
    }

    fn push_child(&self, path: &str, value: Value) -> StoreResult<String> {
        let id = new_push_id();
        let child = format!("{}/{}", path.trim_end_matches('/'), id);
        self.set(&child, value)?;
        Ok(id)
    }

    fn query_by_field(
        &self,
        path: &str,
        field: &str,
        value: &Value,
    ) -> StoreResult<Vec<(String, Value)>> {
        let segs = split_path(path)?;
        let inner = self.lock();
        if !inner.caps.is_indexed(field) {
            return Err(StoreError::QueryUnsupported {
                path: join_path(&segs),
                field: field.to_string(),
            });
        }
        let Some(Value::Object(children)) = tree::get_at(&inner.root, &segs) else {
            return Ok(Vec::new());
        };
        Ok(children
            .iter()
            .filter(|(_, child)| child.get(field) == Some(value))
            .map(|(id, child)| (id.clone(), child.clone()))
            .collect())
    }

    fn atomic_multi_update(&self, batch: &WriteBatch) -> StoreResult<()> {
        let mut inner = self.lock();
        if !inner.caps.atomic_writes {
            return Err(StoreError::AtomicUnsupported);
        }
        let mut staged = inner.root.clone();
        let mut touched = Vec::with_capacity(batch.len());
        for entry in batch.entries() {
            let segs = split_path(&entry.path)?;
            let canonical = join_path(&segs);
            inner.check_writable(&canonical)?;
            tree::set_at(&mut staged, &segs, entry.value.clone());
            touched.push(canonical);
        }
        inner.root = staged;
        inner.write_log.extend(touched);
        Ok(())
    }

    fn capabilities(&self) -> StoreCapabilities {
        self.lock().caps.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn interior_get_returns_subtree() {
        let store = MemStore::new();
        store.set("/subjects/a", json!({"name": "Math"})).expect("set");
        store.set("/subjects/b", json!({"name": "Art"})).expect("set");
        let all = store.get("/subjects").expect("get").expect("present");
        assert_eq!(all, json!({"a": {"name": "Math"}, "b": {"name": "Art"}}));
        assert_eq!(store.get("/subjects/c").expect("get"), None);
    }

    #[test]
    fn query_requires_indexed_field() {
        let store = MemStore::new();
        store
            .set("/class_subjects/x", json!({"composite": "c|s|t|||"}))
            .expect("set");
        let hits = store
            .query_by_field("/class_subjects", "composite", &json!("c|s|t|||"))
            .expect("query");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "x");

        let err = store
            .query_by_field("/class_subjects", "classId", &json!("c"))
            .expect_err("unindexed");
        assert!(matches!(err, StoreError::QueryUnsupported { .. }));
    }

    #[test]
    fn atomic_update_is_all_or_nothing() {
        let store = MemStore::new();
        store.fail_writes_under("/student_moves");
        let mut batch = WriteBatch::new();
        batch.put("/student_current/s1", json!({"classId": "B"}));
        batch.put("/student_moves/s1/m1", json!({"toClassId": "B"}));
        assert!(store.atomic_multi_update(&batch).is_err());
        assert_eq!(store.get("/student_current/s1").expect("get"), None);

        store.clear_failpoints();
        store.atomic_multi_update(&batch).expect("commit");
        assert_eq!(
            store.get("/student_moves/s1/m1").expect("get"),
            Some(json!({"toClassId": "B"}))
        );
    }

    #[test]
    fn atomic_update_refused_without_capability() {
        let store = MemStore::with_capabilities(StoreCapabilities {
            atomic_writes: false,
            indexed_fields: Vec::new(),
        });
        let mut batch = WriteBatch::new();
        batch.put("/a", json!(1));
        assert!(matches!(
            store.atomic_multi_update(&batch),
            Err(StoreError::AtomicUnsupported)
        ));
    }

    #[test]
    fn failpoints_match_whole_segments() {
        let store = MemStore::new();
        store.fail_writes_under("/subjects_by_year");
        assert!(store.set("/subjects/a", json!({"n": 1})).is_ok());
        assert!(store.set("/subjects_by_year/SY-2025-2026/a", json!({"n": 1})).is_err());
        assert_eq!(store.write_log(), vec!["/subjects/a".to_string()]);
    }
}
