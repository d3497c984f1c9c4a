//! Hierarchical key-value store client plus in-memory and SQLite backends.
//!
//! Paths are slash-delimited (`/subjects/abc`). Every path holds a JSON value;
//! interior paths read back as the assembled subtree. Writes are last-write-wins
//! per path. `atomic_multi_update` is the only cross-path all-or-nothing
//! primitive, and only when [`StoreCapabilities::atomic_writes`] is set.

mod batch;
mod mem_store;
mod sqlite_store;
pub mod tree;

pub use batch::{BatchEntry, WriteBatch};
pub use mem_store::MemStore;
pub use sqlite_store::SqliteStore;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub type StoreResult<T> = Result<T, StoreError>;

pub trait Store {
    fn get(&self, path: &str) -> StoreResult<Option<Value>>;
    /// Replaces the value at `path`. `null` or an empty object removes it.
    fn set(&self, path: &str, value: Value) -> StoreResult<()>;
    /// Shallow merge: each key in `partial` replaces that child; `null` deletes it.
    fn update(&self, path: &str, partial: Map<String, Value>) -> StoreResult<()>;
    fn remove(&self, path: &str) -> StoreResult<()>;
    /// Writes `value` under a freshly generated child id and returns the id.
    fn push_child(&self, path: &str, value: Value) -> StoreResult<String>;
    /// Children of `path` whose `field` equals `value`. Fails with
    /// [`StoreError::QueryUnsupported`] when the field is not indexed.
    fn query_by_field(
        &self,
        path: &str,
        field: &str,
        value: &Value,
    ) -> StoreResult<Vec<(String, Value)>>;
    /// Sets every path in the batch, all or nothing.
    fn atomic_multi_update(&self, batch: &WriteBatch) -> StoreResult<()>;
    fn capabilities(&self) -> StoreCapabilities;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreCapabilities {
    pub atomic_writes: bool,
    pub indexed_fields: Vec<String>,
}

impl Default for StoreCapabilities {
    fn default() -> Self {
        Self {
            atomic_writes: true,
            indexed_fields: vec!["composite".to_string()],
        }
    }
}

impl StoreCapabilities {
    pub fn is_indexed(&self, field: &str) -> bool {
        self.indexed_fields.iter().any(|f| f == field)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("field '{field}' is not indexed under {path}")]
    QueryUnsupported { path: String, field: String },
    #[error("multi-path atomic update is not supported by this store")]
    AtomicUnsupported,
    #[error("write rejected at {path}: {message}")]
    Rejected { path: String, message: String },
    #[error("invalid path '{0}'")]
    InvalidPath(String),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// The path the store refused, when the error names one.
    pub fn path(&self) -> Option<&str> {
        match self {
            StoreError::Rejected { path, .. } | StoreError::QueryUnsupported { path, .. } => {
                Some(path.as_str())
            }
            StoreError::InvalidPath(path) => Some(path.as_str()),
            _ => None,
        }
    }
}

/// Splits a path into segments. Empty segments (`//`) are rejected; the root
/// (`""` or `"/"`) yields no segments.
pub fn split_path(path: &str) -> StoreResult<Vec<&str>> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let segs: Vec<&str> = trimmed.split('/').collect();
    if !segs.iter().all(|s| is_segment(s)) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(segs)
}

/// True when `s` can stand as exactly one path segment.
pub fn is_segment(s: &str) -> bool {
    !s.is_empty() && !s.contains(['/', '.', '#', '$', '[', ']'])
}

pub fn join_path(segs: &[&str]) -> String {
    format!("/{}", segs.join("/"))
}

/// Time-ordered child id: 12 hex digits of epoch millis, then 8 random hex digits.
pub fn new_push_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{:012x}{}", millis, &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_path_handles_root_and_slashes() {
        assert!(split_path("/").expect("root").is_empty());
        assert!(split_path("").expect("root").is_empty());
        assert_eq!(
            split_path("/school-year/SY-2025-2026/full_year/subjects").expect("split"),
            vec!["school-year", "SY-2025-2026", "full_year", "subjects"]
        );
        assert_eq!(split_path("students/s1/").expect("split"), vec!["students", "s1"]);
    }

    #[test]
    fn segment_check_matches_split_path() {
        for ok in ["SY-2025-2026", "full_year", "0190a1b2c3d4e5f6a7b8", "next year"] {
            assert!(is_segment(ok), "{ok}");
            assert_eq!(split_path(ok).expect("split").len(), 1);
        }
        for bad in ["", "2025/26", "2025.5", "a#b", "$x", "[0]"] {
            assert!(!is_segment(bad), "{bad}");
        }
    }

    #[test]
    fn split_path_rejects_bad_segments() {
        assert!(split_path("/a//b").is_err());
        assert!(split_path("/a/b.c").is_err());
        assert!(split_path("/a/$b").is_err());
    }

    #[test]
    fn push_ids_sort_by_creation_time() {
        let a = new_push_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = new_push_id();
        assert_eq!(a.len(), 20);
        assert!(a < b);
    }
}
