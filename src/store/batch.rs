use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered path -> value map for multi-path writes. Insertion order is the
/// order the sequential fallback applies writes in; re-putting a path replaces
/// its value without moving it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WriteBatch {
    entries: Vec<BatchEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub path: String,
    pub value: Value,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, path: impl Into<String>, value: Value) {
        let path = path.into();
        match self.entries.iter_mut().find(|e| e.path == path) {
            Some(existing) => existing.value = value,
            None => self.entries.push(BatchEntry { path, value }),
        }
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.entries.iter().find(|e| e.path == path).map(|e| &e.value)
    }

    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    pub fn paths(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.path.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
