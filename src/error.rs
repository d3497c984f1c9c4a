use crate::store::{StoreError, WriteBatch};
use serde_json::json;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0}")]
    InvalidArguments(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("write failed at {path}: {source}")]
    PersistFailed {
        path: String,
        #[source]
        source: StoreError,
    },
    #[error("composite '{composite}' already belongs to assignment {existing_id}")]
    DuplicateComposite {
        composite: String,
        existing_id: String,
    },
    #[error("step {failed_step} of {total} failed at {failed_path}: {message}")]
    Partial {
        failed_step: usize,
        total: usize,
        failed_path: String,
        message: String,
        applied: Vec<String>,
        writes: WriteBatch,
    },
}

impl EngineError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        EngineError::InvalidArguments(msg.into())
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Maps a store failure at `path` onto the engine taxonomy.
    pub fn store(path: impl Into<String>, source: StoreError) -> Self {
        match source {
            StoreError::Unavailable(msg) => EngineError::StoreUnavailable(msg),
            source => EngineError::PersistFailed {
                path: path.into(),
                source,
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidArguments(_) => "bad_params",
            EngineError::StoreUnavailable(_) => "store_unavailable",
            EngineError::NotFound { .. } => "not_found",
            EngineError::PersistFailed { .. } => "persist_failed",
            EngineError::DuplicateComposite { .. } => "duplicate_composite",
            EngineError::Partial { .. } => "partial",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            EngineError::NotFound { kind, id } => Some(json!({ "kind": kind, "id": id })),
            EngineError::PersistFailed { path, .. } => Some(json!({ "path": path })),
            EngineError::DuplicateComposite {
                composite,
                existing_id,
            } => Some(json!({ "composite": composite, "existingId": existing_id })),
            EngineError::Partial {
                failed_step,
                failed_path,
                applied,
                writes,
                ..
            } => Some(json!({
                "failedStep": failed_step,
                "failedPath": failed_path,
                "applied": applied,
                "writes": writes,
            })),
            _ => None,
        }
    }
}
