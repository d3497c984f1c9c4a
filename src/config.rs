use crate::store::StoreCapabilities;
use anyhow::Context;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "rosterd.json";
pub const LOG_ENV: &str = "ROSTERD_LOG";
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    pub atomic_writes: bool,
    pub indexed_fields: Vec<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let caps = StoreCapabilities::default();
        Self {
            atomic_writes: caps.atomic_writes,
            indexed_fields: caps.indexed_fields,
        }
    }
}

impl StoreConfig {
    pub fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            atomic_writes: self.atomic_writes,
            indexed_fields: self.indexed_fields.clone(),
        }
    }
}

/// Defaults, then `<workspace>/rosterd.json` if present, then `overrides`
/// (the `config` object of `workspace.select`). Later layers win per key.
pub fn load_store_config(
    workspace: Option<&Path>,
    overrides: Option<&Value>,
) -> anyhow::Result<StoreConfig> {
    let mut merged = Map::new();

    if let Some(dir) = workspace {
        let file = dir.join(CONFIG_FILE_NAME);
        if file.is_file() {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.to_string_lossy()))?;
            let v: Value = serde_json::from_str(&text)
                .with_context(|| format!("{} is invalid JSON", file.to_string_lossy()))?;
            if let Value::Object(map) = v {
                merged.extend(map);
            }
        }
    }
    if let Some(Value::Object(map)) = overrides {
        merged.extend(map.clone());
    }

    serde_json::from_value(Value::Object(merged)).context("invalid store config")
}
