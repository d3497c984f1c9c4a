use crate::config;
use crate::ipc::error::{err, no_workspace, ok};
use crate::ipc::helpers::{bool_param, str_param};
use crate::ipc::types::{AppState, Request};
use crate::store::{MemStore, SqliteStore, Store};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "backend": state.backend,
            "capabilities": state.store.as_deref().map(|s| s.capabilities()),
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let memory = bool_param(&req.params, "memory");
    let path = str_param(&req.params, "path").map(PathBuf::from);
    if !memory && path.is_none() {
        return err(&req.id, "bad_params", "missing params.path", None);
    }

    let cfg = match config::load_store_config(path.as_deref(), req.params.get("config")) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "bad_config", format!("{e:#}"), None),
    };
    let caps = cfg.capabilities();

    if memory {
        state.store = Some(Box::new(MemStore::with_capabilities(caps.clone())));
        state.workspace = None;
        state.backend = Some("memory");
        info!(atomic = caps.atomic_writes, "opened in-memory store");
        return ok(&req.id, json!({ "backend": "memory", "capabilities": caps }));
    }

    let Some(path) = path else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };
    match SqliteStore::open(&path, caps.clone()) {
        Ok(store) => {
            info!(workspace = %path.to_string_lossy(), atomic = caps.atomic_writes, "opened workspace store");
            state.store = Some(Box::new(store));
            state.workspace = Some(path.clone());
            state.backend = Some("sqlite");
            ok(
                &req.id,
                json!({
                    "workspacePath": path.to_string_lossy(),
                    "backend": "sqlite",
                    "capabilities": caps,
                }),
            )
        }
        Err(e) => err(&req.id, "store_unavailable", format!("{e:?}"), None),
    }
}

// Raw diagnostic read of any path.
fn handle_store_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    let Some(path) = str_param(&req.params, "path") else {
        return err(&req.id, "bad_params", "missing path", None);
    };
    match store.get(path) {
        Ok(value) => ok(&req.id, json!({ "path": path, "value": value })),
        Err(e) => err(&req.id, "store_read_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "store.get" => Some(handle_store_get(state, req)),
        _ => None,
    }
}
