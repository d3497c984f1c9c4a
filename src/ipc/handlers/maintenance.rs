use crate::index::{self, EntityKind};
use crate::ipc::error::{engine_err, err, no_workspace, ok};
use crate::ipc::helpers::str_param;
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map};
use tracing::info;

fn handle_index_reconcile(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    let kinds = match str_param(&req.params, "entity") {
        Some(raw) => match EntityKind::parse(raw) {
            Some(kind) => vec![kind],
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("unknown entity: {raw}"),
                    Some(json!({ "allowed": ["subjects", "classes"] })),
                )
            }
        },
        None => vec![EntityKind::Subject, EntityKind::Class],
    };

    let mut reports = Map::new();
    for kind in kinds {
        match index::reconcile(store, kind) {
            Ok(report) => {
                info!(
                    entity = kind.collection(),
                    scanned = report.scanned,
                    written = report.written,
                    removed = report.removed,
                    "index reconciled"
                );
                reports.insert(kind.collection().to_string(), json!(report));
            }
            Err(e) => return engine_err(&req.id, &e),
        }
    }
    ok(&req.id, json!({ "reports": reports }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "index.reconcile" => Some(handle_index_reconcile(state, req)),
        _ => None,
    }
}
