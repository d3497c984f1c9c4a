//! `subjects.*` and `classes.*`: year/term-scoped entities whose writes go
//! through the index maintainer.

use crate::index::{self, EntityKind};
use crate::ipc::error::{engine_err, err, no_workspace, ok};
use crate::ipc::helpers::{object_param, opt_str_param, str_param};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};

fn id_key(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Subject => "subjectId",
        EntityKind::Class => "classId",
    }
}

fn entity_id(kind: EntityKind, req: &Request) -> Option<String> {
    opt_str_param(&req.params, id_key(kind)).or_else(|| opt_str_param(&req.params, "id"))
}

fn handle_create(state: &mut AppState, req: &Request, kind: EntityKind) -> Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    let payload = match req.params.as_object() {
        Some(p) => p.clone(),
        None => return err(&req.id, "bad_params", "params must be an object", None),
    };
    match index::create(store, kind, payload) {
        Ok(created) => ok(&req.id, json!({ "id": created.id, "data": created.data })),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_update(state: &mut AppState, req: &Request, kind: EntityKind) -> Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    let Some(id) = entity_id(kind, req) else {
        return err(&req.id, "bad_params", format!("missing {}", id_key(kind)), None);
    };
    let Some(patch) = object_param(&req.params, "patch") else {
        return err(&req.id, "bad_params", "missing patch", None);
    };
    match index::update(store, kind, &id, patch) {
        Ok(data) => ok(&req.id, json!({ "id": id, "data": data })),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_delete(state: &mut AppState, req: &Request, kind: EntityKind) -> Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    let Some(id) = entity_id(kind, req) else {
        return err(&req.id, "bad_params", format!("missing {}", id_key(kind)), None);
    };
    match index::delete(store, kind, &id) {
        Ok(()) => ok(&req.id, json!({ "id": id, "deleted": true })),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_get(state: &mut AppState, req: &Request, kind: EntityKind) -> Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    let Some(id) = entity_id(kind, req) else {
        return err(&req.id, "bad_params", format!("missing {}", id_key(kind)), None);
    };
    match index::get(store, kind, &id) {
        Ok(data) => ok(&req.id, json!({ "id": id, "data": data })),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_list_by_year(state: &mut AppState, req: &Request, kind: EntityKind) -> Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    let school_year = match req.params.get("schoolYear") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return err(&req.id, "bad_params", "missing schoolYear", None),
    };
    let term = str_param(&req.params, "term");
    match index::list_by_year(store, kind, &school_year, term) {
        Ok(items) => ok(
            &req.id,
            json!({
                "schoolYear": crate::keys::normalize_school_year(&school_year),
                "term": term,
                "items": items,
            }),
        ),
        Err(e) => engine_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let (family, action) = req.method.split_once('.')?;
    let kind = match family {
        "subjects" => EntityKind::Subject,
        "classes" => EntityKind::Class,
        _ => return None,
    };
    match action {
        "create" => Some(handle_create(state, req, kind)),
        "update" => Some(handle_update(state, req, kind)),
        "delete" => Some(handle_delete(state, req, kind)),
        "get" => Some(handle_get(state, req, kind)),
        "listByYear" => Some(handle_list_by_year(state, req, kind)),
        _ => None,
    }
}
