use crate::dedup;
use crate::ipc::error::{engine_err, err, no_workspace, ok};
use crate::ipc::helpers::{object_param, opt_str_param};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_assignments_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    let payload = match req.params.as_object() {
        Some(p) => p.clone(),
        None => return err(&req.id, "bad_params", "params must be an object", None),
    };
    match dedup::create_if_absent(store, payload) {
        Ok(out) => ok(
            &req.id,
            json!({ "id": out.id, "existing": out.existing, "composite": out.composite }),
        ),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_assignments_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    let Some(id) = opt_str_param(&req.params, "assignmentId") else {
        return err(&req.id, "bad_params", "missing assignmentId", None);
    };
    let Some(patch) = object_param(&req.params, "patch") else {
        return err(&req.id, "bad_params", "missing patch", None);
    };
    match dedup::update(store, &id, patch) {
        Ok(data) => ok(&req.id, json!({ "id": id, "data": data })),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_assignments_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    let Some(id) = opt_str_param(&req.params, "assignmentId") else {
        return err(&req.id, "bad_params", "missing assignmentId", None);
    };
    match dedup::delete(store, &id) {
        Ok(()) => ok(&req.id, json!({ "id": id, "deleted": true })),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_assignments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    match dedup::list(store) {
        Ok(assignments) => ok(&req.id, json!({ "assignments": assignments })),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_assignments_list_by_class(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    let Some(class_id) = opt_str_param(&req.params, "classId") else {
        return err(&req.id, "bad_params", "missing classId", None);
    };
    match dedup::list_by_class(store, &class_id) {
        Ok(assignments) => ok(&req.id, json!({ "classId": class_id, "assignments": assignments })),
        Err(e) => engine_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assignments.create" => Some(handle_assignments_create(state, req)),
        "assignments.update" => Some(handle_assignments_update(state, req)),
        "assignments.delete" => Some(handle_assignments_delete(state, req)),
        "assignments.list" => Some(handle_assignments_list(state, req)),
        "assignments.listByClass" => Some(handle_assignments_list_by_class(state, req)),
        _ => None,
    }
}
