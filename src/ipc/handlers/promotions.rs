use crate::ipc::error::{engine_err, err, no_workspace, ok};
use crate::ipc::helpers::{bool_param, opt_str_param};
use crate::ipc::types::{AppState, Request};
use crate::lifecycle::{self, PromoteRequest};
use crate::store::WriteBatch;
use serde_json::json;

fn parse_promote(params: &serde_json::Value) -> PromoteRequest {
    PromoteRequest {
        student_id: opt_str_param(params, "studentId").unwrap_or_default(),
        from_school_year_id: opt_str_param(params, "fromSchoolYearId"),
        from_class_id: opt_str_param(params, "fromClassId"),
        to_school_year_id: opt_str_param(params, "toSchoolYearId").unwrap_or_default(),
        to_class_id: opt_str_param(params, "toClassId").unwrap_or_default(),
        actor_uid: opt_str_param(params, "actorUid").unwrap_or_default(),
        reason: opt_str_param(params, "reason"),
        auto_enroll_subjects: bool_param(params, "autoEnrollSubjects"),
        move_id: opt_str_param(params, "moveId"),
    }
}

fn handle_students_promote(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    let promote = parse_promote(&req.params);
    match lifecycle::promote(store, &promote) {
        Ok(out) => ok(&req.id, json!(out)),
        Err(e) => engine_err(&req.id, &e),
    }
}

// Resubmits the `writes` list from a `partial` error unchanged.
fn handle_students_promote_resume(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    let Some(raw) = req.params.get("writes") else {
        return err(&req.id, "bad_params", "missing writes", None);
    };
    let writes: WriteBatch = match serde_json::from_value(raw.clone()) {
        Ok(w) => w,
        Err(e) => return err(&req.id, "bad_params", format!("invalid writes: {e}"), None),
    };
    if writes.is_empty() {
        return err(&req.id, "bad_params", "writes must not be empty", None);
    }
    match lifecycle::apply_batch(store, &writes) {
        Ok(atomic) => ok(&req.id, json!({ "atomic": atomic, "applied": writes.paths() })),
        Err(e) => engine_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.promote" => Some(handle_students_promote(state, req)),
        "students.promote.resume" => Some(handle_students_promote_resume(state, req)),
        _ => None,
    }
}
