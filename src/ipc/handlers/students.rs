use crate::ipc::error::{engine_err, err, no_workspace, ok};
use crate::ipc::helpers::opt_str_param;
use crate::ipc::types::{AppState, Request};
use crate::lifecycle;
use serde_json::json;

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    let payload = req.params.as_object().cloned().unwrap_or_default();
    match lifecycle::create_student(store, payload) {
        Ok(id) => ok(&req.id, json!({ "studentId": id })),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_students_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    let student_id = opt_str_param(&req.params, "studentId").unwrap_or_default();
    match lifecycle::get_student(store, &student_id) {
        Ok(data) => ok(&req.id, json!({ "studentId": student_id, "data": data })),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    let student_id = opt_str_param(&req.params, "studentId").unwrap_or_default();
    match lifecycle::delete_student(store, &student_id) {
        Ok(()) => ok(&req.id, json!({ "studentId": student_id, "deleted": true })),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_students_enroll(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    let student_id = opt_str_param(&req.params, "studentId").unwrap_or_default();
    let class_id = opt_str_param(&req.params, "classId").unwrap_or_default();
    let status = opt_str_param(&req.params, "status");
    match lifecycle::enroll(store, &student_id, &class_id, status.as_deref()) {
        Ok(student) => ok(&req.id, json!({ "studentId": student_id, "data": student })),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_students_unenroll(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    let student_id = opt_str_param(&req.params, "studentId").unwrap_or_default();
    let class_id = opt_str_param(&req.params, "classId").unwrap_or_default();
    match lifecycle::unenroll(store, &student_id, &class_id) {
        Ok(student) => ok(&req.id, json!({ "studentId": student_id, "data": student })),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_students_transfer(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    let student_id = opt_str_param(&req.params, "studentId").unwrap_or_default();
    let from = opt_str_param(&req.params, "fromClassId").unwrap_or_default();
    let to = opt_str_param(&req.params, "toClassId").unwrap_or_default();
    match lifecycle::transfer(store, &student_id, &from, &to) {
        Ok(student) => ok(&req.id, json!({ "studentId": student_id, "data": student })),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_students_roster(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    let Some(class_id) = opt_str_param(&req.params, "classId") else {
        return err(&req.id, "bad_params", "missing classId", None);
    };
    match lifecycle::read_roster(store, &class_id) {
        Ok(ids) => ok(&req.id, json!({ "classId": class_id, "studentIds": ids })),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_students_moves(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    let student_id = opt_str_param(&req.params, "studentId").unwrap_or_default();
    match lifecycle::student_moves(store, &student_id) {
        Ok(moves) => ok(&req.id, json!({ "studentId": student_id, "moves": moves })),
        Err(e) => engine_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.create" => Some(handle_students_create(state, req)),
        "students.get" => Some(handle_students_get(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        "students.enroll" => Some(handle_students_enroll(state, req)),
        "students.unenroll" => Some(handle_students_unenroll(state, req)),
        "students.transfer" => Some(handle_students_transfer(state, req)),
        "students.roster" => Some(handle_students_roster(state, req)),
        "students.moves" => Some(handle_students_moves(state, req)),
        _ => None,
    }
}
