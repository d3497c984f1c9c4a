//! Student lifecycle: enroll, unenroll, transfer and promote.
//!
//! Roster and membership edits are read-modify-write sequences without store
//! locking; they are safe to repeat with the same arguments but rely on the
//! sidecar serving one request at a time.

use crate::dedup;
use crate::error::{EngineError, EngineResult};
use crate::keys::{normalize_school_year, term_key_or_default};
use crate::paths;
use crate::records::{
    children_with_ids, now_ts, opt_text_field, with_id, EnrollmentRecord, EnrollmentStatus,
    MoveAuditRecord, StudentCurrentPointer, StudentRecord, SubjectEnrollmentRecord,
};
use crate::store::{is_segment, new_push_id, Store, StoreError, WriteBatch};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

pub const DEFAULT_STUDENT_STATUS: &str = "active";
pub const DEFAULT_MOVE_REASON: &str = "promotion";

fn require(value: &str, name: &str) -> EngineResult<()> {
    if value.trim().is_empty() {
        return Err(EngineError::invalid(format!("missing {name}")));
    }
    Ok(())
}

fn read_student(store: &dyn Store, student_id: &str) -> EngineResult<StudentRecord> {
    let path = paths::student(student_id);
    match store.get(&path).map_err(|e| EngineError::store(&path, e))? {
        Some(v @ Value::Object(_)) => serde_json::from_value(v).map_err(|e| {
            EngineError::store(&path, StoreError::Json(e))
        }),
        _ => Err(EngineError::not_found("student", student_id)),
    }
}

fn ensure_class(store: &dyn Store, class_id: &str) -> EngineResult<()> {
    let path = paths::class_record(class_id);
    match store.get(&path).map_err(|e| EngineError::store(&path, e))? {
        Some(_) => Ok(()),
        None => Err(EngineError::not_found("class", class_id)),
    }
}

pub fn read_roster(store: &dyn Store, class_id: &str) -> EngineResult<Vec<String>> {
    paths::require_segment(class_id, "classId")?;
    let path = paths::class_roster(class_id);
    let node = store.get(&path).map_err(|e| EngineError::store(&path, e))?;
    Ok(match node {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    })
}

fn write_roster(store: &dyn Store, class_id: &str, roster: Vec<String>) -> EngineResult<()> {
    let path = paths::class_roster(class_id);
    store
        .set(&path, json!(roster))
        .map_err(|e| EngineError::store(&path, e))
}

fn write_membership(
    store: &dyn Store,
    student_id: &str,
    class_id: Option<&str>,
    student: &StudentRecord,
    status: Option<&str>,
) -> EngineResult<()> {
    let mut partial = Map::new();
    partial.insert("classId".into(), json!(class_id));
    partial.insert("classes".into(), json!(student.classes));
    if let Some(status) = status {
        partial.insert("status".into(), json!(status));
    }
    partial.insert("updatedAt".into(), json!(now_ts()));
    let path = paths::student(student_id);
    store
        .update(&path, partial)
        .map_err(|e| EngineError::store(&path, e))
}

pub fn create_student(store: &dyn Store, payload: Map<String, Value>) -> EngineResult<String> {
    let mut record = payload;
    for key in ["id", "classId", "classes", "updatedAt"] {
        record.remove(key);
    }
    if opt_text_field(&record, "status").is_none() {
        record.insert("status".into(), json!(DEFAULT_STUDENT_STATUS));
    }
    record.insert("classes".into(), json!([]));
    record.insert("createdAt".into(), json!(now_ts()));
    store
        .push_child(paths::STUDENTS, Value::Object(record))
        .map_err(|e| EngineError::store(paths::STUDENTS, e))
}

pub fn get_student(store: &dyn Store, student_id: &str) -> EngineResult<Value> {
    paths::require_segment(student_id, "studentId")?;
    let path = paths::student(student_id);
    match store.get(&path).map_err(|e| EngineError::store(&path, e))? {
        Some(record) => Ok(with_id(student_id, record)),
        None => Err(EngineError::not_found("student", student_id)),
    }
}

/// Drops the student from every roster it belongs to, then its current
/// pointer, then the record. Enrollment history and move audit stay.
pub fn delete_student(store: &dyn Store, student_id: &str) -> EngineResult<()> {
    paths::require_segment(student_id, "studentId")?;
    let student = read_student(store, student_id)?;
    for class_id in &student.classes {
        let roster = read_roster(store, class_id)?;
        if roster.iter().any(|s| s == student_id) {
            write_roster(
                store,
                class_id,
                roster.into_iter().filter(|s| s != student_id).collect(),
            )?;
        }
    }
    for path in [paths::student_current(student_id), paths::student(student_id)] {
        store
            .remove(&path)
            .map_err(|e| EngineError::store(&path, e))?;
    }
    Ok(())
}

pub fn enroll(
    store: &dyn Store,
    student_id: &str,
    class_id: &str,
    status: Option<&str>,
) -> EngineResult<StudentRecord> {
    paths::require_segment(student_id, "studentId")?;
    paths::require_segment(class_id, "classId")?;
    let mut student = read_student(store, student_id)?;
    ensure_class(store, class_id)?;

    student.classes.insert(class_id.to_string());
    let status = status
        .map(str::to_string)
        .or_else(|| student.status.clone())
        .unwrap_or_else(|| DEFAULT_STUDENT_STATUS.to_string());
    write_membership(store, student_id, Some(class_id), &student, Some(&status))?;

    let mut roster = read_roster(store, class_id)?;
    if !roster.iter().any(|s| s == student_id) {
        roster.push(student_id.to_string());
        write_roster(store, class_id, roster)?;
    }

    student.class_id = Some(class_id.to_string());
    student.status = Some(status);
    Ok(student)
}

pub fn unenroll(store: &dyn Store, student_id: &str, class_id: &str) -> EngineResult<StudentRecord> {
    paths::require_segment(student_id, "studentId")?;
    paths::require_segment(class_id, "classId")?;
    let mut student = read_student(store, student_id)?;

    student.classes.remove(class_id);
    if student.class_id.as_deref() == Some(class_id) {
        student.class_id = None;
    }
    write_membership(store, student_id, student.class_id.as_deref(), &student, None)?;

    let roster = read_roster(store, class_id)?;
    if roster.iter().any(|s| s == student_id) {
        write_roster(
            store,
            class_id,
            roster.into_iter().filter(|s| s != student_id).collect(),
        )?;
    }
    Ok(student)
}

/// Unenroll from `from_class_id`, then enroll into `to_class_id` with the
/// student's previous status. The destination is checked first so a missing
/// class never leaves the student in neither roster.
pub fn transfer(
    store: &dyn Store,
    student_id: &str,
    from_class_id: &str,
    to_class_id: &str,
) -> EngineResult<StudentRecord> {
    paths::require_segment(student_id, "studentId")?;
    paths::require_segment(from_class_id, "fromClassId")?;
    paths::require_segment(to_class_id, "toClassId")?;
    let previous = read_student(store, student_id)?;
    ensure_class(store, to_class_id)?;

    unenroll(store, student_id, from_class_id)?;
    enroll(store, student_id, to_class_id, previous.status.as_deref())
}

#[derive(Debug, Clone, Default)]
pub struct PromoteRequest {
    pub student_id: String,
    pub from_school_year_id: Option<String>,
    pub from_class_id: Option<String>,
    pub to_school_year_id: String,
    pub to_class_id: String,
    pub actor_uid: String,
    pub reason: Option<String>,
    pub auto_enroll_subjects: bool,
    /// Reuse an audit id when retrying a promotion that reported `Partial`.
    pub move_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoteOutcome {
    pub move_id: String,
    pub atomic: bool,
    pub subject_enrollments: usize,
    pub writes: WriteBatch,
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Collects every path the promotion touches, in application order.
fn promotion_batch(
    store: &dyn Store,
    req: &PromoteRequest,
    move_id: &str,
    now: &str,
) -> EngineResult<(WriteBatch, usize)> {
    let sid = req.student_id.as_str();
    let to_sy = normalize_school_year(&req.to_school_year_id);
    let from_sy = non_empty(&req.from_school_year_id).map(normalize_school_year);
    let from_class = non_empty(&req.from_class_id);
    let mut batch = WriteBatch::new();

    if let (Some(from_sy), Some(from_class)) = (from_sy.as_deref(), from_class) {
        let base = paths::class_enrollment(from_sy, from_class, sid);
        batch.put(format!("{base}/status"), json!(EnrollmentStatus::Moved));
        batch.put(format!("{base}/movedAt"), json!(now));
    }

    let enrolled = EnrollmentRecord {
        status: EnrollmentStatus::Enrolled,
        enrolled_at: Some(now.to_string()),
        moved_at: None,
    };
    batch.put(
        paths::class_enrollment(&to_sy, &req.to_class_id, sid),
        json!(enrolled),
    );

    let current = StudentCurrentPointer {
        school_year_id: to_sy.clone(),
        class_id: req.to_class_id.clone(),
        updated_at: now.to_string(),
    };
    batch.put(paths::student_current(sid), json!(current));

    let audit = MoveAuditRecord {
        ts: now.to_string(),
        from_school_year_id: from_sy.clone(),
        from_class_id: from_class.map(str::to_string),
        to_school_year_id: to_sy.clone(),
        to_class_id: req.to_class_id.clone(),
        reason: non_empty(&req.reason)
            .unwrap_or(DEFAULT_MOVE_REASON)
            .to_string(),
        actor_uid: req.actor_uid.clone(),
    };
    batch.put(paths::student_move(sid, move_id), json!(audit));

    let mut subject_enrollments = 0;
    if req.auto_enroll_subjects {
        for offering in dedup::list_by_class(store, &req.to_class_id)? {
            let Value::Object(offering) = offering else {
                continue;
            };
            if let Some(sy) = opt_text_field(&offering, "schoolYearId") {
                if normalize_school_year(&sy) != to_sy {
                    continue;
                }
            }
            let Some(subject_id) = opt_text_field(&offering, "subjectId") else {
                continue;
            };
            if !is_segment(&subject_id) {
                warn!(subject_id = %subject_id, "skipping offering with unusable subject id");
                continue;
            }
            let term = opt_text_field(&offering, "term");
            let record = SubjectEnrollmentRecord {
                enrolled_at: now.to_string(),
                class_subject_id: opt_text_field(&offering, "id").unwrap_or_default(),
                class_id: req.to_class_id.clone(),
            };
            batch.put(
                paths::subject_enrollment(
                    &to_sy,
                    &term_key_or_default(term.as_deref()),
                    &subject_id,
                    sid,
                ),
                json!(record),
            );
            subject_enrollments += 1;
        }
    }

    Ok((batch, subject_enrollments))
}

/// Commits `batch` atomically when the store can, otherwise path by path in
/// order. A sequential failure reports `Partial` with the committed prefix and
/// the full batch so the caller can resubmit it unchanged.
pub fn apply_batch(store: &dyn Store, batch: &WriteBatch) -> EngineResult<bool> {
    if store.capabilities().atomic_writes {
        match store.atomic_multi_update(batch) {
            Ok(()) => return Ok(true),
            Err(StoreError::AtomicUnsupported) => {}
            Err(e) => {
                let path = e
                    .path()
                    .map(str::to_string)
                    .or_else(|| batch.paths().into_iter().next())
                    .unwrap_or_default();
                return Err(EngineError::store(path, e));
            }
        }
    }

    info!(writes = batch.len(), "applying multi-path write sequentially");
    let mut applied = Vec::with_capacity(batch.len());
    for (step, entry) in batch.entries().iter().enumerate() {
        if let Err(e) = store.set(&entry.path, entry.value.clone()) {
            warn!(step, path = %entry.path, error = %e, "sequential write failed");
            if applied.is_empty() {
                return Err(EngineError::store(&entry.path, e));
            }
            return Err(EngineError::Partial {
                failed_step: step,
                total: batch.len(),
                failed_path: entry.path.clone(),
                message: e.to_string(),
                applied,
                writes: batch.clone(),
            });
        }
        applied.push(entry.path.clone());
    }
    Ok(false)
}

pub fn promote(store: &dyn Store, req: &PromoteRequest) -> EngineResult<PromoteOutcome> {
    paths::require_segment(&req.student_id, "studentId")?;
    require(&req.to_school_year_id, "toSchoolYearId")?;
    paths::require_segment(&req.to_class_id, "toClassId")?;
    require(&req.actor_uid, "actorUid")?;
    if non_empty(&req.from_school_year_id).is_some() != non_empty(&req.from_class_id).is_some() {
        return Err(EngineError::invalid(
            "fromSchoolYearId and fromClassId must be given together",
        ));
    }
    paths::require_segment(&normalize_school_year(&req.to_school_year_id), "toSchoolYearId")?;
    if let (Some(from_sy), Some(from_class)) =
        (non_empty(&req.from_school_year_id), non_empty(&req.from_class_id))
    {
        paths::require_segment(&normalize_school_year(from_sy), "fromSchoolYearId")?;
        paths::require_segment(from_class, "fromClassId")?;
    }
    if let Some(move_id) = non_empty(&req.move_id) {
        paths::require_segment(move_id, "moveId")?;
    }
    read_student(store, &req.student_id)?;

    let move_id = non_empty(&req.move_id)
        .map(str::to_string)
        .unwrap_or_else(new_push_id);
    let now = now_ts();
    let (writes, subject_enrollments) = promotion_batch(store, req, &move_id, &now)?;
    let atomic = apply_batch(store, &writes)?;

    Ok(PromoteOutcome {
        move_id,
        atomic,
        subject_enrollments,
        writes,
    })
}

/// Move audit records for a student, oldest first.
pub fn student_moves(store: &dyn Store, student_id: &str) -> EngineResult<Vec<Value>> {
    paths::require_segment(student_id, "studentId")?;
    let path = paths::student_moves(student_id);
    let node = store.get(&path).map_err(|e| EngineError::store(&path, e))?;
    Ok(children_with_ids(node))
}
