//! Canonical store paths shared by the index maintainer and lifecycle engine.

use crate::error::{EngineError, EngineResult};
use crate::store::is_segment;

pub const SCHOOL_YEAR_ROOT: &str = "/school-year";
pub const CLASS_SUBJECTS: &str = "/class_subjects";
pub const STUDENTS: &str = "/students";

pub fn class_subject(id: &str) -> String {
    format!("{CLASS_SUBJECTS}/{id}")
}

pub fn student(id: &str) -> String {
    format!("{STUDENTS}/{id}")
}

pub fn class_record(class_id: &str) -> String {
    format!("/classes/{class_id}")
}

pub fn class_roster(class_id: &str) -> String {
    format!("/class_rosters/{class_id}")
}

pub fn class_enrollment(school_year: &str, class_id: &str, student_id: &str) -> String {
    format!("/class_enrollments/{school_year}/{class_id}/{student_id}")
}

pub fn student_current(student_id: &str) -> String {
    format!("/student_current/{student_id}")
}

pub fn student_moves(student_id: &str) -> String {
    format!("/student_moves/{student_id}")
}

pub fn student_move(student_id: &str, move_id: &str) -> String {
    format!("/student_moves/{student_id}/{move_id}")
}

pub fn subject_enrollment(
    school_year: &str,
    term_key: &str,
    subject_id: &str,
    student_id: &str,
) -> String {
    format!("/subject_enrollments/{school_year}/{term_key}/{subject_id}/{student_id}")
}

/// Ids and year labels are spliced into paths, so each must be exactly one
/// segment. A `/` would address some other record.
pub fn require_segment(value: &str, name: &str) -> EngineResult<()> {
    if value.trim().is_empty() {
        return Err(EngineError::invalid(format!("missing {name}")));
    }
    if !is_segment(value) {
        return Err(EngineError::invalid(format!(
            "{name} is not a valid key: {value:?}"
        )));
    }
    Ok(())
}
