//! Keeps the year- and term-scoped mirrors of subjects and classes in step
//! with their primary records.
//!
//! For an entity with a school year `sy` and term key `t`, three mirrors exist
//! next to the primary `/{collection}/{id}`:
//!
//! - `/{collection}_by_year/{sy}/{id}`: reduced projection
//! - `/school-year/{sy}/{t}/{collection}/{id}`: full record
//! - `/school-year/{sy}/{t}/{collection}_by_year/{id}`: reduced projection
//!
//! The primary record is authoritative. Mirror writes and stale-mirror removals
//! during create/update are best-effort: failures are logged and the primary
//! write's outcome is what the caller sees. [`reconcile`] repairs any drift.

use crate::error::{EngineError, EngineResult};
use crate::keys::{normalize_school_year, term_key_or_default};
use crate::paths::{self, SCHOOL_YEAR_ROOT};
use crate::records::{children_with_ids, now_ts, opt_text_field, text_field, with_id};
use crate::store::{is_segment, new_push_id, tree, Store};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Subject,
    Class,
}

impl EntityKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "subject" | "subjects" => Some(EntityKind::Subject),
            "class" | "classes" => Some(EntityKind::Class),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Subject => "subject",
            EntityKind::Class => "class",
        }
    }

    pub fn collection(self) -> &'static str {
        match self {
            EntityKind::Subject => "subjects",
            EntityKind::Class => "classes",
        }
    }

    pub fn by_year(self) -> &'static str {
        match self {
            EntityKind::Subject => "subjects_by_year",
            EntityKind::Class => "classes_by_year",
        }
    }

    fn required_fields(self) -> &'static [&'static str] {
        match self {
            EntityKind::Subject => &["code", "name"],
            EntityKind::Class => &["name"],
        }
    }

    fn display_fields(self) -> &'static [&'static str] {
        match self {
            EntityKind::Subject => &["code", "name", "grade", "status"],
            EntityKind::Class => &["name", "gradeLevel", "section", "advisorId"],
        }
    }

    pub fn primary_path(self, id: &str) -> String {
        format!("/{}/{}", self.collection(), id)
    }

    pub fn flat_path(self, sy: &str, id: &str) -> String {
        format!("/{}/{}/{}", self.by_year(), sy, id)
    }

    pub fn nested_path(self, scope: &Scope, id: &str) -> String {
        format!(
            "{SCHOOL_YEAR_ROOT}/{}/{}/{}/{}",
            scope.school_year,
            scope.term_key,
            self.collection(),
            id
        )
    }

    pub fn nested_projection_path(self, scope: &Scope, id: &str) -> String {
        format!(
            "{SCHOOL_YEAR_ROOT}/{}/{}/{}/{}",
            scope.school_year,
            scope.term_key,
            self.by_year(),
            id
        )
    }
}

/// Normalized year/term placement of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub school_year: String,
    pub term_key: String,
}

/// `None` when the record has no year, or when its year label cannot be a
/// single path segment (a raw passthrough such as `2025/26`). Such records
/// keep the label on the primary but get no mirrors.
pub fn scope_of(record: &Map<String, Value>) -> Option<Scope> {
    let school_year = normalize_school_year(&text_field(record, "schoolYear"));
    if !is_segment(&school_year) {
        return None;
    }
    let term = opt_text_field(record, "term");
    Some(Scope {
        school_year,
        term_key: term_key_or_default(term.as_deref()),
    })
}

fn projection(kind: EntityKind, id: &str, record: &Map<String, Value>) -> Value {
    let mut out = Map::new();
    out.insert("id".to_string(), Value::String(id.to_string()));
    for field in kind.display_fields() {
        if let Some(v) = record.get(*field) {
            out.insert(field.to_string(), v.clone());
        }
    }
    let ts = record
        .get("updatedAt")
        .or_else(|| record.get("createdAt"))
        .cloned();
    if let Some(ts) = ts {
        out.insert("updatedAt".to_string(), ts);
    }
    Value::Object(out)
}

fn full_record(id: &str, record: &Map<String, Value>) -> Value {
    with_id(id, Value::Object(record.clone()))
}

// Year labels are stored normalized so mirrors and the primary agree.
fn normalize_year_field(record: &mut Map<String, Value>) {
    if !record.contains_key("schoolYear") {
        return;
    }
    let sy = normalize_school_year(&text_field(record, "schoolYear"));
    if sy.is_empty() {
        record.insert("schoolYear".to_string(), Value::Null);
    } else {
        record.insert("schoolYear".to_string(), Value::String(sy));
    }
}

fn best_effort_set(store: &dyn Store, path: &str, value: Value) -> bool {
    match store.set(path, value) {
        Ok(()) => true,
        Err(e) => {
            warn!(path, error = %e, "mirror write failed");
            false
        }
    }
}

fn best_effort_remove(store: &dyn Store, path: &str) -> bool {
    match store.remove(path) {
        Ok(()) => true,
        Err(e) => {
            warn!(path, error = %e, "stale mirror removal failed");
            false
        }
    }
}

/// Writes all three mirrors at `scope`. Returns how many landed.
fn write_mirrors(
    store: &dyn Store,
    kind: EntityKind,
    id: &str,
    record: &Map<String, Value>,
    scope: &Scope,
) -> usize {
    let proj = projection(kind, id, record);
    [
        best_effort_set(store, &kind.flat_path(&scope.school_year, id), proj.clone()),
        best_effort_set(store, &kind.nested_path(scope, id), full_record(id, record)),
        best_effort_set(store, &kind.nested_projection_path(scope, id), proj),
    ]
    .into_iter()
    .filter(|ok| *ok)
    .count()
}

fn remove_nested(store: &dyn Store, kind: EntityKind, id: &str, scope: &Scope) {
    best_effort_remove(store, &kind.nested_path(scope, id));
    best_effort_remove(store, &kind.nested_projection_path(scope, id));
}

fn read_record(store: &dyn Store, kind: EntityKind, id: &str) -> EngineResult<Map<String, Value>> {
    let path = kind.primary_path(id);
    match store.get(&path).map_err(|e| EngineError::store(&path, e))? {
        Some(Value::Object(map)) => Ok(map),
        _ => Err(EngineError::not_found(kind.label(), id)),
    }
}

fn require_id(id: &str) -> EngineResult<()> {
    paths::require_segment(id, "id")
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Created {
    pub id: String,
    pub data: Value,
}

pub fn create(store: &dyn Store, kind: EntityKind, payload: Map<String, Value>) -> EngineResult<Created> {
    for field in kind.required_fields() {
        if opt_text_field(&payload, field).is_none() {
            return Err(EngineError::invalid(format!("missing {field}")));
        }
    }

    let mut record = payload;
    record.remove("id");
    record.remove("updatedAt");
    normalize_year_field(&mut record);
    record.insert("createdAt".to_string(), Value::String(now_ts()));
    let record = match tree::prune(Value::Object(record)) {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };

    let id = new_push_id();
    let primary = kind.primary_path(&id);
    store
        .set(&primary, full_record(&id, &record))
        .map_err(|e| EngineError::store(&primary, e))?;

    if let Some(scope) = scope_of(&record) {
        let written = write_mirrors(store, kind, &id, &record, &scope);
        debug!(kind = kind.label(), id = %id, sy = %scope.school_year, term = %scope.term_key, written, "created with mirrors");
    }

    Ok(Created {
        id: id.clone(),
        data: full_record(&id, &record),
    })
}

/// Merges `patch` into the primary record and moves the mirrors to match the
/// record's new year/term. Returns the merged record.
pub fn update(
    store: &dyn Store,
    kind: EntityKind,
    id: &str,
    patch: Map<String, Value>,
) -> EngineResult<Value> {
    require_id(id)?;
    let prior = read_record(store, kind, id)?;

    let mut patch = patch;
    patch.remove("id");
    patch.remove("createdAt");
    normalize_year_field(&mut patch);
    patch.insert("updatedAt".to_string(), Value::String(now_ts()));

    let primary = kind.primary_path(id);
    store
        .update(&primary, patch.clone())
        .map_err(|e| EngineError::store(&primary, e))?;

    let merged = tree::merge_object(&prior, &patch);
    let old = scope_of(&prior);
    let new = scope_of(&merged);

    match (old, new) {
        (None, None) => {}
        (None, Some(new)) => {
            write_mirrors(store, kind, id, &merged, &new);
        }
        (Some(old), None) => {
            best_effort_remove(store, &kind.flat_path(&old.school_year, id));
            remove_nested(store, kind, id, &old);
        }
        (Some(old), Some(new)) if old.school_year == new.school_year => {
            write_mirrors(store, kind, id, &merged, &new);
            if old.term_key != new.term_key {
                remove_nested(store, kind, id, &old);
            }
        }
        (Some(old), Some(new)) => {
            // New placement first: an interruption leaves the record indexed
            // twice rather than not at all.
            write_mirrors(store, kind, id, &merged, &new);
            best_effort_remove(store, &kind.flat_path(&old.school_year, id));
            remove_nested(store, kind, id, &old);
        }
    }

    Ok(full_record(id, &merged))
}

/// Removes mirrors, dependents, then the primary. Unlike create/update, a
/// failed index removal aborts before the primary is touched so no index
/// entry is left pointing at a deleted record.
pub fn delete(store: &dyn Store, kind: EntityKind, id: &str) -> EngineResult<()> {
    require_id(id)?;
    let prior = read_record(store, kind, id)?;

    let mut dependents = Vec::new();
    if let Some(scope) = scope_of(&prior) {
        dependents.push(kind.flat_path(&scope.school_year, id));
        dependents.push(kind.nested_path(&scope, id));
        dependents.push(kind.nested_projection_path(&scope, id));
    }
    if kind == EntityKind::Class {
        dependents.push(paths::class_roster(id));
    }
    dependents.push(kind.primary_path(id));

    for path in dependents {
        store
            .remove(&path)
            .map_err(|e| EngineError::store(&path, e))?;
    }
    Ok(())
}

pub fn get(store: &dyn Store, kind: EntityKind, id: &str) -> EngineResult<Value> {
    require_id(id)?;
    let record = read_record(store, kind, id)?;
    Ok(full_record(id, &record))
}

/// Year listing from the flat index, or from the nested term index when a
/// term is given. Index reads may lag the primaries.
pub fn list_by_year(
    store: &dyn Store,
    kind: EntityKind,
    school_year: &str,
    term: Option<&str>,
) -> EngineResult<Vec<Value>> {
    let sy = normalize_school_year(school_year);
    paths::require_segment(&sy, "schoolYear")?;
    let path = match term {
        Some(term) => {
            let scope = Scope {
                school_year: sy,
                term_key: term_key_or_default(Some(term)),
            };
            format!(
                "{SCHOOL_YEAR_ROOT}/{}/{}/{}",
                scope.school_year,
                scope.term_key,
                kind.collection()
            )
        }
        None => format!("/{}/{}", kind.by_year(), sy),
    };
    let node = store.get(&path).map_err(|e| EngineError::store(&path, e))?;
    Ok(children_with_ids(node))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub scanned: usize,
    pub written: usize,
    pub removed: usize,
}

/// Idempotent repair pass: rewrites every expected mirror from the primaries
/// and drops mirror entries whose placement no longer matches any primary.
pub fn reconcile(store: &dyn Store, kind: EntityKind) -> EngineResult<ReconcileReport> {
    let root = format!("/{}", kind.collection());
    let primaries = match store.get(&root).map_err(|e| EngineError::store(&root, e))? {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };

    let mut report = ReconcileReport::default();
    let mut expected: std::collections::HashMap<String, Scope> = std::collections::HashMap::new();
    for (id, record) in &primaries {
        report.scanned += 1;
        let Value::Object(record) = record else {
            continue;
        };
        if let Some(scope) = scope_of(record) {
            report.written += write_mirrors(store, kind, id, record, &scope);
            expected.insert(id.clone(), scope);
        }
    }

    let flat_root = format!("/{}", kind.by_year());
    if let Some(Value::Object(years)) = store
        .get(&flat_root)
        .map_err(|e| EngineError::store(&flat_root, e))?
    {
        for (sy, entries) in years {
            let Value::Object(entries) = entries else {
                continue;
            };
            for id in entries.keys() {
                let keep = expected.get(id).is_some_and(|s| s.school_year == sy);
                if !keep && best_effort_remove(store, &kind.flat_path(&sy, id)) {
                    report.removed += 1;
                }
            }
        }
    }

    if let Some(Value::Object(years)) = store
        .get(SCHOOL_YEAR_ROOT)
        .map_err(|e| EngineError::store(SCHOOL_YEAR_ROOT, e))?
    {
        for (sy, terms) in years {
            let Value::Object(terms) = terms else {
                continue;
            };
            for (term_key, buckets) in terms {
                let scope = Scope {
                    school_year: sy.clone(),
                    term_key,
                };
                for projection in [false, true] {
                    let bucket = if projection {
                        kind.by_year()
                    } else {
                        kind.collection()
                    };
                    let Some(Value::Object(entries)) = buckets.get(bucket) else {
                        continue;
                    };
                    for id in entries.keys() {
                        if expected.get(id) == Some(&scope) {
                            continue;
                        }
                        let path = if projection {
                            kind.nested_projection_path(&scope, id)
                        } else {
                            kind.nested_path(&scope, id)
                        };
                        if best_effort_remove(store, &path) {
                            report.removed += 1;
                        }
                    }
                }
            }
        }
    }

    Ok(report)
}
