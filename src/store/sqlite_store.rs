use super::{
    join_path, new_push_id, split_path, tree, Store, StoreCapabilities, StoreError, StoreResult,
    WriteBatch,
};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::path::Path;

pub const DB_FILE_NAME: &str = "rosterd.sqlite3";

/// SQLite-backed tree. One row per leaf: objects are flattened into their
/// children, scalars and arrays are stored as JSON text at their full path.
pub struct SqliteStore {
    conn: Connection,
    caps: StoreCapabilities,
}

impl SqliteStore {
    pub fn open(workspace: &Path, caps: StoreCapabilities) -> anyhow::Result<Self> {
        std::fs::create_dir_all(workspace)?;
        let conn = Connection::open(workspace.join(DB_FILE_NAME))?;
        Self::init(conn, caps)
    }

    #[cfg(test)]
    pub fn open_in_memory(caps: StoreCapabilities) -> anyhow::Result<Self> {
        Self::init(Connection::open_in_memory()?, caps)
    }

    fn init(conn: Connection, caps: StoreCapabilities) -> anyhow::Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS nodes(
                path TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Self { conn, caps })
    }

    fn read_subtree(&self, segs: &[&str]) -> StoreResult<Option<Value>> {
        let base = join_path(segs);
        let leaf: Option<String> = self
            .conn
            .query_row("SELECT value FROM nodes WHERE path = ?", [&base], |r| {
                r.get(0)
            })
            .optional()?;
        if let Some(text) = leaf {
            return Ok(Some(serde_json::from_str(&text)?));
        }

        let (lo, hi) = descendant_range(&base);
        let mut stmt = self
            .conn
            .prepare("SELECT path, value FROM nodes WHERE path > ? AND path < ?")?;
        let rows = stmt
            .query_map([&lo, &hi], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        if rows.is_empty() {
            return Ok(None);
        }

        let mut root = Value::Object(Map::new());
        for (path, text) in rows {
            let rel = &path[lo.len()..];
            let rel_segs: Vec<&str> = rel.split('/').collect();
            tree::set_at(&mut root, &rel_segs, serde_json::from_str(&text)?);
        }
        Ok(Some(root))
    }
}

// Rows strictly below `base` sort between `base/` and `base0` ('0' follows '/').
fn descendant_range(base: &str) -> (String, String) {
    let base = base.trim_end_matches('/');
    (format!("{base}/"), format!("{base}0"))
}

fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) -> StoreResult<()> {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (k, v) in map {
                flatten(&format!("{prefix}/{k}"), v, out)?;
            }
        }
        other => out.push((prefix.to_string(), serde_json::to_string(other)?)),
    }
    Ok(())
}

// Removes the subtree at `segs` plus any ancestor stored as a leaf, so a
// following insert never leaves a scalar and an object at overlapping paths.
fn clear_for_write(conn: &Connection, segs: &[&str]) -> StoreResult<()> {
    let base = join_path(segs);
    let (lo, hi) = descendant_range(&base);
    conn.execute("DELETE FROM nodes WHERE path = ?", [&base])?;
    conn.execute("DELETE FROM nodes WHERE path > ? AND path < ?", [&lo, &hi])?;
    for n in 1..segs.len() {
        conn.execute("DELETE FROM nodes WHERE path = ?", [join_path(&segs[..n])])?;
    }
    Ok(())
}

fn write_value(conn: &Connection, segs: &[&str], value: &Value) -> StoreResult<()> {
    if segs.is_empty() {
        return Err(StoreError::InvalidPath("/".to_string()));
    }
    clear_for_write(conn, segs)?;
    let mut leaves = Vec::new();
    flatten(&join_path(segs), value, &mut leaves)?;
    for (path, text) in leaves {
        conn.execute("INSERT INTO nodes(path, value) VALUES(?, ?)", [&path, &text])?;
    }
    Ok(())
}

impl Store for SqliteStore {
    fn get(&self, path: &str) -> StoreResult<Option<Value>> {
        let segs = split_path(path)?;
        self.read_subtree(&segs)
    }

    fn set(&self, path: &str, value: Value) -> StoreResult<()> {
        let segs = split_path(path)?;
        let tx = self.conn.unchecked_transaction()?;
        write_value(&tx, &segs, &value)?;
        tx.commit()?;
        Ok(())
    }

    fn update(&self, path: &str, partial: Map<String, Value>) -> StoreResult<()> {
        let segs = split_path(path)?;
        let tx = self.conn.unchecked_transaction()?;
        for (key, value) in &partial {
            let mut child = segs.clone();
            child.push(key.as_str());
            write_value(&tx, &child, value)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn remove(&self, path: &str) -> StoreResult<()> {
        let segs = split_path(path)?;
        let base = join_path(&segs);
        let (lo, hi) = descendant_range(&base);
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM nodes WHERE path = ?", [&base])?;
        tx.execute("DELETE FROM nodes WHERE path > ? AND path < ?", [&lo, &hi])?;
        tx.commit()?;
        Ok(())
    }

    fn push_child(&self, path: &str, value: Value) -> StoreResult<String> {
        let id = new_push_id();
        self.set(&format!("{}/{}", path.trim_end_matches('/'), id), value)?;
        Ok(id)
    }

    fn query_by_field(
        &self,
        path: &str,
        field: &str,
        value: &Value,
    ) -> StoreResult<Vec<(String, Value)>> {
        let segs = split_path(path)?;
        let base = join_path(&segs);
        if !self.caps.is_indexed(field) {
            return Err(StoreError::QueryUnsupported {
                path: base,
                field: field.to_string(),
            });
        }
        let (lo, hi) = descendant_range(&base);
        let wanted = serde_json::to_string(value)?;
        let suffix = format!("/{field}");
        let mut stmt = self
            .conn
            .prepare("SELECT path FROM nodes WHERE path > ? AND path < ? AND value = ?")?;
        let hits = stmt
            .query_map([&lo, &hi, &wanted], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::new();
        for hit in hits {
            let rel = &hit[lo.len()..];
            let Some(child_id) = rel.strip_suffix(&suffix) else {
                continue;
            };
            if child_id.contains('/') {
                continue;
            }
            let mut child_segs = segs.clone();
            child_segs.push(child_id);
            if let Some(record) = self.read_subtree(&child_segs)? {
                out.push((child_id.to_string(), record));
            }
        }
        Ok(out)
    }

    fn atomic_multi_update(&self, batch: &WriteBatch) -> StoreResult<()> {
        if !self.caps.atomic_writes {
            return Err(StoreError::AtomicUnsupported);
        }
        let tx = self.conn.unchecked_transaction()?;
        for entry in batch.entries() {
            let segs = split_path(&entry.path)?;
            write_value(&tx, &segs, &entry.value)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn capabilities(&self) -> StoreCapabilities {
        self.caps.clone()
    }
}
