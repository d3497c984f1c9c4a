//! Path operations over an in-memory JSON tree.
//!
//! Invariant kept by every mutation: no object in the tree is empty and no
//! value is `null`. Removing the last child of an object removes the object.

use serde_json::{Map, Value};

/// Drops nulls and empty objects, recursively. `None` means "nothing to store".
pub fn prune(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) => {
            let kept: Map<String, Value> = map
                .into_iter()
                .filter_map(|(k, v)| prune(v).map(|v| (k, v)))
                .collect();
            if kept.is_empty() {
                None
            } else {
                Some(Value::Object(kept))
            }
        }
        other => Some(other),
    }
}

pub fn get_at<'a>(root: &'a Value, segs: &[&str]) -> Option<&'a Value> {
    let mut cur = root;
    for seg in segs {
        cur = cur.as_object()?.get(*seg)?;
    }
    Some(cur)
}

pub fn set_at(root: &mut Value, segs: &[&str], value: Value) {
    let Some(value) = prune(value) else {
        remove_at(root, segs);
        return;
    };
    let Some((last, parents)) = segs.split_last() else {
        *root = value;
        return;
    };
    let mut cur = root;
    for seg in parents {
        cur = ensure_object(cur)
            .entry(seg.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    ensure_object(cur).insert(last.to_string(), value);
}

fn ensure_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just replaced with an object"),
    }
}

pub fn update_at(root: &mut Value, segs: &[&str], partial: Map<String, Value>) {
    for (key, value) in partial {
        let mut child: Vec<&str> = segs.to_vec();
        child.push(key.as_str());
        set_at(root, &child, value);
    }
}

pub fn remove_at(root: &mut Value, segs: &[&str]) {
    let Some((last, parents)) = segs.split_last() else {
        *root = Value::Object(Map::new());
        return;
    };
    remove_rec(root, parents, last);
}

// Returns true when `node` became empty and should be dropped by its parent.
fn remove_rec(node: &mut Value, parents: &[&str], last: &str) -> bool {
    let Value::Object(map) = node else {
        return false;
    };
    match parents.split_first() {
        None => {
            map.remove(last);
        }
        Some((head, rest)) => {
            let Some(child) = map.get_mut(*head) else {
                return false;
            };
            if remove_rec(child, rest, last) {
                map.remove(*head);
            }
        }
    }
    map.is_empty()
}

/// Shallow merge of `partial` into `base` with the same null-deletes rule the
/// stores apply on `update`.
pub fn merge_object(base: &Map<String, Value>, partial: &Map<String, Value>) -> Map<String, Value> {
    let mut out = base.clone();
    for (k, v) in partial {
        match prune(v.clone()) {
            Some(v) => {
                out.insert(k.clone(), v);
            }
            None => {
                out.remove(k);
            }
        }
    }
    out
}
