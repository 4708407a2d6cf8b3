//! Three-way property merge.
//!
//! Given the ancestor, source, and target property maps of one object, every
//! property is merged with the strategy its [`DocumentType`] declares. The
//! result is the merged map plus every property that changed differently on
//! both sides.
//!
//! Rules per strategy:
//!
//! - **Scalar**: unchanged side takes the other; equal changes resolve; else conflict.
//! - **List**: source's added/removed items are re-applied to the target list.
//!   Duplicates are kept, so `[] -> [a, b]` on both sides yields `[a, b, a, b]`.
//! - **Set**: as list, with duplicates absorbed.
//! - **KeyedList / KeyedSet**: items matched by key and merged per
//!   sub-property with the scalar rule; new keys are unioned; a key removed on
//!   either side is removed.
//! - **Nested**: objects on both sides merge per sub-property; otherwise scalar.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::trace;

use crate::descriptor::{DiffStrategy, DocumentType};

/// A property changed to different values on both sides.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyConflict {
    /// Property path: `outer.inner` for nested values, `items[key].sub` for keyed items.
    pub path: String,
    pub ancestor_value: Value,
    pub source_value: Value,
    pub target_value: Value,
}

/// Result of merging one object's properties.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropertyMerge {
    /// Merged properties. Conflicting properties hold the target value.
    pub merged: Map<String, Value>,
    pub conflicts: Vec<PropertyConflict>,
}

impl PropertyMerge {
    /// Returns `true` if no property conflicted.
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// Merge `source` and `target` against their common `ancestor`.
///
/// `doc_type` supplies per-property strategies; `None` merges everything as
/// scalars.
pub fn merge_properties(
    doc_type: Option<&DocumentType>,
    ancestor: &Map<String, Value>,
    source: &Map<String, Value>,
    target: &Map<String, Value>,
) -> PropertyMerge {
    let mut conflicts = Vec::new();
    let merged = merge_maps(
        &|name: &str| doc_type.map_or(DiffStrategy::Scalar, |t| t.strategy(name).clone()),
        "",
        ancestor,
        source,
        target,
        &mut conflicts,
    );
    PropertyMerge { merged, conflicts }
}

fn merge_maps(
    strategy_of: &dyn Fn(&str) -> DiffStrategy,
    prefix: &str,
    ancestor: &Map<String, Value>,
    source: &Map<String, Value>,
    target: &Map<String, Value>,
    conflicts: &mut Vec<PropertyConflict>,
) -> Map<String, Value> {
    let names: BTreeSet<&String> = ancestor.keys().chain(source.keys()).chain(target.keys()).collect();
    let mut merged = Map::new();
    for name in names {
        let a = ancestor.get(name).unwrap_or(&Value::Null);
        let s = source.get(name).unwrap_or(&Value::Null);
        let t = target.get(name).unwrap_or(&Value::Null);
        let path = join_path(prefix, name);
        let value = merge_value(&strategy_of(name), &path, a, s, t, conflicts);
        if !value.is_null() || keeps_explicit_null(name, ancestor, source, target) {
            merged.insert(name.clone(), value);
        }
    }
    merged
}

/// Whether a null merge result for `name` came from a side that holds an
/// explicit `null`, as opposed to a side that dropped the property.
fn keeps_explicit_null(
    name: &str,
    ancestor: &Map<String, Value>,
    source: &Map<String, Value>,
    target: &Map<String, Value>,
) -> bool {
    let source_changed = source.get(name) != ancestor.get(name);
    let target_changed = target.get(name) != ancestor.get(name);
    (source_changed && source.contains_key(name))
        || (target_changed && target.contains_key(name))
        || (!source_changed && !target_changed && target.contains_key(name))
}

fn merge_value(
    strategy: &DiffStrategy,
    path: &str,
    a: &Value,
    s: &Value,
    t: &Value,
    conflicts: &mut Vec<PropertyConflict>,
) -> Value {
    match strategy {
        DiffStrategy::Scalar => merge_scalar(path, a, s, t, conflicts),
        DiffStrategy::List => match (items(a), items(s), items(t)) {
            (Some(a), Some(s), Some(t)) => Value::Array(merge_list(&a, &s, &t)),
            _ => merge_scalar(path, a, s, t, conflicts),
        },
        DiffStrategy::Set => match (items(a), items(s), items(t)) {
            (Some(a), Some(s), Some(t)) => Value::Array(merge_set(&a, &s, &t)),
            _ => merge_scalar(path, a, s, t, conflicts),
        },
        DiffStrategy::KeyedList { key } => merge_keyed(path, key, false, a, s, t, conflicts),
        DiffStrategy::KeyedSet { key } => merge_keyed(path, key, true, a, s, t, conflicts),
        DiffStrategy::Nested => merge_nested(path, a, s, t, conflicts),
    }
}

fn merge_scalar(path: &str, a: &Value, s: &Value, t: &Value, conflicts: &mut Vec<PropertyConflict>) -> Value {
    if s == a || s == t {
        return t.clone();
    }
    if t == a {
        return s.clone();
    }
    trace!(path, "property changed on both sides");
    conflicts.push(PropertyConflict {
        path: path.to_string(),
        ancestor_value: a.clone(),
        source_value: s.clone(),
        target_value: t.clone(),
    });
    t.clone()
}

/// Array items of a list-valued property; `null` is the empty list.
fn items(v: &Value) -> Option<Vec<Value>> {
    match v {
        Value::Null => Some(Vec::new()),
        Value::Array(items) => Some(items.clone()),
        _ => None,
    }
}

/// Multiset difference `from - minus`, keeping `from`'s order.
fn multiset_minus(from: &[Value], minus: &[Value]) -> Vec<Value> {
    let mut pending: Vec<&Value> = minus.iter().collect();
    let mut out = Vec::new();
    for item in from {
        if let Some(pos) = pending.iter().position(|m| *m == item) {
            pending.swap_remove(pos);
        } else {
            out.push(item.clone());
        }
    }
    out
}

fn merge_list(a: &[Value], s: &[Value], t: &[Value]) -> Vec<Value> {
    if s == a {
        return t.to_vec();
    }
    if t == a {
        return s.to_vec();
    }
    let added = multiset_minus(s, a);
    let removed = multiset_minus(a, s);
    let mut merged = multiset_minus(t, &removed);
    merged.extend(added);
    merged
}

fn merge_set(a: &[Value], s: &[Value], t: &[Value]) -> Vec<Value> {
    let removed: Vec<&Value> = a.iter().filter(|v| !s.contains(v)).collect();
    let mut merged: Vec<Value> = Vec::new();
    for v in t.iter().chain(s.iter().filter(|v| !a.contains(v))) {
        if !removed.contains(&v) && !merged.contains(v) {
            merged.push(v.clone());
        }
    }
    merged
}

/// Key of a keyed item, as text.
fn item_key(item: &Value, key: &str) -> Option<String> {
    match item.as_object()?.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Keyed items in order, first occurrence of a key wins.
fn keyed_items<'a>(v: &'a Value, key: &str) -> Option<Vec<(String, &'a Map<String, Value>)>> {
    let items = match v {
        Value::Null => return Some(Vec::new()),
        Value::Array(items) => items,
        _ => return None,
    };
    let mut out: Vec<(String, &Map<String, Value>)> = Vec::new();
    for item in items {
        let k = item_key(item, key)?;
        let map = item.as_object()?;
        if !out.iter().any(|(existing, _)| *existing == k) {
            out.push((k, map));
        }
    }
    Some(out)
}

fn lookup<'a>(items: &[(String, &'a Map<String, Value>)], key: &str) -> Option<&'a Map<String, Value>> {
    items.iter().find(|(k, _)| k == key).map(|(_, m)| *m)
}

fn merge_keyed(
    path: &str,
    key: &str,
    sorted: bool,
    a: &Value,
    s: &Value,
    t: &Value,
    conflicts: &mut Vec<PropertyConflict>,
) -> Value {
    let (Some(a_items), Some(s_items), Some(t_items)) = (keyed_items(a, key), keyed_items(s, key), keyed_items(t, key))
    else {
        return merge_scalar(path, a, s, t, conflicts);
    };

    let mut order: Vec<&String> = t_items.iter().map(|(k, _)| k).collect();
    for (k, _) in &s_items {
        if !order.contains(&k) {
            order.push(k);
        }
    }
    if sorted {
        order.sort();
    }

    let empty = Map::new();
    let mut merged = Vec::new();
    for k in order {
        let item = match (lookup(&a_items, k), lookup(&s_items, k), lookup(&t_items, k)) {
            // Removed on either side.
            (Some(_), None, _) | (Some(_), _, None) => continue,
            (None, Some(s_item), None) => s_item.clone(),
            (None, None, Some(t_item)) => t_item.clone(),
            (ancestor, Some(s_item), Some(t_item)) => merge_maps(
                &|_: &str| DiffStrategy::Scalar,
                &format!("{path}[{k}]"),
                ancestor.unwrap_or(&empty),
                s_item,
                t_item,
                conflicts,
            ),
            (None, None, None) => continue,
        };
        merged.push(Value::Object(item));
    }
    Value::Array(merged)
}

fn merge_nested(path: &str, a: &Value, s: &Value, t: &Value, conflicts: &mut Vec<PropertyConflict>) -> Value {
    match (s, t) {
        (Value::Object(s_map), Value::Object(t_map)) => {
            let empty = Map::new();
            let a_map = a.as_object().unwrap_or(&empty);
            Value::Object(merge_maps(
                &|_: &str| DiffStrategy::Nested,
                path,
                a_map,
                s_map,
                t_map,
                conflicts,
            ))
        }
        _ => merge_scalar(path, a, s, t, conflicts),
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}
