//! Two-way property diff between revisions.
//!
//! Property maps are `serde_json::Map`s. A property missing on one side is
//! reported with a `null` value on that side.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One changed property.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionPropertyDiff {
    pub property: String,
    pub old_value: Value,
    pub new_value: Value,
}

/// Compute the changed properties between two revisions, ordered by name.
///
/// A property that is absent on one side and `null` on the other is not a
/// change.
pub fn diff_properties(old: &Map<String, Value>, new: &Map<String, Value>) -> Vec<RevisionPropertyDiff> {
    let mut names: Vec<&String> = old.keys().chain(new.keys()).collect();
    names.sort();
    names.dedup();

    names
        .into_iter()
        .filter_map(|name| {
            let old_value = old.get(name).unwrap_or(&Value::Null);
            let new_value = new.get(name).unwrap_or(&Value::Null);
            (old_value != new_value).then(|| RevisionPropertyDiff {
                property: name.clone(),
                old_value: old_value.clone(),
                new_value: new_value.clone(),
            })
        })
        .collect()
}

/// Returns `true` if the two property maps hold the same values.
pub fn same_properties(a: &Map<String, Value>, b: &Map<String, Value>) -> bool {
    diff_properties(a, b).is_empty()
}
