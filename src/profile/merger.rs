use serde_json::{Map, Value};
use tracing::debug;

use crate::model::parser::validate_profile_response;
use crate::profile::profile_model::Profile;
use crate::round::error::AutofillError;

/// Merge newly observed values into a profile.
///
/// Additive: every existing key survives. Each incoming value is normalized
/// to a list and unioned with the known values for its key (existing order
/// first, duplicates dropped); new keys are added as lists. Incoming nulls
/// change nothing. Nested objects, `commonFields` included, merge
/// recursively.
pub fn merge_profile(current: &Profile, incoming: &Map<String, Value>) -> Profile {
    let mut merged = current.as_map().clone();
    merge_map(&mut merged, incoming);
    Profile(merged)
}

/// Validate a model-produced profile against the current one, then merge it.
pub fn merge_checked(current: &Profile, response: &Value) -> Result<Profile, AutofillError> {
    let incoming = validate_profile_response(current, response)?;
    let merged = merge_profile(current, incoming);
    debug!(
        before = current.as_map().len(),
        after = merged.as_map().len(),
        "profile merged"
    );
    Ok(merged)
}

fn merge_map(existing: &mut Map<String, Value>, incoming: &Map<String, Value>) {
    for (key, value) in incoming {
        if let Some(merged) = merge_value(existing.get(key), value) {
            existing.insert(key.clone(), merged);
        }
    }
}

/// Returns the new value for a key, or `None` when nothing changes.
fn merge_value(existing: Option<&Value>, incoming: &Value) -> Option<Value> {
    if incoming.is_null() {
        return None;
    }

    match (existing, incoming) {
        (Some(Value::Object(known)), Value::Object(new)) => {
            let mut merged = known.clone();
            merge_map(&mut merged, new);
            Some(Value::Object(merged))
        }
        (None | Some(Value::Null), Value::Object(new)) => {
            let mut merged = Map::new();
            merge_map(&mut merged, new);
            Some(Value::Object(merged))
        }
        _ => {
            let mut items = existing.map(list_items).unwrap_or_default();
            for item in list_items(incoming) {
                if !items.iter().any(|known| same_value(known, &item)) {
                    items.push(item);
                }
            }

            (!items.is_empty()).then_some(Value::Array(items))
        }
    }
}

/// Normalize a value to its list of non-null, distinct entries.
fn list_items(value: &Value) -> Vec<Value> {
    let raw: Vec<Value> = match value {
        Value::Null => vec![],
        Value::Array(items) => items.iter().filter(|v| !v.is_null()).cloned().collect(),
        other => vec![other.clone()],
    };

    let mut distinct: Vec<Value> = Vec::with_capacity(raw.len());
    for item in raw {
        if !distinct.iter().any(|known| same_value(known, &item)) {
            distinct.push(item);
        }
    }
    distinct
}

/// Strings compare with surrounding whitespace ignored.
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(x), Value::String(y)) => x.trim() == y.trim(),
        _ => a == b,
    }
}
