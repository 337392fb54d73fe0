//! Pre-execution operation merging
//!
//! Operations sharing a `(tool, params.type)` key are coalesced into one
//! representative operation whose `params.items` is the concatenation of
//! every member's items, with provenance recorded in metadata. This is an
//! opt-in optimization the caller applies before submission; it does not
//! change the semantics of whichever strategy runs the merged list.

use std::collections::HashMap;

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::operation::OperationSpec;

type MergeKey = (String, Option<String>);

/// Coalesce operations sharing a `(tool, params.type)` key.
///
/// First-occurrence order of keys is preserved. Singleton groups pass
/// through untouched. Merged groups keep the first member as the
/// representative, concatenate `params.items` arrays across members, and
/// record `original_ids` and `count` in the representative's metadata.
/// Ids fall back to the list position (`op_<index>`) for specs without a
/// caller-supplied id.
pub fn merge_operations(operations: Vec<OperationSpec>) -> Vec<OperationSpec> {
    let mut key_order: Vec<MergeKey> = Vec::new();
    let mut groups: HashMap<MergeKey, Vec<(usize, OperationSpec)>> = HashMap::new();

    for (index, op) in operations.into_iter().enumerate() {
        let key = (
            op.tool.clone(),
            op.params
                .get("type")
                .and_then(Value::as_str)
                .map(str::to_string),
        );
        let group = groups.entry(key.clone()).or_default();
        if group.is_empty() {
            key_order.push(key);
        }
        group.push((index, op));
    }

    let mut merged = Vec::with_capacity(key_order.len());
    for key in key_order {
        let members = match groups.remove(&key) {
            Some(members) => members,
            None => continue,
        };

        if members.len() == 1 {
            merged.extend(members.into_iter().map(|(_, op)| op));
            continue;
        }

        debug!(
            tool = %key.0,
            kind = key.1.as_deref().unwrap_or("-"),
            members = members.len(),
            "merging equivalent operations"
        );

        let count = members.len();
        let original_ids: Vec<String> = members
            .iter()
            .map(|(index, op)| {
                op.id
                    .clone()
                    .unwrap_or_else(|| format!("op_{}", index))
            })
            .collect();

        let mut items: Vec<Value> = Vec::new();
        let mut any_items = false;
        for (_, op) in &members {
            if let Some(member_items) = op.params.get("items").and_then(Value::as_array) {
                any_items = true;
                items.extend(member_items.iter().cloned());
            }
        }

        let mut representative = match members.into_iter().next() {
            Some((_, op)) => op,
            None => continue,
        };

        if any_items {
            match &mut representative.params {
                Value::Object(map) => {
                    map.insert("items".to_string(), Value::Array(items));
                }
                other => {
                    let mut map = Map::new();
                    map.insert("items".to_string(), Value::Array(items));
                    *other = Value::Object(map);
                }
            }
        }

        representative
            .metadata
            .insert("original_ids".to_string(), json!(original_ids));
        representative
            .metadata
            .insert("count".to_string(), json!(count));

        merged.push(representative);
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merges_items_across_equivalent_operations() {
        let ops = vec![
            OperationSpec::new("index", json!({"type": "doc", "items": ["a"]})),
            OperationSpec::new("index", json!({"type": "doc", "items": ["b"]})),
        ];

        let merged = merge_operations(ops);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].params["items"], json!(["a", "b"]));
        assert_eq!(merged[0].metadata["count"], json!(2));
    }

    #[test]
    fn test_distinct_keys_stay_separate() {
        let ops = vec![
            OperationSpec::new("index", json!({"type": "doc"})),
            OperationSpec::new("index", json!({"type": "image"})),
            OperationSpec::new("delete", json!({"type": "doc"})),
        ];

        let merged = merge_operations(ops);
        assert_eq!(merged.len(), 3);
        // Singletons carry no provenance
        assert!(merged.iter().all(|op| op.metadata.is_empty()));
    }

    #[test]
    fn test_provenance_uses_caller_ids_when_present() {
        let ops = vec![
            OperationSpec::new("index", json!({"type": "doc"})).with_id("first"),
            OperationSpec::new("index", json!({"type": "doc"})),
        ];

        let merged = merge_operations(ops);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].metadata["original_ids"], json!(["first", "op_1"]));
    }

    #[test]
    fn test_first_occurrence_order_preserved() {
        let ops = vec![
            OperationSpec::new("b_tool", json!({"type": "x"})),
            OperationSpec::new("a_tool", json!({"type": "x"})),
            OperationSpec::new("b_tool", json!({"type": "x"})),
        ];

        let merged = merge_operations(ops);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].tool, "b_tool");
        assert_eq!(merged[1].tool, "a_tool");
    }

    #[test]
    fn test_members_without_items_contribute_nothing() {
        let ops = vec![
            OperationSpec::new("index", json!({"type": "doc", "items": ["a"]})),
            OperationSpec::new("index", json!({"type": "doc"})),
        ];

        let merged = merge_operations(ops);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].params["items"], json!(["a"]));
        assert_eq!(merged[0].metadata["count"], json!(2));
    }
}
