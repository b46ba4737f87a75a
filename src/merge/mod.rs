//! Inventory merge logic
//!
//! Implements the base + override merge with:
//! - Mappings: deep-merge by key (override wins on leaves)
//! - Record lists: reconcile by `name` (base order kept, new appended)
//! - Opaque lists and mismatched shapes: REPLACE (override wins)
//! - Scalars: override (override wins)

use indexmap::IndexMap;

use crate::document::{Record, Value};

/// Deep merge two document values.
///
/// Merge semantics:
/// - Mapping + Mapping: deep merge by key (recursive)
/// - Records + Records: reconcile by `name`; identities present in the
///   base keep their base position (merged recursively when overridden),
///   identities only in the override are appended in override order.
///   Duplicate identities within one list collapse last-wins.
/// - Everything else, lists included: override wins entirely
///
/// Consumes both inputs and returns a new tree; neither input is
/// observable afterwards, so the operation is non-destructive.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        // Both mappings: deep merge
        (Value::Mapping(mut base_map), Value::Mapping(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = if let Some(base_value) = base_map.shift_remove(&key) {
                    deep_merge(base_value, overlay_value)
                } else {
                    overlay_value
                };
                base_map.insert(key, merged);
            }
            Value::Mapping(base_map)
        }

        // Both record lists: reconcile by identity
        (Value::Records(base_records), Value::Records(overlay_records)) => {
            Value::Records(reconcile_records(base_records, overlay_records))
        }

        // Opaque lists, mismatched shapes, scalars: overlay wins
        (_, overlay) => overlay,
    }
}

/// Reconcile two record lists by `name`.
///
/// The result keeps base order for identities the base already had and
/// appends identities new in the overlay, in overlay order. Final
/// sequence order matters downstream: the validator reports the first
/// duplicate it encounters, by position.
fn reconcile_records(base: Vec<Record>, overlay: Vec<Record>) -> Vec<Record> {
    let mut by_name: IndexMap<String, Record> = IndexMap::with_capacity(base.len());
    for record in base {
        by_name.insert(record.name.clone(), record);
    }

    for record in overlay {
        match by_name.get_mut(&record.name) {
            // Shared identity: merge in place so the base slot is kept.
            Some(existing) => {
                let base_fields = std::mem::take(&mut existing.fields);
                let merged = deep_merge(
                    Value::Mapping(base_fields),
                    Value::Mapping(record.fields),
                );
                existing.fields = match merged {
                    Value::Mapping(map) => map,
                    _ => unreachable!("merging two mappings yields a mapping"),
                };
            }
            // New identity: append in overlay order.
            None => {
                by_name.insert(record.name.clone(), record);
            }
        }
    }

    by_name.into_values().collect()
}

/// Merge multiple document layers in order (first is base, last has the
/// highest precedence).
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Mapping;

    fn parse(input: &str) -> Value {
        let yaml: serde_yaml::Value = serde_yaml::from_str(input).unwrap();
        Value::from_yaml(yaml).unwrap()
    }

    #[test]
    fn test_scalar_override() {
        let base = parse("timeout: 100\n");
        let overlay = parse("timeout: 200\n");
        let result = deep_merge(base, overlay);
        assert_eq!(result.get("timeout"), Some(&Value::Int(200)));
    }

    #[test]
    fn test_mapping_deep_merge() {
        let base = parse("tls:\n  enabled: false\n  issuer: internal\n");
        let overlay = parse("tls:\n  enabled: true\n");
        let result = deep_merge(base, overlay);

        let tls = result.get("tls").unwrap();
        assert_eq!(tls.get("enabled"), Some(&Value::Bool(true)));
        assert_eq!(
            tls.get("issuer"),
            Some(&Value::String("internal".to_string()))
        );
    }

    #[test]
    fn test_merge_identity() {
        let base = parse("global:\n  project_name: fleet\ninstances:\n  - name: a\n");
        let empty = Value::Mapping(Mapping::new());

        assert_eq!(deep_merge(base.clone(), empty.clone()), base);
        assert_eq!(deep_merge(empty, base.clone()), base);
    }

    #[test]
    fn test_merge_idempotent_on_repeated_override() {
        let base = parse("a: 1\nnested:\n  x: 1\ninstances:\n  - name: a\n    port: 1\n");
        let overlay = parse("a: 2\nnested:\n  y: 2\ninstances:\n  - name: b\n    port: 2\n");

        let once = deep_merge(base, overlay.clone());
        let twice = deep_merge(once.clone(), overlay);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_record_list_reconciliation_order() {
        let base = parse("items:\n  - name: x\n    a: 1\n  - name: y\n    a: 2\n");
        let overlay = parse("items:\n  - name: y\n    a: 9\n  - name: z\n    a: 3\n");
        let result = deep_merge(base, overlay);

        match result.get("items").unwrap() {
            Value::Records(records) => {
                let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
                assert_eq!(names, ["x", "y", "z"]);
                assert_eq!(records[0].get("a"), Some(&Value::Int(1)));
                assert_eq!(records[1].get("a"), Some(&Value::Int(9)));
                assert_eq!(records[2].get("a"), Some(&Value::Int(3)));
            }
            other => panic!("expected records, got {:?}", other),
        }
    }

    #[test]
    fn test_record_merge_is_recursive() {
        let base = parse("items:\n  - name: x\n    service:\n      port: 8080\n      raw: keep\n");
        let overlay = parse("items:\n  - name: x\n    service:\n      port: 9090\n");
        let result = deep_merge(base, overlay);

        match result.get("items").unwrap() {
            Value::Records(records) => {
                let service = records[0].get("service").unwrap();
                assert_eq!(service.get("port"), Some(&Value::Int(9090)));
                assert_eq!(service.get("raw"), Some(&Value::String("keep".to_string())));
            }
            other => panic!("expected records, got {:?}", other),
        }
    }

    #[test]
    fn test_opaque_list_replaced_wholesale() {
        let base = parse("ports:\n  - 80\n  - 443\n");
        let overlay = parse("ports:\n  - 8080\n");
        let result = deep_merge(base, overlay);

        match result.get("ports").unwrap() {
            Value::List(items) => assert_eq!(items, &[Value::Int(8080)]),
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn test_records_replaced_by_unnamed_list() {
        // One side lacks the identity field: no reconciliation, the
        // override replaces the base wholesale.
        let base = parse("items:\n  - name: x\n    a: 1\n");
        let overlay = parse("items:\n  - a: 9\n");
        let result = deep_merge(base, overlay);
        assert!(matches!(result.get("items"), Some(Value::List(_))));
    }

    #[test]
    fn test_shape_mismatch_overridden() {
        let base = parse("value:\n  nested: 1\n");
        let overlay = parse("value: plain\n");
        let result = deep_merge(base, overlay);
        assert_eq!(
            result.get("value"),
            Some(&Value::String("plain".to_string()))
        );
    }

    #[test]
    fn test_null_overrides() {
        let base = parse("value: 100\n");
        let overlay = parse("value: null\n");
        let result = deep_merge(base, overlay);
        assert_eq!(result.get("value"), Some(&Value::Null));
    }

    #[test]
    fn test_merge_layers_precedence() {
        let layers = vec![
            parse("timeout: 100\ncache:\n  mode: off_\n"),
            parse("timeout: 200\n"),
            parse("cache:\n  mode: on_\n"),
        ];
        let result = merge_layers(layers);
        assert_eq!(result.get("timeout"), Some(&Value::Int(200)));
        assert_eq!(
            result.get("cache").unwrap().get("mode"),
            Some(&Value::String("on_".to_string()))
        );
    }

    #[test]
    fn test_duplicate_identity_collapses_last_wins() {
        let base = parse("items:\n  - name: x\n    a: 1\n  - name: x\n    a: 2\n");
        let overlay = parse("items:\n  - name: y\n    a: 3\n");
        let result = deep_merge(base, overlay);

        match result.get("items").unwrap() {
            Value::Records(records) => {
                let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
                assert_eq!(names, ["x", "y"]);
                assert_eq!(records[0].get("a"), Some(&Value::Int(2)));
            }
            other => panic!("expected records, got {:?}", other),
        }
    }
}
