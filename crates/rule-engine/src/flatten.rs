//! Record flattening.
//!
//! Nested objects and arrays become a single-level map keyed by dotted
//! paths: object members append `.key`, array elements append `.index`.
//! Scalars, `null` included, are stored at their accumulated path. Empty
//! containers contribute nothing.
//!
//! ```
//! use serde_json::json;
//! use trailpost_rule_engine::flatten;
//!
//! let flat = flatten(&json!({"a": {"b": [1, {"c": 2}]}}));
//! assert_eq!(flat.get("a.b.0"), Some(&json!(1)));
//! assert_eq!(flat.get("a.b.1.c"), Some(&json!(2)));
//! ```

use serde_json::{Map, Value};

use crate::error::EvalError;

const SEPARATOR: char = '.';

/// Flattened view of one record.
///
/// Iteration follows the record's member and element order. When two
/// different routes produce the same path (a literal `"a.b"` key next to a
/// nested `a.b`), the one visited last wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatRecord {
    fields: Map<String, Value>,
}

impl FlatRecord {
    /// Optional lookup; never fails.
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.fields.get(path)
    }

    /// Required lookup.
    ///
    /// # Errors
    ///
    /// [`EvalError::KeyNotFound`] when the path is absent.
    pub fn index(&self, path: &str) -> Result<&Value, EvalError> {
        self.fields.get(path).ok_or_else(|| EvalError::KeyNotFound {
            key: path.to_owned(),
        })
    }

    pub fn contains(&self, path: &str) -> bool {
        self.fields.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.fields
    }
}

/// Flattens `record` into a [`FlatRecord`].
pub fn flatten(record: &Value) -> FlatRecord {
    let mut fields = Map::new();
    let mut path = String::new();
    walk(record, &mut path, &mut fields);
    FlatRecord { fields }
}

/// `path` holds every segment followed by a separator; the trailing one is
/// dropped when a scalar is stored.
fn walk(value: &Value, path: &mut String, out: &mut Map<String, Value>) {
    match value {
        Value::Object(members) => {
            for (key, child) in members {
                let mark = path.len();
                path.push_str(key);
                path.push(SEPARATOR);
                walk(child, path, out);
                path.truncate(mark);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                let mark = path.len();
                path.push_str(&index.to_string());
                path.push(SEPARATOR);
                walk(child, path, out);
                path.truncate(mark);
            }
        }
        scalar => {
            let key = path.strip_suffix(SEPARATOR).unwrap_or(path.as_str());
            out.insert(key.to_owned(), scalar.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    #[test]
    fn flattens_nested_objects_and_arrays() {
        let flat = flatten(&json!({"a": {"b": [1, {"c": 2}]}}));
        assert_eq!(flat.len(), 2);
        assert_eq!(flat.get("a.b.0"), Some(&json!(1)));
        assert_eq!(flat.get("a.b.1.c"), Some(&json!(2)));
    }

    #[test]
    fn keeps_null_leaves() {
        let flat = flatten(&json!({"eventName": "Test", "errorCode": null}));
        assert_eq!(flat.get("errorCode"), Some(&Value::Null));
        assert!(flat.contains("errorCode"));
    }

    #[test]
    fn empty_containers_contribute_nothing() {
        let flat = flatten(&json!({"a": {}, "b": [], "c": 1}));
        assert_eq!(flat.len(), 1);
        assert!(!flat.contains("a"));
        assert!(!flat.contains("b"));
        assert!(flatten(&json!({})).is_empty());
    }

    #[test]
    fn preserves_member_order() {
        let flat = flatten(&json!({"z": 1, "a": {"y": 2, "b": 3}, "m": [4]}));
        let keys: Vec<&str> = flat.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["z", "a.y", "a.b", "m.0"]);
    }

    #[test]
    fn colliding_paths_keep_last_visited() {
        let flat = flatten(&json!({"a": {"b": 1}, "a.b": 2}));
        assert_eq!(flat.len(), 1);
        assert_eq!(flat.get("a.b"), Some(&json!(2)));
    }

    #[test]
    fn index_reports_missing_key() {
        let flat = flatten(&json!({"eventName": "X"}));
        let err = flat.index("userIdentity.arn").unwrap_err();
        assert_eq!(
            err,
            EvalError::KeyNotFound {
                key: "userIdentity.arn".to_owned()
            }
        );
        assert_eq!(flat.get("userIdentity.arn"), None);
    }

    #[test]
    fn deeply_nested_identity() {
        let flat = flatten(&json!({
            "userIdentity": {"sessionContext": {"sessionIssuer": {"type": "Role"}}}
        }));
        assert_eq!(
            flat.get("userIdentity.sessionContext.sessionIssuer.type"),
            Some(&json!("Role"))
        );
    }

    fn scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-zA-Z0-9 ]{0,12}".prop_map(Value::String),
        ]
    }

    fn tree() -> impl Strategy<Value = Value> {
        scalar().prop_recursive(4, 48, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..5).prop_map(Value::Array),
                prop::collection::vec(("[a-z]{1,6}", inner), 0..5)
                    .prop_map(|members| Value::Object(members.into_iter().collect())),
            ]
        })
    }

    fn count_leaves(value: &Value) -> usize {
        match value {
            Value::Object(m) => m.values().map(count_leaves).sum(),
            Value::Array(a) => a.iter().map(count_leaves).sum(),
            _ => 1,
        }
    }

    proptest! {
        #[test]
        fn top_level_scalars_flatten_to_themselves(
            members in prop::collection::vec(("[a-z]{1,8}", scalar()), 0..8)
        ) {
            let record = Value::Object(members.into_iter().collect());
            let flat = flatten(&record);
            prop_assert_eq!(Value::Object(flat.into_map()), record);
        }

        #[test]
        fn flat_values_are_scalars(record in tree()) {
            let flat = flatten(&record);
            for (_, value) in flat.iter() {
                prop_assert!(!value.is_object() && !value.is_array());
            }
        }

        #[test]
        fn flatten_is_deterministic(record in tree()) {
            prop_assert_eq!(flatten(&record), flatten(&record));
        }

        #[test]
        fn dot_free_keys_never_collide(record in tree()) {
            // generated keys contain no separator, so every leaf gets its own path
            let flat = flatten(&record);
            prop_assert_eq!(flat.len(), count_leaves(&record));
        }
    }
}
