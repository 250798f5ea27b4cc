//! Structural patch operations over the serialized session tree
//!
//! Paths are JSON Pointers (RFC 6901). `diff` produces the ordered operations
//! that turn one tree into another; `apply` replays them on a copy and only
//! hands the copy back when every operation succeeded.
//!
//! Granularity:
//! - objects are compared key by key (`remove` / `add` / recurse)
//! - arrays of equal length are compared element by element
//! - everything else that differs becomes a single `replace`

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of structural change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Remove,
    Replace,
}

/// One structural change at a JSON Pointer path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: PatchOp,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl PatchOperation {
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchOp::Add,
            path: path.into(),
            value: Some(value),
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: PatchOp::Remove,
            path: path.into(),
            value: None,
        }
    }

    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchOp::Replace,
            path: path.into(),
            value: Some(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("Invalid pointer: {0}")]
    InvalidPointer(String),
    #[error("Path not found: {0}")]
    PathNotFound(String),
    #[error("Index out of bounds at {path}: {index}")]
    IndexOutOfBounds { path: String, index: usize },
    #[error("Operation at {0} requires a value")]
    MissingValue(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Build a JSON Pointer from raw (unescaped) segments.
pub fn pointer<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for segment in segments {
        out.push('/');
        out.push_str(&escape_segment(segment.as_ref()));
    }
    out
}

fn escape_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

fn unescape_segment(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

fn parse_pointer(path: &str) -> Result<Vec<String>, PatchError> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    match path.strip_prefix('/') {
        Some(rest) => Ok(rest.split('/').map(unescape_segment).collect()),
        None => Err(PatchError::InvalidPointer(path.to_string())),
    }
}

/// Compute the ordered operations that transform `from` into `to`.
pub fn diff(from: &Value, to: &Value) -> Vec<PatchOperation> {
    let mut ops = Vec::new();
    diff_at(String::new(), from, to, &mut ops);
    ops
}

fn diff_at(path: String, from: &Value, to: &Value, ops: &mut Vec<PatchOperation>) {
    if from == to {
        return;
    }

    match (from, to) {
        (Value::Object(old), Value::Object(new)) => {
            for (key, old_value) in old {
                let child = format!("{path}/{}", escape_segment(key));
                match new.get(key) {
                    Some(new_value) => diff_at(child, old_value, new_value, ops),
                    None => ops.push(PatchOperation::remove(child)),
                }
            }
            for (key, new_value) in new {
                if !old.contains_key(key) {
                    let child = format!("{path}/{}", escape_segment(key));
                    ops.push(PatchOperation::add(child, new_value.clone()));
                }
            }
        }
        (Value::Array(old), Value::Array(new)) if old.len() == new.len() => {
            for (index, (old_value, new_value)) in old.iter().zip(new).enumerate() {
                diff_at(format!("{path}/{index}"), old_value, new_value, ops);
            }
        }
        _ => ops.push(PatchOperation::replace(path, to.clone())),
    }
}

/// Apply operations to a copy of `target`.
///
/// Either every operation succeeds and the patched copy is returned, or the
/// first failure is returned and `target` is left as it was.
pub fn apply(target: &Value, ops: &[PatchOperation]) -> Result<Value, PatchError> {
    let mut doc = target.clone();
    for op in ops {
        apply_one(&mut doc, op)?;
    }
    Ok(doc)
}

fn apply_one(doc: &mut Value, op: &PatchOperation) -> Result<(), PatchError> {
    let segments = parse_pointer(&op.path)?;
    let Some((last, parents)) = segments.split_last() else {
        return match op.op {
            PatchOp::Remove => Err(PatchError::InvalidPointer(
                "cannot remove the document root".to_string(),
            )),
            PatchOp::Add | PatchOp::Replace => {
                *doc = required_value(op)?;
                Ok(())
            }
        };
    };

    let parent = navigate_mut(doc, parents, &op.path)?;
    match parent {
        Value::Object(map) => match op.op {
            // `replace` on a missing key inserts, so section resets work on
            // documents that never had the section.
            PatchOp::Add | PatchOp::Replace => {
                map.insert(last.clone(), required_value(op)?);
                Ok(())
            }
            PatchOp::Remove => map
                .remove(last)
                .map(|_| ())
                .ok_or_else(|| PatchError::PathNotFound(op.path.clone())),
        },
        Value::Array(items) => match op.op {
            PatchOp::Add if last == "-" => {
                items.push(required_value(op)?);
                Ok(())
            }
            PatchOp::Add => {
                let index = parse_index(last, &op.path)?;
                if index > items.len() {
                    return Err(PatchError::IndexOutOfBounds {
                        path: op.path.clone(),
                        index,
                    });
                }
                items.insert(index, required_value(op)?);
                Ok(())
            }
            PatchOp::Replace => {
                let index = parse_index(last, &op.path)?;
                let value = required_value(op)?;
                let slot = items
                    .get_mut(index)
                    .ok_or_else(|| PatchError::IndexOutOfBounds {
                        path: op.path.clone(),
                        index,
                    })?;
                *slot = value;
                Ok(())
            }
            PatchOp::Remove => {
                let index = parse_index(last, &op.path)?;
                if index >= items.len() {
                    return Err(PatchError::IndexOutOfBounds {
                        path: op.path.clone(),
                        index,
                    });
                }
                items.remove(index);
                Ok(())
            }
        },
        _ => Err(PatchError::PathNotFound(op.path.clone())),
    }
}

fn navigate_mut<'a>(
    doc: &'a mut Value,
    segments: &[String],
    path: &str,
) -> Result<&'a mut Value, PatchError> {
    let mut current = doc;
    for segment in segments {
        current = match current {
            Value::Object(map) => map
                .get_mut(segment)
                .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?,
            Value::Array(items) => {
                let index = parse_index(segment, path)?;
                items
                    .get_mut(index)
                    .ok_or_else(|| PatchError::IndexOutOfBounds {
                        path: path.to_string(),
                        index,
                    })?
            }
            _ => return Err(PatchError::PathNotFound(path.to_string())),
        };
    }
    Ok(current)
}

fn parse_index(segment: &str, path: &str) -> Result<usize, PatchError> {
    segment
        .parse::<usize>()
        .map_err(|_| PatchError::InvalidPointer(path.to_string()))
}

fn required_value(op: &PatchOperation) -> Result<Value, PatchError> {
    op.value
        .clone()
        .ok_or_else(|| PatchError::MissingValue(op.path.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identical_trees_produce_no_ops() {
        let tree = json!({ "a": [1, 2], "b": { "c": null } });
        assert!(diff(&tree, &tree).is_empty());
    }

    #[test]
    fn object_changes_are_key_granular() {
        let from = json!({ "keep": 1, "change": { "x": 1, "y": 2 }, "drop": true });
        let to = json!({ "keep": 1, "change": { "x": 5, "y": 2 }, "new": "hi" });

        let ops = diff(&from, &to);
        assert_eq!(
            ops,
            vec![
                PatchOperation::replace("/change/x", json!(5)),
                PatchOperation::remove("/drop"),
                PatchOperation::add("/new", json!("hi")),
            ]
        );
        assert_eq!(apply(&from, &ops).expect("apply"), to);
    }

    #[test]
    fn arrays_of_different_length_are_replaced_whole() {
        let from = json!({ "order": [1, 2, 3] });
        let to = json!({ "order": [3, 1] });
        assert_eq!(
            diff(&from, &to),
            vec![PatchOperation::replace("/order", json!([3, 1]))]
        );
    }

    #[test]
    fn keys_with_pointer_metacharacters_are_escaped() {
        let from = json!({});
        let to = json!({ "a/b": { "c~d": 1 } });
        let ops = diff(&from, &to);
        assert_eq!(ops[0].path, "/a~1b");
        assert_eq!(apply(&from, &ops).expect("apply"), to);
        assert_eq!(pointer(["a/b", "c~d"]), "/a~1b/c~0d");
    }

    #[test]
    fn round_trip_over_nested_changes() {
        let from = json!({
            "version": 3,
            "documents": { "d1": { "state": { "turnState": { "used": true } } } },
            "encounter": null,
        });
        let to = json!({
            "version": 4,
            "documents": {
                "d1": { "state": { "turnState": {}, "sessionState": { "x": 1 } } },
                "d2": { "state": {} }
            },
            "encounter": { "round": 1, "initiative": [{ "id": "d1" }] },
        });
        let ops = diff(&from, &to);
        assert_eq!(apply(&from, &ops).expect("apply"), to);
    }

    #[test]
    fn replace_on_missing_object_key_inserts() {
        let doc = json!({ "state": {} });
        let ops = vec![PatchOperation::replace("/state/turnState", json!({}))];
        assert_eq!(
            apply(&doc, &ops).expect("apply"),
            json!({ "state": { "turnState": {} } })
        );
    }

    #[test]
    fn array_operations() {
        let doc = json!([1, 2, 3]);
        let ops = vec![
            PatchOperation::add("/-", json!(4)),
            PatchOperation::add("/0", json!(0)),
            PatchOperation::remove("/2"),
            PatchOperation::replace("/1", json!(9)),
        ];
        assert_eq!(apply(&doc, &ops).expect("apply"), json!([0, 9, 3, 4]));
    }

    #[test]
    fn failing_batch_leaves_target_untouched() {
        let doc = json!({ "a": 1 });
        let ops = vec![
            PatchOperation::replace("/a", json!(2)),
            PatchOperation::remove("/missing"),
        ];
        let err = apply(&doc, &ops).expect_err("second op fails");
        assert_eq!(err, PatchError::PathNotFound("/missing".to_string()));
        assert_eq!(doc, json!({ "a": 1 }));
    }

    #[test]
    fn invalid_operations_are_errors() {
        let doc = json!({ "list": [1] });
        assert!(matches!(
            apply(&doc, &[PatchOperation::remove("")]),
            Err(PatchError::InvalidPointer(_))
        ));
        assert!(matches!(
            apply(&doc, &[PatchOperation::replace("no-slash", json!(1))]),
            Err(PatchError::InvalidPointer(_))
        ));
        assert!(matches!(
            apply(&doc, &[PatchOperation::replace("/list/5", json!(1))]),
            Err(PatchError::IndexOutOfBounds { index: 5, .. })
        ));
        let missing_value = PatchOperation {
            op: PatchOp::Add,
            path: "/b".to_string(),
            value: None,
        };
        assert!(matches!(
            apply(&doc, &[missing_value]),
            Err(PatchError::MissingValue(_))
        ));
    }

    #[test]
    fn remove_serializes_without_value() {
        let json = serde_json::to_value(PatchOperation::remove("/a")).expect("serialize");
        assert_eq!(json, json!({ "op": "remove", "path": "/a" }));
    }
}
