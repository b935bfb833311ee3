//! Target resolution: expanding wildcard paths into concrete targets, plus
//! read/write helpers that walk a concrete path through a JSON tree.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde_json::Value;
use sitepipe_types::TransformError;

use crate::path::{JsonPath, Segment};

/// Human-readable kind of a JSON value, as used in type errors and conditions.
pub fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Read the value at a concrete path. Wildcard segments never match.
pub fn get<'a>(root: &'a Value, path: &JsonPath) -> Option<&'a Value> {
    let mut node = root;
    for segment in path.segments() {
        node = match segment {
            Segment::Property(name) => node.as_object()?.get(name)?,
            Segment::Index(index) => node.as_array()?.get(*index)?,
            Segment::Wildcard | Segment::RecursiveWildcard => return None,
        };
    }
    Some(node)
}

pub fn get_mut<'a>(root: &'a mut Value, path: &JsonPath) -> Option<&'a mut Value> {
    let mut node = root;
    for segment in path.segments() {
        node = match segment {
            Segment::Property(name) => node.as_object_mut()?.get_mut(name)?,
            Segment::Index(index) => node.as_array_mut()?.get_mut(*index)?,
            Segment::Wildcard | Segment::RecursiveWildcard => return None,
        };
    }
    Some(node)
}

/// Children of a container in deterministic order: array elements by index,
/// object members by sorted key.
fn children(node: &Value) -> Vec<(Segment, &Value)> {
    match node {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (Segment::Index(i), v))
            .collect(),
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            keys.into_iter()
                .filter_map(|k| map.get(k).map(|v| (Segment::Property(k.clone()), v)))
                .collect()
        }
        _ => Vec::new(),
    }
}

struct Expansion {
    allow_missing_leaf: bool,
    prefix: Vec<Segment>,
    seen: HashSet<String>,
    out: Vec<JsonPath>,
}

impl Expansion {
    fn emit(&mut self, extra: Option<Segment>) {
        let mut segments = self.prefix.clone();
        segments.extend(extra);
        let target = JsonPath::from_segments(segments);
        if self.seen.insert(target.to_string()) {
            self.out.push(target);
        }
    }

    fn descend(&mut self, child: &Value, segment: Segment, rest: &[Segment]) {
        self.prefix.push(segment);
        self.expand(child, rest);
        self.prefix.pop();
    }

    fn expand(&mut self, node: &Value, rest: &[Segment]) {
        let Some((head, tail)) = rest.split_first() else {
            self.emit(None);
            return;
        };

        match head {
            Segment::Property(name) => {
                if let Some(map) = node.as_object() {
                    match map.get(name) {
                        Some(child) => self.descend(child, head.clone(), tail),
                        None if tail.is_empty() && self.allow_missing_leaf => {
                            self.emit(Some(head.clone()))
                        }
                        None => {}
                    }
                }
            }
            Segment::Index(index) => {
                if let Some(items) = node.as_array() {
                    match items.get(*index) {
                        Some(child) => self.descend(child, head.clone(), tail),
                        None if tail.is_empty() && self.allow_missing_leaf => {
                            self.emit(Some(head.clone()))
                        }
                        None => {}
                    }
                }
            }
            Segment::Wildcard => {
                for (segment, child) in children(node) {
                    self.descend(child, segment, tail);
                }
            }
            Segment::RecursiveWildcard => {
                // Zero levels first, then one level deeper with `**` still pending.
                self.expand(node, tail);
                for (segment, child) in children(node) {
                    self.descend(child, segment, rest);
                }
            }
        }
    }
}

/// Resolve `path` against `root` into concrete targets.
///
/// A wildcard-free path always resolves to itself, whether or not anything
/// exists there. Wildcard paths are expanded in pre-order with array elements
/// by index and object members by sorted key; duplicates are dropped. A missing
/// final segment is only yielded when `allow_missing_leaf` is set.
pub fn resolve(root: &Value, path: &JsonPath, allow_missing_leaf: bool) -> Vec<JsonPath> {
    if !path.has_wildcards() {
        return vec![path.clone()];
    }
    let mut expansion = Expansion {
        allow_missing_leaf,
        prefix: Vec::new(),
        seen: HashSet::new(),
        out: Vec::new(),
    };
    expansion.expand(root, path.segments());
    expansion.out
}

/// Ordering that keeps removals from invalidating later targets: descendants
/// before their ancestors, higher array indices before lower ones under the
/// same parent, and property names in sorted order elsewhere.
pub fn removal_order(a: &JsonPath, b: &JsonPath) -> Ordering {
    for (sa, sb) in a.segments().iter().zip(b.segments()) {
        let ord = match (sa, sb) {
            (Segment::Index(x), Segment::Index(y)) => y.cmp(x),
            (Segment::Property(x), Segment::Property(y)) => x.cmp(y),
            (Segment::Property(_), _) => Ordering::Less,
            (_, Segment::Property(_)) => Ordering::Greater,
            _ => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    b.len().cmp(&a.len())
}

fn empty_container(next: Option<&Segment>) -> Value {
    match next {
        Some(Segment::Index(_)) => Value::Array(Vec::new()),
        _ => Value::Object(serde_json::Map::new()),
    }
}

/// Write `value` at a concrete path, creating missing intermediate containers
/// (an array when the following segment is an index, otherwise an object).
///
/// Writing one past the end of an array appends; further out is an error.
pub fn set_value(root: &mut Value, path: &JsonPath, value: Value) -> Result<(), TransformError> {
    let segments = path.segments();
    if segments.is_empty() {
        *root = value;
        return Ok(());
    }

    let mut node = root;
    let mut value = Some(value);
    for (i, segment) in segments.iter().enumerate() {
        let is_last = i + 1 == segments.len();
        let next = segments.get(i + 1);
        let found = kind_name(node);
        let here = || JsonPath::from_segments(segments[..i].to_vec()).to_string();

        match segment {
            Segment::Property(name) => {
                let Some(map) = node.as_object_mut() else {
                    return Err(TransformError::TypeMismatch {
                        path: here(),
                        expected: "object".into(),
                        found: found.into(),
                    });
                };
                if is_last {
                    map.insert(name.clone(), value.take().unwrap_or(Value::Null));
                    return Ok(());
                }
                node = map
                    .entry(name.clone())
                    .or_insert_with(|| empty_container(next));
            }
            Segment::Index(index) => {
                let Some(items) = node.as_array_mut() else {
                    return Err(TransformError::TypeMismatch {
                        path: here(),
                        expected: "array".into(),
                        found: found.into(),
                    });
                };
                let len = items.len();
                if *index > len {
                    return Err(TransformError::IndexOutOfBounds {
                        path: path.to_string(),
                        index: *index as i64,
                        len,
                    });
                }
                let fresh = if is_last {
                    value.take().unwrap_or(Value::Null)
                } else {
                    empty_container(next)
                };
                if *index == len {
                    items.push(fresh);
                } else if is_last {
                    items[*index] = fresh;
                }
                if is_last {
                    return Ok(());
                }
                node = &mut items[*index];
            }
            Segment::Wildcard | Segment::RecursiveWildcard => {
                return Err(TransformError::InvalidOperation(format!(
                    "cannot write through wildcard path '{path}'"
                )))
            }
        }
    }
    Ok(())
}

/// Remove and return the value at a concrete path.
pub fn remove_value(root: &mut Value, path: &JsonPath) -> Result<Value, TransformError> {
    let Some((last, parent_segments)) = path.segments().split_last() else {
        return Err(TransformError::InvalidOperation(
            "cannot remove the document root".into(),
        ));
    };
    let not_found = || TransformError::NotFound {
        path: path.to_string(),
    };
    let parent_path = JsonPath::from_segments(parent_segments.to_vec());
    let parent = get_mut(root, &parent_path).ok_or_else(not_found)?;

    match last {
        Segment::Property(name) => parent
            .as_object_mut()
            .and_then(|map| map.remove(name))
            .ok_or_else(not_found),
        Segment::Index(index) => match parent.as_array_mut() {
            Some(items) if *index < items.len() => Ok(items.remove(*index)),
            _ => Err(not_found()),
        },
        Segment::Wildcard | Segment::RecursiveWildcard => Err(TransformError::InvalidOperation(
            format!("cannot remove through wildcard path '{path}'"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn p(s: &str) -> JsonPath {
        JsonPath::parse(s).unwrap()
    }

    fn strings(targets: &[JsonPath]) -> Vec<String> {
        targets.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn wildcard_over_array_resolves_in_index_order() {
        let doc = json!({"a": [{"x": 1}, {"x": 2}]});
        let targets = resolve(&doc, &p("a[*].x"), false);
        assert_eq!(strings(&targets), vec!["a[0].x", "a[1].x"]);
    }

    #[test]
    fn wildcard_over_object_resolves_in_sorted_key_order() {
        let doc = json!({"pages": {"zeta": 1, "alpha": 2, "mid": 3}});
        let targets = resolve(&doc, &p("pages.*"), false);
        assert_eq!(strings(&targets), vec!["pages.alpha", "pages.mid", "pages.zeta"]);
    }

    #[test]
    fn concrete_path_resolves_to_itself_even_when_missing() {
        let doc = json!({});
        let targets = resolve(&doc, &p("a.b.c"), false);
        assert_eq!(strings(&targets), vec!["a.b.c"]);
    }

    #[test]
    fn missing_leaf_only_yielded_for_creation() {
        let doc = json!({"a": [{"x": 1}, {}]});
        assert_eq!(strings(&resolve(&doc, &p("a[*].x"), false)), vec!["a[0].x"]);
        assert_eq!(
            strings(&resolve(&doc, &p("a[*].x"), true)),
            vec!["a[0].x", "a[1].x"]
        );
    }

    #[test]
    fn concrete_segment_requires_matching_container() {
        let doc = json!({"a": [{"b": 1}], "c": {"0": true}});
        // Index on an object and property on an array do not descend.
        assert!(resolve(&doc, &p("c[0][*]"), true).is_empty());
        assert!(resolve(&doc, &p("a.b[*]"), true).is_empty());
    }

    #[test]
    fn recursive_wildcard_is_preorder_and_deduplicated() {
        let doc = json!({"id": 1, "kids": [{"id": 2}, {"id": 3, "kids": [{"id": 4}]}]});
        let targets = resolve(&doc, &p("**.id"), false);
        assert_eq!(
            strings(&targets),
            vec!["id", "kids[0].id", "kids[1].id", "kids[1].kids[0].id"]
        );
    }

    #[test]
    fn recursive_wildcard_alone_matches_every_node() {
        let doc = json!({"a": [1]});
        let targets = resolve(&doc, &p("[**]"), false);
        assert_eq!(strings(&targets), vec!["$", "a", "a[0]"]);
    }

    #[test]
    fn removal_order_is_deepest_and_highest_first() {
        let mut targets = vec![p("items[0]"), p("items[2]"), p("items[1].x"), p("items[1]")];
        targets.sort_by(removal_order);
        assert_eq!(
            strings(&targets),
            vec!["items[2]", "items[1].x", "items[1]", "items[0]"]
        );
    }

    #[test]
    fn set_value_creates_objects_and_arrays() {
        let mut doc = json!({"name": "n"});
        set_value(&mut doc, &p("meta.version"), json!("1.0")).unwrap();
        set_value(&mut doc, &p("links[0].href"), json!("/")).unwrap();
        assert_eq!(
            doc,
            json!({"name": "n", "meta": {"version": "1.0"}, "links": [{"href": "/"}]})
        );
    }

    #[test]
    fn set_value_rejects_wrong_container_and_gaps() {
        let mut doc = json!({"a": 5, "b": []});
        let err = set_value(&mut doc, &p("a.x"), json!(1)).unwrap_err();
        assert_eq!(
            err,
            TransformError::TypeMismatch {
                path: "a".into(),
                expected: "object".into(),
                found: "number".into()
            }
        );
        let err = set_value(&mut doc, &p("b[3]"), json!(1)).unwrap_err();
        assert!(matches!(err, TransformError::IndexOutOfBounds { len: 0, .. }));
    }

    #[test]
    fn set_value_on_root_replaces_document() {
        let mut doc = json!({"old": true});
        set_value(&mut doc, &JsonPath::root(), json!([1, 2])).unwrap();
        assert_eq!(doc, json!([1, 2]));
    }

    #[test]
    fn remove_value_from_object_and_array() {
        let mut doc = json!({"a": {"b": 1}, "list": [1, 2, 3]});
        assert_eq!(remove_value(&mut doc, &p("a.b")).unwrap(), json!(1));
        assert_eq!(remove_value(&mut doc, &p("list[1]")).unwrap(), json!(2));
        assert_eq!(doc, json!({"a": {}, "list": [1, 3]}));
        assert!(matches!(
            remove_value(&mut doc, &p("list[5]")),
            Err(TransformError::NotFound { .. })
        ));
        assert!(matches!(
            remove_value(&mut doc, &JsonPath::root()),
            Err(TransformError::InvalidOperation(_))
        ));
    }
}
