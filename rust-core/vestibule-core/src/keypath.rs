//! # Dot/Bracket Key Paths
//!
//! Grammar for compound request keys such as `student.grades[2]` or
//! `tags[]`. A key is a `.`-separated list of segments; each segment is a
//! name optionally followed by `[n]` (indexed slot) or `[]` (append).
//!
//! [`insert_nested`] builds a nested JSON tree from flat keys and
//! [`flatten`] is its inverse.
//!
//! Indexed slots grow lists up to the slot. Keys indexing past a
//! `max_index` limit are skipped, so a request cannot size an allocation.

use serde_json::{Map, Value};
use tracing::debug;

/// Largest list index honored when building nested values
pub const DEFAULT_MAX_INDEX: usize = 4096;

/// Index suffix of a key segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Index {
    /// `name[n]`
    At(usize),
    /// `name[]`
    Append,
}

/// One `.`-separated part of a compound key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySegment<'a> {
    /// Property name with any bracket suffix removed
    pub name: &'a str,
    /// Bracket suffix, if any
    pub index: Option<Index>,
}

/// Split a compound key into segments
///
/// A non-numeric index (`a[x]`) keeps the bare name with no index; an
/// unterminated bracket leaves the part untouched.
#[must_use]
pub fn parse_key(key: &str) -> Vec<KeySegment<'_>> {
    key.split('.').map(parse_segment).collect()
}

/// Whether any segment indexes past `max_index`
#[must_use]
pub fn exceeds_index(segments: &[KeySegment<'_>], max_index: usize) -> bool {
    segments
        .iter()
        .any(|s| matches!(s.index, Some(Index::At(i)) if i > max_index))
}

fn parse_segment(part: &str) -> KeySegment<'_> {
    if let Some(name) = part.strip_suffix("[]") {
        return KeySegment {
            name,
            index: Some(Index::Append),
        };
    }
    let Some((open, close)) = part.find('[').zip(part.rfind(']')) else {
        return KeySegment {
            name: part,
            index: None,
        };
    };
    if close < open {
        return KeySegment {
            name: part,
            index: None,
        };
    }
    KeySegment {
        name: &part[..open],
        index: part[open + 1..close].trim().parse().ok().map(Index::At),
    }
}

/// Build a nested tree from flat request entries
///
/// Single values become strings, repeated values become arrays of strings.
/// Keys indexing past `max_index` are left out.
pub fn nest<'a, I>(entries: I, max_index: usize) -> Map<String, Value>
where
    I: IntoIterator<Item = (&'a str, &'a [String])>,
{
    let mut root = Map::new();
    for (key, values) in entries {
        let value = match values {
            [single] => Value::String(single.clone()),
            many => Value::Array(many.iter().cloned().map(Value::String).collect()),
        };
        insert_nested(&mut root, key, value, max_index);
    }
    root
}

/// Insert `value` into `root` at the position described by `key`
///
/// `a.b[2]` yields `{"a": {"b": [null, null, value]}}`. Intermediate
/// segments replace non-object values with objects; indexed slots grow
/// their list with nulls; `[]` appends (an array value is spliced in).
///
/// Returns `false`, leaving `root` untouched, if `key` indexes past
/// `max_index`.
pub fn insert_nested(root: &mut Map<String, Value>, key: &str, value: Value, max_index: usize) -> bool {
    let segments = parse_key(key);
    if exceeds_index(&segments, max_index) {
        debug!(key, max_index, "Index out of range, skipping key");
        return false;
    }
    let Some((last, parents)) = segments.split_last() else {
        return false;
    };

    let mut current = root;
    for segment in parents {
        current = child_object(current, *segment);
    }

    let slot = current.entry(last.name.to_string()).or_insert(Value::Null);
    match last.index {
        None => *slot = value,
        Some(Index::Append) => {
            let items = ensure_array(slot);
            match value {
                Value::Array(values) => items.extend(values),
                other => items.push(other),
            }
        }
        Some(Index::At(i)) => {
            let items = ensure_array(slot);
            if items.len() <= i {
                items.resize(i + 1, Value::Null);
            }
            items[i] = value;
        }
    }
    true
}

fn child_object<'m>(map: &'m mut Map<String, Value>, segment: KeySegment<'_>) -> &'m mut Map<String, Value> {
    let slot = map.entry(segment.name.to_string()).or_insert(Value::Null);
    let slot = match segment.index {
        None => slot,
        Some(Index::At(i)) => {
            let items = ensure_array(slot);
            if items.len() <= i {
                items.resize(i + 1, Value::Null);
            }
            &mut items[i]
        }
        Some(Index::Append) => {
            let items = ensure_array(slot);
            items.push(Value::Null);
            let last = items.len() - 1;
            &mut items[last]
        }
    };
    ensure_object(slot)
}

/// Turn `slot` into an object unless it already is one
pub(crate) fn ensure_object(slot: &mut Value) -> &mut Map<String, Value> {
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(map) => map,
        _ => unreachable!("slot was just made an object"),
    }
}

/// Turn `slot` into an array, keeping a previous scalar as first element
pub(crate) fn ensure_array(slot: &mut Value) -> &mut Vec<Value> {
    if !slot.is_array() {
        let previous = slot.take();
        *slot = Value::Array(if previous.is_null() {
            Vec::new()
        } else {
            vec![previous]
        });
    }
    match slot {
        Value::Array(items) => items,
        _ => unreachable!("slot was just made an array"),
    }
}

/// Flatten a JSON object into dot/bracket keys
///
/// `{"a": {"b": [1, 2]}}` yields `a.b[0]=1`, `a.b[1]=2`. Nulls are dropped.
/// Non-object roots produce nothing.
#[must_use]
pub fn flatten(value: &Value) -> Vec<(String, String)> {
    let mut out = Vec::new();
    if let Value::Object(map) = value {
        for (key, child) in map {
            flatten_into(key.clone(), child, &mut out);
        }
    }
    out
}

fn flatten_into(prefix: String, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Null => {}
        Value::Bool(b) => out.push((prefix, b.to_string())),
        Value::Number(n) => out.push((prefix, n.to_string())),
        Value::String(s) => out.push((prefix, s.clone())),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                flatten_into(format!("{prefix}[{i}]"), item, out);
            }
        }
        Value::Object(map) => {
            for (key, child) in map {
                flatten_into(format!("{prefix}.{key}"), child, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_plain_and_dotted() {
        let segs = parse_key("student.notes.moyenne");
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[2].name, "moyenne");
        assert!(segs.iter().all(|s| s.index.is_none()));
    }

    #[test]
    fn test_parse_indices() {
        assert_eq!(parse_key("grades[2]")[0].index, Some(Index::At(2)));
        assert_eq!(parse_key("tags[]")[0].index, Some(Index::Append));
        let bad = parse_key("tags[x]");
        assert_eq!(bad[0].name, "tags");
        assert_eq!(bad[0].index, None);
    }

    #[test]
    fn test_parse_unterminated_bracket() {
        let segs = parse_key("weird[3");
        assert_eq!(segs[0].name, "weird[3");
        assert_eq!(segs[0].index, None);
    }

    #[test]
    fn test_insert_indexed_pads_with_null() {
        let mut root = Map::new();
        insert_nested(&mut root, "a.b[2]", json!("v"), DEFAULT_MAX_INDEX);
        assert_eq!(Value::Object(root), json!({"a": {"b": [null, null, "v"]}}));
    }

    #[test]
    fn test_insert_append() {
        let mut root = Map::new();
        insert_nested(&mut root, "tags[]", json!(["x", "y"]), DEFAULT_MAX_INDEX);
        insert_nested(&mut root, "tags[]", json!("z"), DEFAULT_MAX_INDEX);
        assert_eq!(Value::Object(root), json!({"tags": ["x", "y", "z"]}));
    }

    #[test]
    fn test_insert_list_of_objects() {
        let mut root = Map::new();
        insert_nested(&mut root, "students[1].name", json!("Ana"), DEFAULT_MAX_INDEX);
        assert_eq!(Value::Object(root), json!({"students": [null, {"name": "Ana"}]}));
    }

    #[test]
    fn test_huge_index_is_skipped() {
        let mut root = Map::new();
        assert!(!insert_nested(&mut root, "a.b[1000000000000]", json!("v"), DEFAULT_MAX_INDEX));
        let max = format!("a[{}]", usize::MAX);
        assert!(!insert_nested(&mut root, &max, json!("v"), DEFAULT_MAX_INDEX));
        assert!(!insert_nested(&mut root, "a[4].b[5]", json!("v"), 4));
        assert!(root.is_empty());

        assert!(insert_nested(&mut root, "a[4]", json!("v"), 4));
        assert_eq!(root["a"].as_array().map(Vec::len), Some(5));
    }

    #[test]
    fn test_nest_skips_out_of_range_keys() {
        let one = vec!["1".to_string()];
        let tree = nest([("x[99999999999]", one.as_slice()), ("y", one.as_slice())], DEFAULT_MAX_INDEX);
        assert_eq!(Value::Object(tree), json!({"y": "1"}));
    }

    #[test]
    fn test_nest_collapses_single_values() {
        let one = vec!["Ana".to_string()];
        let many = vec!["a".to_string(), "b".to_string()];
        let tree = nest([("student.name", one.as_slice()), ("ids", many.as_slice())], DEFAULT_MAX_INDEX);
        assert_eq!(Value::Object(tree), json!({"student": {"name": "Ana"}, "ids": ["a", "b"]}));
    }

    #[test]
    fn test_flatten_inverts_nest() {
        let value = json!({"student": {"name": "Ana", "grades": [18, 15]}, "active": true, "x": null});
        let flat = flatten(&value);
        assert_eq!(
            flat,
            vec![
                ("student.name".to_string(), "Ana".to_string()),
                ("student.grades[0]".to_string(), "18".to_string()),
                ("student.grades[1]".to_string(), "15".to_string()),
                ("active".to_string(), "true".to_string()),
            ]
        );
    }
}
