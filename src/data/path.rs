//! Dotted/bracketed path addressing over `serde_json::Value`

use crate::error::{FormError, Result};
use serde_json::{Map, Value};

/// Largest array index a write may create. Reads of larger indices simply
/// find nothing; numeric keys on objects are not limited.
pub const MAX_ARRAY_INDEX: usize = 100_000;

/// One step of a parsed path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    /// Bracketed or purely numeric segment. Addresses an array element, or
    /// the stringified key when the container is an object.
    Index(usize),
}

impl Segment {
    fn from_key(key: &str) -> Self {
        if is_digits(key) {
            if let Ok(index) = key.parse() {
                return Segment::Index(index);
            }
        }
        Segment::Key(key.to_string())
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn invalid(path: &str, reason: &str) -> FormError {
    FormError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse `a.b[0].c` into segments. Empty dotted segments are skipped.
pub fn parse_path(path: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();

    for part in path.split('.') {
        let key_end = part.find('[').unwrap_or(part.len());
        let key = &part[..key_end];
        if key.contains(']') {
            return Err(invalid(path, "unmatched `]`"));
        }
        if !key.is_empty() {
            segments.push(Segment::from_key(key));
        }

        let mut rest = &part[key_end..];
        while !rest.is_empty() {
            let close = rest.find(']').ok_or_else(|| invalid(path, "unclosed `[`"))?;
            let inner = &rest[1..close];
            if !is_digits(inner) {
                return Err(invalid(path, "bracket index must be a non-negative integer"));
            }
            let index = inner
                .parse()
                .map_err(|_| invalid(path, "bracket index is too large"))?;
            segments.push(Segment::Index(index));

            rest = &rest[close + 1..];
            if !rest.is_empty() && !rest.starts_with('[') {
                return Err(invalid(path, "unexpected text after `]`"));
            }
        }
    }

    Ok(segments)
}

/// Read the value at `segments`; the empty path addresses `root`
pub fn get_in<'a>(root: &'a Value, segments: &[Segment]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(root, |current, segment| match (segment, current) {
            (Segment::Key(key), Value::Object(map)) => map.get(key),
            (Segment::Index(index), Value::Array(items)) => items.get(*index),
            (Segment::Index(index), Value::Object(map)) => map.get(&index.to_string()),
            _ => None,
        })
}

pub fn get_in_mut<'a>(root: &'a mut Value, segments: &[Segment]) -> Option<&'a mut Value> {
    segments
        .iter()
        .try_fold(root, |current, segment| match (segment, current) {
            (Segment::Key(key), Value::Object(map)) => map.get_mut(key),
            (Segment::Index(index), Value::Array(items)) => items.get_mut(*index),
            (Segment::Index(index), Value::Object(map)) => map.get_mut(&index.to_string()),
            _ => None,
        })
}

/// Slot for `segment` inside `current`, creating the container when absent.
/// A scalar in the way is replaced by the container the segment needs.
fn slot_mut<'a>(current: &'a mut Value, segment: &Segment) -> &'a mut Value {
    match segment {
        Segment::Key(key) => match current {
            Value::Object(map) => map.entry(key.clone()).or_insert(Value::Null),
            _ => {
                *current = Value::Object(Map::new());
                slot_mut(current, segment)
            }
        },
        Segment::Index(index) => match current {
            Value::Array(items) => {
                if items.len() <= *index {
                    items.resize(*index + 1, Value::Null);
                }
                &mut items[*index]
            }
            Value::Object(map) => map.entry(index.to_string()).or_insert(Value::Null),
            _ => {
                *current = Value::Array(Vec::new());
                slot_mut(current, segment)
            }
        },
    }
}

fn render(segments: &[Segment]) -> String {
    let mut path = String::new();
    for segment in segments {
        match segment {
            Segment::Key(key) => {
                if !path.is_empty() {
                    path.push('.');
                }
                path.push_str(key);
            }
            Segment::Index(index) => path.push_str(&format!("[{index}]")),
        }
    }
    path
}

/// Reject writes that would grow an array past [`MAX_ARRAY_INDEX`]. Runs
/// before anything is written so a rejected path leaves `root` untouched.
fn check_writable(root: &Value, segments: &[Segment]) -> Result<()> {
    let mut current = Some(root);
    for (depth, segment) in segments.iter().enumerate() {
        if let Segment::Index(index) = segment {
            let keyed = matches!(current, Some(Value::Object(_)));
            if !keyed && *index > MAX_ARRAY_INDEX {
                return Err(invalid(
                    &render(&segments[..=depth]),
                    "array index exceeds MAX_ARRAY_INDEX",
                ));
            }
        }
        current = current.and_then(|value| get_in(value, std::slice::from_ref(segment)));
    }
    Ok(())
}

fn write(root: &mut Value, segments: &[Segment], value: Value) {
    match segments.split_first() {
        None => *root = value,
        Some((first, rest)) => write(slot_mut(root, first), rest, value),
    }
}

/// Write `value` at `segments`, creating intermediate containers: an array
/// when the next segment is numeric, an object otherwise.
pub fn set_in(root: &mut Value, segments: &[Segment], value: Value) -> Result<()> {
    check_writable(root, segments)?;
    write(root, segments, value);
    Ok(())
}

/// Deep equality that treats `1` and `1.0` as the same number
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            x == y || matches!((x.as_f64(), y.as_f64()), (Some(x), Some(y)) if x == y)
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(key, x)| ys.get(key).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Remove an object key or splice an array element
pub fn delete_in(root: &mut Value, segments: &[Segment]) -> bool {
    let Some((last, parents)) = segments.split_last() else {
        return false;
    };
    match (last, get_in_mut(root, parents)) {
        (Segment::Key(key), Some(Value::Object(map))) => map.remove(key).is_some(),
        (Segment::Index(index), Some(Value::Array(items))) if *index < items.len() => {
            items.remove(*index);
            true
        }
        (Segment::Index(index), Some(Value::Object(map))) => {
            map.remove(&index.to_string()).is_some()
        }
        _ => false,
    }
}
