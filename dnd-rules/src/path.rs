//! Dotted-path access into JSON contexts.
//!
//! Paths look like `actor.attributes.hp.value`. A segment that parses as an
//! unsigned integer indexes into arrays; every other segment is an object key.

use serde_json::{Map, Value};

/// Resolve a dotted path against a context value.
///
/// Returns `None` when any segment is missing or traverses a scalar. An empty
/// path resolves to the context itself.
pub fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(context);
    }

    let mut current = context;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Write a value at a dotted path, creating intermediate objects as needed.
///
/// Missing and `null` intermediates become objects. An intermediate that is
/// any other scalar is never overwritten: the write is refused and returns
/// `false`, leaving the context untouched. Array segments must already be in
/// bounds.
pub fn assign(context: &mut Value, path: &str, value: Value) -> bool {
    if path.is_empty() {
        *context = value;
        return true;
    }

    let mut current = context;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let last = segments.peek().is_none();

        if current.is_null() {
            *current = Value::Object(Map::new());
        }

        match current {
            Value::Array(items) => {
                let Some(slot) = segment.parse::<usize>().ok().and_then(|i| items.get_mut(i))
                else {
                    return false;
                };
                if last {
                    *slot = value;
                    return true;
                }
                current = slot;
            }
            Value::Object(map) => {
                if last {
                    map.insert(segment.to_string(), value);
                    return true;
                }
                current = map
                    .entry(segment.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
            }
            _ => return false,
        }
    }
    false
}
