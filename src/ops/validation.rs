use serde_json::Value;
use tracing::debug;

use crate::model::coordinate::Coordinate;
use crate::model::hierarchy::Hierarchy;
use crate::model::validation::ErrorTree;
use crate::ops::path::{PathError, parse_collection_path, parse_field_path};

/// Route a server validation response into an [`ErrorTree`].
///
/// Nested responses mirror the tree, with collections given as arrays or as
/// objects keyed by index:
/// `{"milestones": {"0": {"title": ["required"], "tasks": [null, {"note": "too long"}]}}}`.
/// Flat responses key messages by field path:
/// `{"milestones[0].tasks[1].note": ["too long"]}`. Flat is picked when
/// every key looks like a field path.
pub fn route_errors(hierarchy: &Hierarchy, response: &Value) -> Result<ErrorTree, PathError> {
    let is_flat = response
        .as_object()
        .is_some_and(|obj| !obj.is_empty() && obj.keys().all(|k| k.contains('[')));
    if is_flat {
        route_flat(hierarchy, response)
    } else {
        route_nested(hierarchy, response)
    }
}

/// Route a response nested like the tree itself. Keys at the top level
/// other than the root level name are ignored.
pub fn route_nested(hierarchy: &Hierarchy, response: &Value) -> Result<ErrorTree, PathError> {
    let mut errors = ErrorTree::new();
    let root = &hierarchy.root().name;
    match response {
        Value::Object(obj) => {
            if let Some(collection) = obj.get(root) {
                walk_collection(hierarchy, 0, collection, &Coordinate::root(), root, &mut errors)?;
            }
            for key in obj.keys().filter(|k| *k != root) {
                debug!(key = %key, "ignoring error key outside the tree");
            }
        }
        Value::Null => {}
        _ => return Err(PathError::MalformedPath(response.to_string())),
    }
    Ok(errors)
}

/// Route a map of field path to message(s). A path ending in a child
/// collection (`tasks[0].steps`) files its messages on the parent node under
/// the collection name.
pub fn route_flat(hierarchy: &Hierarchy, response: &Value) -> Result<ErrorTree, PathError> {
    let obj = response
        .as_object()
        .ok_or_else(|| PathError::MalformedPath(response.to_string()))?;
    let mut errors = ErrorTree::new();
    for (path, messages) in obj {
        let (at, field) = match parse_field_path(hierarchy, path) {
            Ok(addr) => (addr.coordinate, addr.field),
            Err(e @ PathError::UnknownField { .. }) => {
                parse_collection_path(hierarchy, path).map_err(|_| e)?
            }
            Err(e) => return Err(e),
        };
        for message in messages_of(messages) {
            errors.insert(&at, &field, message);
        }
    }
    Ok(errors)
}

fn walk_collection(
    hierarchy: &Hierarchy,
    rank: usize,
    collection: &Value,
    parent: &Coordinate,
    path: &str,
    errors: &mut ErrorTree,
) -> Result<(), PathError> {
    let entries: Vec<(usize, &Value)> = match collection {
        Value::Array(items) => items.iter().enumerate().collect(),
        Value::Object(obj) => obj
            .iter()
            .map(|(key, entry)| {
                key.parse::<usize>()
                    .map(|idx| (idx, entry))
                    .map_err(|_| PathError::MalformedPath(format!("{}.{}", path, key)))
            })
            .collect::<Result<_, _>>()?,
        Value::Null => Vec::new(),
        _ => return Err(PathError::MalformedPath(path.to_string())),
    };

    for (idx, entry) in entries {
        let at = parent.child(idx);
        let entry_path = format!("{}[{}]", path, idx);
        match entry {
            Value::Null => {}
            Value::Object(_) => walk_node(hierarchy, rank, entry, &at, &entry_path, errors)?,
            _ => return Err(PathError::MalformedPath(entry_path)),
        }
    }
    Ok(())
}

fn walk_node(
    hierarchy: &Hierarchy,
    rank: usize,
    node: &Value,
    at: &Coordinate,
    path: &str,
    errors: &mut ErrorTree,
) -> Result<(), PathError> {
    let Value::Object(obj) = node else {
        return Ok(());
    };
    let child = hierarchy.child_level(rank).map(|l| l.name.as_str());
    for (key, value) in obj {
        if Some(key.as_str()) == child && !is_message(value) {
            let child_path = format!("{}.{}", path, key);
            walk_collection(hierarchy, rank + 1, value, at, &child_path, errors)?;
        } else {
            for message in messages_of(value) {
                errors.insert(at, key, message);
            }
        }
    }
    Ok(())
}

/// Messages about the collection itself, rather than its entries
fn is_message(value: &Value) -> bool {
    match value {
        Value::String(_) => true,
        Value::Array(items) => !items.is_empty() && items.iter().all(Value::is_string),
        _ => false,
    }
}

/// A message value is a string or a list of strings
fn messages_of(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items.iter().flat_map(messages_of).collect(),
        other => vec![other.to_string()],
    }
}
