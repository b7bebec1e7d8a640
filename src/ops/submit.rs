use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::{Map, Value, json};

use crate::model::config::EditorSettings;
use crate::model::hierarchy::{FieldKind, Hierarchy};
use crate::model::node::{Node, Tree};

/// Date format the server expects and returns
pub const WIRE_DATE_FORMAT: &str = "%Y-%m-%d";

/// Error type for the submission transform and its inverse
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("{path}: {value:?} does not match date format {format}")]
    InvalidDate {
        path: String,
        value: String,
        format: String,
    },
    #[error("{path}: expected an id or an object with a numeric id")]
    InvalidRef { path: String },
    #[error("{path}: expected {expected}")]
    Shape { path: String, expected: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOptions {
    /// chrono format of dates as held in the tree
    pub date_input_format: String,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        SubmitOptions::from(&EditorSettings::default())
    }
}

impl From<&EditorSettings> for SubmitOptions {
    fn from(settings: &EditorSettings) -> Self {
        SubmitOptions {
            date_input_format: settings.date_input_format.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tree -> wire
// ---------------------------------------------------------------------------

/// Encode a tree as the array the server accepts for its root level.
///
/// Every node gets a 1-based `order`. Pre-loaded nodes carry `id` set to
/// their server id; new nodes carry no id at all.
pub fn submit(hierarchy: &Hierarchy, tree: &Tree, opts: &SubmitOptions) -> Result<Value, SubmitError> {
    encode_collection(hierarchy, 0, tree.roots(), "", opts)
}

fn encode_collection(
    hierarchy: &Hierarchy,
    rank: usize,
    nodes: &[Arc<Node>],
    prefix: &str,
    opts: &SubmitOptions,
) -> Result<Value, SubmitError> {
    let level = &hierarchy.levels()[rank].name;
    let items = nodes
        .iter()
        .enumerate()
        .map(|(i, node)| {
            let prefix = format!("{}{}[{}].", prefix, level, i);
            encode_node(hierarchy, rank, node, i, &prefix, opts)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Array(items))
}

fn encode_node(
    hierarchy: &Hierarchy,
    rank: usize,
    node: &Node,
    position: usize,
    prefix: &str,
    opts: &SubmitOptions,
) -> Result<Value, SubmitError> {
    let schema = &hierarchy.levels()[rank];
    let mut out = Map::new();
    if let Some(server_id) = node.server_id {
        out.insert("id".into(), json!(server_id));
    }
    out.insert("order".into(), json!(position + 1));

    for (name, value) in &node.fields {
        let path = format!("{}{}", prefix, name);
        let encoded = match schema.field_kind(name) {
            Some(FieldKind::Date) => {
                reformat_date(value, &opts.date_input_format, WIRE_DATE_FORMAT, &path)?
            }
            Some(FieldKind::Ref) => flatten_ref(value, &path)?,
            Some(FieldKind::RefList) => flatten_ref_list(value, &path)?,
            _ => value.clone(),
        };
        out.insert(name.clone(), encoded);
    }

    if let Some(child) = hierarchy.child_level(rank) {
        out.insert(
            child.name.clone(),
            encode_collection(hierarchy, rank + 1, &node.children, prefix, opts)?,
        );
    }
    Ok(Value::Object(out))
}

/// Null and empty strings stay null; anything else must parse as `from`
fn reformat_date(value: &Value, from: &str, to: &str, path: &str) -> Result<Value, SubmitError> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::String(s) if s.trim().is_empty() => Ok(Value::Null),
        Value::String(s) => NaiveDate::parse_from_str(s.trim(), from)
            .map(|d| json!(d.format(to).to_string()))
            .map_err(|_| SubmitError::InvalidDate {
                path: path.to_string(),
                value: s.clone(),
                format: from.to_string(),
            }),
        other => Err(SubmitError::InvalidDate {
            path: path.to_string(),
            value: other.to_string(),
            format: from.to_string(),
        }),
    }
}

/// `{ "id": 7, "name": ... }` and `7` both become `7`
fn flatten_ref(value: &Value, path: &str) -> Result<Value, SubmitError> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Number(n) if n.is_u64() => Ok(value.clone()),
        Value::Object(map) => match map.get("id") {
            Some(Value::Number(n)) if n.is_u64() => Ok(Value::Number(n.clone())),
            _ => Err(SubmitError::InvalidRef {
                path: path.to_string(),
            }),
        },
        _ => Err(SubmitError::InvalidRef {
            path: path.to_string(),
        }),
    }
}

fn flatten_ref_list(value: &Value, path: &str) -> Result<Value, SubmitError> {
    match value {
        Value::Null => Ok(json!([])),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| flatten_ref(item, &format!("{}[{}]", path, i)))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        _ => Err(SubmitError::Shape {
            path: path.to_string(),
            expected: "an array of ids",
        }),
    }
}

// ---------------------------------------------------------------------------
// Wire -> tree
// ---------------------------------------------------------------------------

/// Build root-level nodes from existing server data, for edit mode.
///
/// Loaded nodes keep their server id, get a fresh session id, and are
/// placed in `order` sequence. Unknown keys are ignored; declared fields
/// missing from the payload take their blank value.
pub fn load_existing(hierarchy: &Hierarchy, value: &Value, opts: &SubmitOptions) -> Result<Vec<Node>, SubmitError> {
    decode_collection(hierarchy, 0, value, "", opts)
}

fn decode_collection(
    hierarchy: &Hierarchy,
    rank: usize,
    value: &Value,
    prefix: &str,
    opts: &SubmitOptions,
) -> Result<Vec<Node>, SubmitError> {
    let level = &hierarchy.levels()[rank].name;
    let items = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        _ => {
            return Err(SubmitError::Shape {
                path: format!("{}{}", prefix, level),
                expected: "an array",
            });
        }
    };

    let mut decoded = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let prefix = format!("{}{}[{}].", prefix, level, i);
            let order = item.get("order").and_then(Value::as_u64);
            decode_node(hierarchy, rank, item, &prefix, opts).map(|node| (order, i, node))
        })
        .collect::<Result<Vec<_>, _>>()?;
    decoded.sort_by_key(|(order, i, _)| (order.unwrap_or(u64::MAX), *i));
    Ok(decoded.into_iter().map(|(_, _, node)| node).collect())
}

fn decode_node(
    hierarchy: &Hierarchy,
    rank: usize,
    value: &Value,
    prefix: &str,
    opts: &SubmitOptions,
) -> Result<Node, SubmitError> {
    let schema = &hierarchy.levels()[rank];
    let Value::Object(obj) = value else {
        return Err(SubmitError::Shape {
            path: prefix.trim_end_matches('.').to_string(),
            expected: "an object",
        });
    };

    let mut node = Node::blank(schema);
    node.server_id = obj.get("id").and_then(Value::as_u64);
    for (name, kind) in &schema.fields {
        let Some(raw) = obj.get(name) else {
            continue;
        };
        let path = format!("{}{}", prefix, name);
        let value = match kind {
            FieldKind::Date => reformat_date(raw, WIRE_DATE_FORMAT, &opts.date_input_format, &path)?,
            FieldKind::RefList if raw.is_null() => json!([]),
            _ => raw.clone(),
        };
        node.set_declared(name, value);
    }

    if let Some(child) = hierarchy.child_level(rank)
        && let Some(children) = obj.get(&child.name)
    {
        for sub in decode_collection(hierarchy, rank + 1, children, prefix, opts)? {
            node.push_child(sub);
        }
    }
    Ok(node)
}
