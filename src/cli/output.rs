use serde::Serialize;
use serde_json::Value;

use crate::model::coordinate::Coordinate;
use crate::model::hierarchy::Hierarchy;
use crate::model::node::{Node, NodeId, Tree};
use crate::model::validation::ErrorTree;
use crate::ops::path;
use crate::ops::session::HydrationReport;

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct SlotJson<'a> {
    pub slot: &'a str,
    pub levels: Vec<&'a str>,
    pub tree: &'a Tree,
    #[serde(skip_serializing_if = "ErrorTree::is_empty")]
    pub errors: &'a ErrorTree,
}

#[derive(Serialize)]
pub struct AddedJson {
    pub slot: String,
    pub coordinate: Coordinate,
    pub id: NodeId,
    pub path: String,
}

#[derive(Serialize)]
pub struct HydrateJson {
    pub slot: String,
    pub added: Vec<AddedNodeJson>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dropped: Vec<u64>,
}

#[derive(Serialize)]
pub struct AddedNodeJson {
    pub id: NodeId,
    pub coordinate: Coordinate,
    pub title: String,
}

#[derive(Serialize)]
pub struct ErrorEntryJson {
    pub slot: String,
    pub path: String,
    pub coordinate: Coordinate,
    pub field: String,
    pub messages: Vec<String>,
}

#[derive(Serialize)]
pub struct ValueJson<'a> {
    pub path: &'a str,
    pub value: &'a Value,
}

pub fn hydrate_to_json(slot: &str, tree: &Tree, report: &HydrationReport) -> HydrateJson {
    HydrateJson {
        slot: slot.to_string(),
        added: report
            .added
            .iter()
            .filter_map(|id| {
                let coordinate = tree.locate(id)?;
                let title = tree.node_at(&coordinate)?.title().to_string();
                Some(AddedNodeJson {
                    id: id.clone(),
                    coordinate,
                    title,
                })
            })
            .collect(),
        dropped: report.dropped.clone(),
    }
}

pub fn errors_to_json(slot: &str, hierarchy: &Hierarchy, errors: &ErrorTree) -> Vec<ErrorEntryJson> {
    errors
        .entries()
        .into_iter()
        .map(|(at, field, messages)| ErrorEntryJson {
            slot: slot.to_string(),
            path: error_path(hierarchy, &at, field),
            coordinate: at,
            field: field.to_string(),
            messages: messages.to_vec(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Text formatting
// ---------------------------------------------------------------------------

/// Render one slot as an indented outline. Nodes whose subtree carries
/// validation errors are marked with `!`.
pub fn format_outline(slot: &str, tree: &Tree, errors: &ErrorTree) -> Vec<String> {
    let mut lines = Vec::new();
    if tree.is_empty() {
        lines.push(format!("{}: (empty)", slot));
        return lines;
    }
    lines.push(format!("{}:", slot));
    format_nodes(tree.roots(), &Coordinate::root(), errors, &mut lines);
    lines
}

fn format_nodes(nodes: &[std::sync::Arc<Node>], parent: &Coordinate, errors: &ErrorTree, lines: &mut Vec<String>) {
    for (i, node) in nodes.iter().enumerate() {
        let at = parent.child(i);
        let indent = "  ".repeat(at.len());
        let title = match node.title() {
            "" => "(untitled)",
            t => t,
        };
        let mark = if errors.has_errors(&at) { "  !" } else { "" };
        let server = node
            .server_id
            .map(|id| format!("  #{}", id))
            .unwrap_or_default();
        lines.push(format!("{}{} {}{}{}", indent, at.dotted(), title, server, mark));
        format_nodes(&node.children, &at, errors, lines);
    }
}

/// One line per message: `<path>: <message>`
pub fn format_errors(hierarchy: &Hierarchy, errors: &ErrorTree) -> Vec<String> {
    let mut lines = Vec::new();
    for (at, field, messages) in errors.entries() {
        let path = error_path(hierarchy, &at, field);
        for message in messages {
            lines.push(format!("{}: {}", path, message));
        }
    }
    lines
}

/// The field path for an error entry. Servers may report keys the level
/// does not declare (e.g. `non_field_errors`); those still get a path.
fn error_path(hierarchy: &Hierarchy, at: &Coordinate, field: &str) -> String {
    let level = hierarchy.level(at.len().saturating_sub(1));
    if let Some(level) = level
        && let Ok(path) = path::field_path(hierarchy, &level.name, at, field)
    {
        return path;
    }
    match at.split_last() {
        Some((parent, idx)) => match path::collection_path(hierarchy, &parent) {
            Ok(collection) => format!("{}[{}].{}", collection, idx, field),
            Err(_) => format!("{}.{}", at, field),
        },
        None => field.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> (Hierarchy, Tree) {
        let h = Hierarchy::project();
        let titled = |rank: usize, title: &str| {
            let mut n = Node::blank(h.level(rank).unwrap());
            n.set_declared("title", json!(title));
            n
        };
        let mut m = titled(0, "Launch");
        m.server_id = Some(12);
        let mut t = titled(1, "Draft review");
        t.push_child(titled(2, ""));
        m.push_child(t);
        let tree = Tree::new(vec![m, titled(0, "Retro")]);
        (h, tree)
    }

    #[test]
    fn test_outline() {
        let (_, tree) = sample();
        let mut errors = ErrorTree::new();
        errors.insert(&Coordinate::from([0, 0, 0]), "title", "required");
        let text = format_outline("milestones", &tree, &errors).join("\n");
        insta::assert_snapshot!(text, @r"
        milestones:
          0 Launch  #12  !
            0.0 Draft review  !
              0.0.0 (untitled)  !
          1 Retro
        ");
    }

    #[test]
    fn test_empty_outline() {
        let lines = format_outline("tasks", &Tree::default(), &ErrorTree::new());
        assert_eq!(lines, vec!["tasks: (empty)"]);
    }

    #[test]
    fn test_error_lines_use_field_paths() {
        let (h, _) = sample();
        let mut errors = ErrorTree::new();
        errors.insert(&Coordinate::from([0, 0]), "title", "required");
        errors.insert(&Coordinate::from([1]), "non_field_errors", "dates overlap");
        assert_eq!(
            format_errors(&h, &errors),
            vec![
                "milestones[0].tasks[0].title: required",
                "milestones[1].non_field_errors: dates overlap",
            ]
        );
    }
}
