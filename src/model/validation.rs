use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::coordinate::Coordinate;

/// Errors attached to one node position, plus errors below it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorNode {
    /// Messages per field of this node
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub fields: IndexMap<String, Vec<String>>,
    /// Errors in the child collection, keyed by child index
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<usize, ErrorNode>,
}

impl ErrorNode {
    /// True if neither this node nor anything below it has a message
    pub fn is_clean(&self) -> bool {
        self.fields.values().all(|msgs| msgs.is_empty())
            && self.children.values().all(ErrorNode::is_clean)
    }

    fn count(&self) -> usize {
        self.fields.values().map(Vec::len).sum::<usize>()
            + self.children.values().map(ErrorNode::count).sum::<usize>()
    }

    fn collect<'a>(&'a self, at: &Coordinate, out: &mut Vec<(Coordinate, &'a str, &'a [String])>) {
        for (field, msgs) in &self.fields {
            if !msgs.is_empty() {
                out.push((at.clone(), field.as_str(), msgs.as_slice()));
            }
        }
        for (idx, child) in &self.children {
            child.collect(&at.child(*idx), out);
        }
    }

    fn first(&self, at: &Coordinate) -> Option<Coordinate> {
        if self.fields.values().any(|msgs| !msgs.is_empty()) {
            return Some(at.clone());
        }
        self.children
            .iter()
            .find_map(|(idx, child)| child.first(&at.child(*idx)))
    }
}

/// Validation errors for one tree slot, nested by the same coordinate
/// structure as the tree itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorTree {
    roots: BTreeMap<usize, ErrorNode>,
}

impl ErrorTree {
    pub fn new() -> Self {
        ErrorTree::default()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.values().all(ErrorNode::is_clean)
    }

    /// Total number of messages
    pub fn count(&self) -> usize {
        self.roots.values().map(ErrorNode::count).sum()
    }

    /// Record a message for `field` of the node at `at`
    pub fn insert(&mut self, at: &Coordinate, field: &str, message: impl Into<String>) {
        let Some((first, rest)) = at.indices().split_first() else {
            return;
        };
        let mut node = self.roots.entry(*first).or_default();
        for idx in rest {
            node = node.children.entry(*idx).or_default();
        }
        node.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn node(&self, at: &Coordinate) -> Option<&ErrorNode> {
        let (first, rest) = at.indices().split_first()?;
        let mut node = self.roots.get(first)?;
        for idx in rest {
            node = node.children.get(idx)?;
        }
        Some(node)
    }

    fn collection_mut(&mut self, parent: &Coordinate) -> Option<&mut BTreeMap<usize, ErrorNode>> {
        let mut collection = &mut self.roots;
        for idx in parent.indices() {
            collection = &mut collection.get_mut(idx)?.children;
        }
        Some(collection)
    }

    /// Does the subtree rooted at `at` carry any error? The root coordinate
    /// asks about the whole tree.
    pub fn has_errors(&self, at: &Coordinate) -> bool {
        if at.is_root() {
            return !self.is_empty();
        }
        self.node(at).is_some_and(|n| !n.is_clean())
    }

    /// Does any node in the child collection under `parent` carry an error?
    /// This is the marker a level's list renders as an error badge.
    pub fn collection_has_errors(&self, parent: &Coordinate) -> bool {
        if parent.is_root() {
            return !self.is_empty();
        }
        self.node(parent)
            .is_some_and(|n| n.children.values().any(|c| !c.is_clean()))
    }

    pub fn field_errors(&self, at: &Coordinate, field: &str) -> &[String] {
        self.node(at)
            .and_then(|n| n.fields.get(field))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Drop every error inside the child collection under `parent`.
    /// Returns true if anything was removed.
    pub fn clear_collection(&mut self, parent: &Coordinate) -> bool {
        match self.collection_mut(parent) {
            Some(collection) if !collection.is_empty() => {
                collection.clear();
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.roots.clear();
    }

    /// Every `(coordinate, field, messages)` triple, depth-first in position
    /// order
    pub fn entries(&self) -> Vec<(Coordinate, &str, &[String])> {
        let mut out = Vec::new();
        for (idx, node) in &self.roots {
            node.collect(&Coordinate::from([*idx]), &mut out);
        }
        out
    }

    /// The first node (depth-first, in position order) carrying a message;
    /// used to decide which level to focus
    pub fn first_error_coordinate(&self) -> Option<Coordinate> {
        self.roots
            .iter()
            .find_map(|(idx, node)| node.first(&Coordinate::from([*idx])))
    }
}
