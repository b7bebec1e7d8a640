use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::coordinate::Coordinate;
use super::hierarchy::{Hierarchy, LevelSchema};

/// Session-local node identity.
///
/// Generated on the client and stable for the session. Always carries a
/// `tmp-` prefix so it can never be mistaken for a numeric server id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn generate() -> Self {
        NodeId(format!("tmp-{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One editable record at some level of the tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Session identity
    pub id: NodeId,
    /// Id assigned by the server, present only for nodes loaded from existing data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<u64>,
    /// Declared fields of the node's level, in declaration order
    pub fields: IndexMap<String, Value>,
    /// Child collection (always empty at the deepest level)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Arc<Node>>,
}

impl Node {
    /// A fresh node with every declared field at its blank value
    pub fn blank(schema: &LevelSchema) -> Self {
        Node {
            id: NodeId::generate(),
            server_id: None,
            fields: schema
                .fields
                .iter()
                .map(|(name, kind)| (name.clone(), kind.blank_value()))
                .collect(),
            children: Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// The `title` field as text, or an empty string
    pub fn title(&self) -> &str {
        self.fields
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    /// Set a field only if the node already declares it
    pub fn set_declared(&mut self, name: &str, value: Value) -> bool {
        match self.fields.get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn push_child(&mut self, child: Node) {
        self.children.push(Arc::new(child));
    }

    /// Number of levels this node spans: 1 for a leaf
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(|c| c.depth()).max().unwrap_or(0)
    }
}

/// Do `nodes`, placed at `rank`, stay within the hierarchy's levels?
pub fn nodes_fit(nodes: &[Arc<Node>], rank: usize, hierarchy: &Hierarchy) -> bool {
    nodes.iter().all(|n| rank + n.depth() <= hierarchy.depth())
}

/// The root collection of one tree slot.
///
/// Nodes are held behind `Arc` so successive tree versions share every
/// subtree a patch did not touch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tree {
    roots: Vec<Arc<Node>>,
}

impl Tree {
    pub fn new(nodes: Vec<Node>) -> Self {
        Tree {
            roots: nodes.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn from_shared(roots: Vec<Arc<Node>>) -> Self {
        Tree { roots }
    }

    pub fn roots(&self) -> &[Arc<Node>] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// The node at `at`, or `None` for the root coordinate or a position
    /// that does not exist
    pub fn node_at(&self, at: &Coordinate) -> Option<&Arc<Node>> {
        let (first, rest) = at.indices().split_first()?;
        let mut node = self.roots.get(*first)?;
        for idx in rest {
            node = node.children.get(*idx)?;
        }
        Some(node)
    }

    /// The child collection under `parent` (the root collection for the
    /// root coordinate)
    pub fn collection_at(&self, parent: &Coordinate) -> Option<&[Arc<Node>]> {
        if parent.is_root() {
            return Some(&self.roots);
        }
        self.node_at(parent).map(|n| n.children.as_slice())
    }

    /// Find the current coordinate of a node by identity
    pub fn locate(&self, id: &NodeId) -> Option<Coordinate> {
        let mut found = None;
        self.walk(&mut |coord, node| {
            if found.is_none() && &node.id == id {
                found = Some(coord.clone());
            }
        });
        found
    }

    /// Visit every node depth-first, parents before children
    pub fn walk(&self, f: &mut dyn FnMut(&Coordinate, &Node)) {
        walk_nodes(&self.roots, &Coordinate::root(), f);
    }

    /// Total number of nodes at every level
    pub fn count(&self) -> usize {
        let mut n = 0;
        self.walk(&mut |_, _| n += 1);
        n
    }

    /// Check that no node carries children deeper than the hierarchy allows
    pub fn fits(&self, hierarchy: &Hierarchy) -> bool {
        nodes_fit(&self.roots, 0, hierarchy)
    }
}

fn walk_nodes(nodes: &[Arc<Node>], parent: &Coordinate, f: &mut dyn FnMut(&Coordinate, &Node)) {
    for (i, node) in nodes.iter().enumerate() {
        let coord = parent.child(i);
        f(&coord, node);
        walk_nodes(&node.children, &coord, f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::hierarchy::Hierarchy;
    use serde_json::json;

    fn titled(h: &Hierarchy, rank: usize, title: &str) -> Node {
        let mut node = Node::blank(h.level(rank).unwrap());
        node.set_declared("title", json!(title));
        node
    }

    fn sample() -> Tree {
        let h = Hierarchy::project();
        let mut m0 = titled(&h, 0, "Kickoff");
        let mut t0 = titled(&h, 1, "Draft review");
        t0.push_child(titled(&h, 2, "Read"));
        m0.push_child(t0);
        let m1 = titled(&h, 0, "Launch");
        Tree::new(vec![m0, m1])
    }

    #[test]
    fn test_blank_node_has_declared_fields() {
        let h = Hierarchy::project();
        let node = Node::blank(h.level(1).unwrap());
        assert!(node.id.as_str().starts_with("tmp-"));
        assert_eq!(node.server_id, None);
        assert_eq!(node.field("assignees"), Some(&json!([])));
        assert_eq!(node.field("title"), Some(&json!("")));
        assert!(node.children.is_empty());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(NodeId::generate(), NodeId::generate());
    }

    #[test]
    fn test_set_declared_ignores_unknown() {
        let h = Hierarchy::project();
        let mut node = Node::blank(h.level(3).unwrap());
        assert!(node.set_declared("is_done", json!(true)));
        assert!(!node.set_declared("priority_id", json!(2)));
        assert!(node.field("priority_id").is_none());
    }

    #[test]
    fn test_node_at_and_collection_at() {
        let tree = sample();
        assert_eq!(tree.node_at(&Coordinate::from([0, 0, 0])).unwrap().title(), "Read");
        assert!(tree.node_at(&Coordinate::from([0, 1])).is_none());
        assert!(tree.node_at(&Coordinate::root()).is_none());
        assert_eq!(tree.collection_at(&Coordinate::root()).unwrap().len(), 2);
        assert_eq!(tree.collection_at(&Coordinate::from([0])).unwrap().len(), 1);
        assert!(tree.collection_at(&Coordinate::from([5])).is_none());
    }

    #[test]
    fn test_walk_and_locate() {
        let tree = sample();
        assert_eq!(tree.count(), 4);
        let read_id = tree.node_at(&Coordinate::from([0, 0, 0])).unwrap().id.clone();
        assert_eq!(tree.locate(&read_id), Some(Coordinate::from([0, 0, 0])));
        assert_eq!(tree.locate(&NodeId::generate()), None);
        assert!(tree.fits(&Hierarchy::project()));
    }

    #[test]
    fn test_node_depth() {
        let h = Hierarchy::project();
        let mut task = titled(&h, 1, "T");
        assert_eq!(task.depth(), 1);
        task.push_child(titled(&h, 2, "S"));
        let mut m = titled(&h, 0, "M");
        m.push_child(titled(&h, 1, "leaf"));
        m.push_child(task);
        assert_eq!(m.depth(), 3);
        let roots = vec![Arc::new(m)];
        assert!(nodes_fit(&roots, 1, &h));
        assert!(!nodes_fit(&roots, 2, &h));
    }
}
