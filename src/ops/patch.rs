use std::sync::Arc;

use serde_json::Value;

use crate::model::coordinate::Coordinate;
use crate::model::hierarchy::{FieldKind, Hierarchy};
use crate::model::node::{Node, NodeId};
use crate::ops::path::{self, PathError};

/// Error type for building patches
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("the root collection is not a node")]
    RootNotANode,
    #[error("coordinate {coordinate} is too deep for this hierarchy")]
    TooDeep { coordinate: Coordinate },
    #[error("coordinate {coordinate} does not address a {level} position")]
    WrongLevel { coordinate: Coordinate, level: String },
    #[error("{level}.{field} holds {kind} values, got {value}")]
    WrongType {
        level: String,
        field: String,
        kind: FieldKind,
        value: String,
    },
}

/// One structural change to a tree
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    /// Replace the whole root collection
    ReplaceAll { children: Vec<Arc<Node>> },
    /// Append nodes to the child collection under `parent`
    Append {
        parent: Coordinate,
        children: Vec<Arc<Node>>,
    },
    /// Remove the node at `at` from its parent collection
    Delete {
        at: Coordinate,
        expect: Option<NodeId>,
    },
    /// Remove the child at `from` and reinsert it at `to`, in one step
    Move {
        parent: Coordinate,
        from: usize,
        to: usize,
        expect: Option<NodeId>,
    },
    /// Write one leaf field
    SetField {
        at: Coordinate,
        field: String,
        value: Value,
        expect: Option<NodeId>,
    },
}

impl Patch {
    /// Require that the node this patch targets still carries `id` when the
    /// patch is applied. Append and replace-all carry no target node and
    /// ignore this.
    pub fn expecting(mut self, id: NodeId) -> Self {
        match &mut self {
            Patch::Delete { expect, .. }
            | Patch::Move { expect, .. }
            | Patch::SetField { expect, .. } => *expect = Some(id),
            Patch::ReplaceAll { .. } | Patch::Append { .. } => {}
        }
        self
    }

    pub fn name(&self) -> &'static str {
        match self {
            Patch::ReplaceAll { .. } => "replace_all",
            Patch::Append { .. } => "append",
            Patch::Delete { .. } => "delete",
            Patch::Move { .. } => "move",
            Patch::SetField { .. } => "set_field",
        }
    }

    /// The child collection whose membership or order this patch changes;
    /// `None` for leaf writes
    pub fn affected_collection(&self) -> Option<Coordinate> {
        match self {
            Patch::ReplaceAll { .. } => Some(Coordinate::root()),
            Patch::Append { parent, .. } | Patch::Move { parent, .. } => Some(parent.clone()),
            Patch::Delete { at, .. } => at.split_last().map(|(parent, _)| parent),
            Patch::SetField { .. } => None,
        }
    }

    /// True if positions in the affected collection can shift, which makes
    /// any coordinate-keyed state for that collection stale
    pub fn shifts_positions(&self) -> bool {
        matches!(
            self,
            Patch::ReplaceAll { .. } | Patch::Delete { .. } | Patch::Move { .. }
        )
    }
}

/// The structural operations available for one hierarchy shape
#[derive(Debug, Clone)]
pub struct PatchVocabulary {
    hierarchy: Arc<Hierarchy>,
}

impl PatchVocabulary {
    pub fn new(hierarchy: Arc<Hierarchy>) -> Self {
        PatchVocabulary { hierarchy }
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    /// Operations scoped to one level, checking coordinate lengths
    pub fn level(&self, name: &str) -> Result<LevelOps<'_>, PatchError> {
        let rank = self
            .hierarchy
            .rank(name)
            .ok_or_else(|| PathError::UnknownLevel(name.to_string()))?;
        Ok(LevelOps { vocab: self, rank })
    }

    pub fn replace_all(&self, children: Vec<Node>) -> Patch {
        Patch::ReplaceAll {
            children: children.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn append_children(&self, parent: &Coordinate, children: Vec<Node>) -> Result<Patch, PatchError> {
        if parent.len() >= self.hierarchy.depth() {
            return Err(PatchError::TooDeep {
                coordinate: parent.clone(),
            });
        }
        Ok(Patch::Append {
            parent: parent.clone(),
            children: children.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn delete_at(&self, node: &Coordinate) -> Result<Patch, PatchError> {
        self.check_node(node)?;
        Ok(Patch::Delete {
            at: node.clone(),
            expect: None,
        })
    }

    pub fn move_within_parent(
        &self,
        parent: &Coordinate,
        from: usize,
        to: usize,
    ) -> Result<Patch, PatchError> {
        if parent.len() >= self.hierarchy.depth() {
            return Err(PatchError::TooDeep {
                coordinate: parent.clone(),
            });
        }
        Ok(Patch::Move {
            parent: parent.clone(),
            from,
            to,
            expect: None,
        })
    }

    pub fn set_field(&self, node: &Coordinate, field: &str, value: Value) -> Result<Patch, PatchError> {
        self.check_node(node)?;
        let level = &self.hierarchy.levels()[node.len() - 1];
        let Some(kind) = level.field_kind(field) else {
            return Err(PathError::UnknownField {
                level: level.name.clone(),
                field: field.to_string(),
            }
            .into());
        };
        if !kind.accepts(&value) {
            return Err(PatchError::WrongType {
                level: level.name.clone(),
                field: field.to_string(),
                kind,
                value: value.to_string(),
            });
        }
        Ok(Patch::SetField {
            at: node.clone(),
            field: field.to_string(),
            value,
            expect: None,
        })
    }

    /// A blank node for the level at `rank`
    pub fn blank(&self, rank: usize) -> Option<Node> {
        self.hierarchy.level(rank).map(Node::blank)
    }

    fn check_node(&self, node: &Coordinate) -> Result<(), PatchError> {
        if node.is_root() {
            return Err(PatchError::RootNotANode);
        }
        if node.len() > self.hierarchy.depth() {
            return Err(PatchError::TooDeep {
                coordinate: node.clone(),
            });
        }
        Ok(())
    }
}

/// The vocabulary restricted to one level, e.g. "tasks".
///
/// Node coordinates must have exactly `rank + 1` indices; parent
/// coordinates exactly `rank`.
#[derive(Debug, Clone, Copy)]
pub struct LevelOps<'a> {
    vocab: &'a PatchVocabulary,
    rank: usize,
}

impl LevelOps<'_> {
    pub fn name(&self) -> &str {
        &self.vocab.hierarchy.levels()[self.rank].name
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn blank(&self) -> Node {
        Node::blank(&self.vocab.hierarchy.levels()[self.rank])
    }

    pub fn field_path(&self, node: &Coordinate, field: &str) -> Result<String, PathError> {
        path::field_path(&self.vocab.hierarchy, self.name(), node, field)
    }

    /// Append a blank node; returns the patch and the new node's identity
    pub fn add_blank(&self, parent: &Coordinate) -> Result<(Patch, NodeId), PatchError> {
        let node = self.blank();
        let id = node.id.clone();
        Ok((self.append(parent, vec![node])?, id))
    }

    pub fn append(&self, parent: &Coordinate, nodes: Vec<Node>) -> Result<Patch, PatchError> {
        self.check_parent(parent)?;
        self.vocab.append_children(parent, nodes)
    }

    pub fn delete(&self, node: &Coordinate) -> Result<Patch, PatchError> {
        self.check_node(node)?;
        self.vocab.delete_at(node)
    }

    pub fn move_item(&self, parent: &Coordinate, from: usize, to: usize) -> Result<Patch, PatchError> {
        self.check_parent(parent)?;
        self.vocab.move_within_parent(parent, from, to)
    }

    pub fn set_field(&self, node: &Coordinate, field: &str, value: Value) -> Result<Patch, PatchError> {
        self.check_node(node)?;
        self.vocab.set_field(node, field, value)
    }

    fn check_parent(&self, parent: &Coordinate) -> Result<(), PatchError> {
        if parent.len() != self.rank {
            return Err(PatchError::WrongLevel {
                coordinate: parent.clone(),
                level: format!("{} parent", self.name()),
            });
        }
        Ok(())
    }

    fn check_node(&self, node: &Coordinate) -> Result<(), PatchError> {
        if node.len() != self.rank + 1 {
            return Err(PatchError::WrongLevel {
                coordinate: node.clone(),
                level: self.name().to_string(),
            });
        }
        Ok(())
    }
}
