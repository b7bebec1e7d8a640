use std::sync::Arc;

use crate::model::coordinate::Coordinate;
use crate::model::hierarchy::Hierarchy;
use crate::model::node::{Node, NodeId, Tree};
use crate::ops::patch::{Patch, PatchError, PatchVocabulary};

/// Error type for applying patches
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("no node at {0}")]
    MissingNode(Coordinate),
    #[error("index {index} out of range for collection under {parent} (len {len})")]
    IndexOutOfRange {
        parent: Coordinate,
        index: usize,
        len: usize,
    },
    #[error("stale coordinate {at}: expected {expected}, found {found}")]
    StaleCoordinate {
        at: Coordinate,
        expected: NodeId,
        found: NodeId,
    },
    #[error("cannot add children below the deepest level at {0}")]
    TooDeep(Coordinate),
    #[error("field {field} is not declared on the node at {at}")]
    UnknownField { at: Coordinate, field: String },
}

/// Error from a combined build-and-apply
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    #[error(transparent)]
    Patch(#[from] PatchError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

type CollectionEdit<'a> = dyn FnMut(&mut Vec<Arc<Node>>) -> Result<(), StoreError> + 'a;

/// Stateless patch applier for one hierarchy shape.
///
/// `apply` walks the index path down to the addressed collection, copies
/// only the nodes on that path, and shares every other subtree with the
/// input tree.
#[derive(Debug, Clone)]
pub struct TreeStore {
    hierarchy: Arc<Hierarchy>,
}

impl TreeStore {
    pub fn new(hierarchy: Arc<Hierarchy>) -> Self {
        TreeStore { hierarchy }
    }

    /// Produce the tree that results from applying `patch` to `tree`.
    /// `tree` is never modified.
    pub fn apply(&self, tree: &Tree, patch: &Patch) -> Result<Tree, StoreError> {
        let roots = match patch {
            Patch::ReplaceAll { children } => children.clone(),
            Patch::Append { parent, children } => {
                if parent.len() >= self.hierarchy.depth() {
                    return Err(StoreError::TooDeep(parent.clone()));
                }
                edit_collection(tree.roots(), parent, 0, &mut |list| {
                    list.extend(children.iter().cloned());
                    Ok(())
                })?
            }
            Patch::Delete { at, expect } => {
                let (parent, idx) = at
                    .split_last()
                    .ok_or_else(|| StoreError::MissingNode(at.clone()))?;
                edit_collection(tree.roots(), &parent, 0, &mut |list| {
                    let node = list.get(idx).ok_or_else(|| StoreError::MissingNode(at.clone()))?;
                    check_identity(at, node, expect)?;
                    list.remove(idx);
                    Ok(())
                })?
            }
            Patch::Move {
                parent,
                from,
                to,
                expect,
            } => edit_collection(tree.roots(), parent, 0, &mut |list| {
                let len = list.len();
                for index in [*from, *to] {
                    if index >= len {
                        return Err(StoreError::IndexOutOfRange {
                            parent: parent.clone(),
                            index,
                            len,
                        });
                    }
                }
                check_identity(&parent.child(*from), &list[*from], expect)?;
                let item = list.remove(*from);
                list.insert(*to, item);
                Ok(())
            })?,
            Patch::SetField {
                at,
                field,
                value,
                expect,
            } => {
                let (parent, idx) = at
                    .split_last()
                    .ok_or_else(|| StoreError::MissingNode(at.clone()))?;
                edit_collection(tree.roots(), &parent, 0, &mut |list| {
                    let node = list.get(idx).ok_or_else(|| StoreError::MissingNode(at.clone()))?;
                    check_identity(at, node, expect)?;
                    if !node.fields.contains_key(field) {
                        return Err(StoreError::UnknownField {
                            at: at.clone(),
                            field: field.clone(),
                        });
                    }
                    let mut updated = Node::clone(node);
                    updated.fields.insert(field.clone(), value.clone());
                    list[idx] = Arc::new(updated);
                    Ok(())
                })?
            }
        };
        Ok(Tree::from_shared(roots))
    }

    /// Build a patch with `vocab`, apply it to `tree` and hand the result
    /// to `set`. `set` is not called if either step fails. Returns the
    /// applied patch.
    pub fn mutate<B, S, E>(&self, vocab: &PatchVocabulary, tree: &Tree, build: B, set: S) -> Result<Patch, E>
    where
        B: FnOnce(&PatchVocabulary) -> Result<Patch, E>,
        S: FnOnce(Tree),
        E: From<StoreError>,
    {
        let patch = build(vocab)?;
        let next = self.apply(tree, &patch)?;
        set(next);
        Ok(patch)
    }
}

/// Rebuild `nodes` with `edit` applied to the collection at `parent`,
/// copying only the nodes along the path. `depth` is how many indices of
/// `parent` have already been consumed.
fn edit_collection(
    nodes: &[Arc<Node>],
    parent: &Coordinate,
    depth: usize,
    edit: &mut CollectionEdit<'_>,
) -> Result<Vec<Arc<Node>>, StoreError> {
    let mut out = nodes.to_vec();
    match parent.indices().get(depth) {
        None => edit(&mut out)?,
        Some(&idx) => {
            let node = nodes
                .get(idx)
                .ok_or_else(|| StoreError::MissingNode(parent.truncated(depth + 1)))?;
            let mut updated = Node::clone(node);
            updated.children = edit_collection(&node.children, parent, depth + 1, edit)?;
            out[idx] = Arc::new(updated);
        }
    }
    Ok(out)
}

fn check_identity(at: &Coordinate, node: &Node, expect: &Option<NodeId>) -> Result<(), StoreError> {
    match expect {
        Some(expected) if *expected != node.id => Err(StoreError::StaleCoordinate {
            at: at.clone(),
            expected: expected.clone(),
            found: node.id.clone(),
        }),
        _ => Ok(()),
    }
}
