use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::io::template_source::{FetchError, TemplateSource, fetch_all};
use crate::model::coordinate::Coordinate;
use crate::model::hierarchy::{FieldKind, Hierarchy};
use crate::model::node::{Node, NodeId, Tree, nodes_fit};
use crate::model::template::{TemplateDocument, TemplateKind};
use crate::model::validation::ErrorTree;
use crate::ops::hydrate::{HydrateError, TemplateHydrator};
use crate::ops::patch::{Patch, PatchError, PatchVocabulary};
use crate::ops::path::{self, PathError};
use crate::ops::reorder::{DropResult, Reorder, ReorderController};
use crate::ops::tree_store::{StoreError, TreeStore};

/// Error type for session operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("unknown slot: {0}")]
    UnknownSlot(String),
    #[error("slot already open: {0}")]
    DuplicateSlot(String),
    #[error("tree for slot {0} is nested deeper than its hierarchy")]
    TreeShape(String),
    #[error("no templates selected")]
    EmptySelection,
    #[error("a template hydration is already pending for {slot} at {parent}")]
    HydrationPending { slot: String, parent: Coordinate },
    #[error("{slot} at {at} is busy with a pending template hydration")]
    SubtreeBusy { slot: String, at: Coordinate },
    #[error("{kind} templates cannot be placed under {parent} in {slot}")]
    TemplateLevelMismatch {
        slot: String,
        parent: Coordinate,
        kind: TemplateKind,
    },
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Patch(#[from] PatchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Hydrate(#[from] HydrateError),
}

/// Where hydrated templates go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HydrationTarget {
    /// Append to the child collection under this parent
    Append(Coordinate),
    /// Re-seed the whole tree
    Replace,
}

impl HydrationTarget {
    pub fn parent(&self) -> Coordinate {
        match self {
            HydrationTarget::Append(parent) => parent.clone(),
            HydrationTarget::Replace => Coordinate::root(),
        }
    }
}

/// A template selection whose fetch has not settled yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingHydration {
    pub ticket: u64,
    pub parent: Coordinate,
    pub kind: TemplateKind,
    pub ids: Vec<u64>,
}

/// Handed out by [`EditorSession::begin_hydration`] and redeemed by
/// [`EditorSession::complete_hydration`] once the fetch settles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HydrationTicket {
    serial: u64,
    epoch: u64,
    slot: String,
    target: HydrationTarget,
    kind: TemplateKind,
    ids: Vec<u64>,
}

impl HydrationTicket {
    pub fn slot(&self) -> &str {
        &self.slot
    }

    pub fn target(&self) -> &HydrationTarget {
        &self.target
    }

    pub fn kind(&self) -> TemplateKind {
        self.kind
    }

    pub fn ids(&self) -> &[u64] {
        &self.ids
    }
}

/// What a settled hydration did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Applied(HydrationReport),
    /// The session was reset or the slot closed while the fetch was out
    Discarded,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HydrationReport {
    /// Identities of the new top-level nodes, in template order
    pub added: Vec<NodeId>,
    /// Template ids whose fetch failed and were left out
    pub dropped: Vec<u64>,
}

/// One named tree of the form with its own vocabulary and store
#[derive(Debug, Clone)]
pub struct Slot {
    hierarchy: Arc<Hierarchy>,
    vocab: PatchVocabulary,
    store: TreeStore,
    hydrator: TemplateHydrator,
    tree: Tree,
    errors: ErrorTree,
    pending: Vec<PendingHydration>,
}

impl Slot {
    fn new(hierarchy: Hierarchy) -> Self {
        let hierarchy = Arc::new(hierarchy);
        Slot {
            vocab: PatchVocabulary::new(hierarchy.clone()),
            store: TreeStore::new(hierarchy.clone()),
            hydrator: TemplateHydrator::new(hierarchy.clone()),
            hierarchy,
            tree: Tree::default(),
            errors: ErrorTree::new(),
            pending: Vec::new(),
        }
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    pub fn vocabulary(&self) -> &PatchVocabulary {
        &self.vocab
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn errors(&self) -> &ErrorTree {
        &self.errors
    }

    pub fn pending(&self) -> &[PendingHydration] {
        &self.pending
    }

    /// Reject structural edits that overlap a pending hydration: anything
    /// inside the target subtree, and anything that shifts positions in a
    /// collection above it.
    fn check_not_busy(&self, name: &str, patch: &Patch) -> Result<(), SessionError> {
        let Some(collection) = patch.affected_collection() else {
            return Ok(());
        };
        let busy = self.pending.iter().any(|p| {
            collection.starts_with(&p.parent)
                || (p.parent.starts_with(&collection) && patch.shifts_positions())
        });
        if busy {
            warn!(slot = name, at = %collection, patch = patch.name(), "edit rejected: subtree busy");
            return Err(SessionError::SubtreeBusy {
                slot: name.to_string(),
                at: collection,
            });
        }
        Ok(())
    }

    /// Reject payloads nested deeper than the levels left below their
    /// target collection
    fn check_shape(&self, name: &str, patch: &Patch) -> Result<(), SessionError> {
        let fits = match patch {
            Patch::ReplaceAll { children } => nodes_fit(children, 0, &self.hierarchy),
            Patch::Append { parent, children } => nodes_fit(children, parent.len(), &self.hierarchy),
            _ => true,
        };
        if !fits {
            warn!(slot = name, patch = patch.name(), "edit rejected: nodes nested too deep");
            return Err(SessionError::TreeShape(name.to_string()));
        }
        Ok(())
    }

    /// Build, check and apply one patch, clearing error markers whose
    /// coordinates the patch invalidates
    fn dispatch<F>(&mut self, name: &str, build: F) -> Result<Patch, SessionError>
    where
        F: FnOnce(&PatchVocabulary) -> Result<Patch, PatchError>,
    {
        let mut next = None;
        let patch = self.store.mutate(
            &self.vocab,
            &self.tree,
            |vocab| {
                let patch = build(vocab)?;
                self.check_not_busy(name, &patch)?;
                self.check_shape(name, &patch)?;
                Ok::<_, SessionError>(patch)
            },
            |tree| next = Some(tree),
        )?;

        if patch.shifts_positions()
            && let Some(collection) = patch.affected_collection()
            && self.errors.clear_collection(&collection)
        {
            info!(slot = name, at = %collection, "cleared stale validation errors");
        }
        if let Some(tree) = next {
            self.tree = tree;
        }
        debug!(slot = name, patch = patch.name(), "patch applied");
        Ok(patch)
    }
}

/// All tree slots of one form.
///
/// Each slot pairs its tree with its own vocabulary, store and validation
/// errors, and tracks pending template hydrations. Every structural change,
/// interactive or template-driven, goes through [`EditorSession::mutate`].
#[derive(Debug, Clone)]
pub struct EditorSession {
    id: Uuid,
    epoch: u64,
    next_ticket: u64,
    slots: IndexMap<String, Slot>,
}

impl Default for EditorSession {
    fn default() -> Self {
        EditorSession::new()
    }
}

impl EditorSession {
    pub fn new() -> Self {
        EditorSession {
            id: Uuid::new_v4(),
            epoch: 0,
            next_ticket: 1,
            slots: IndexMap::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    // -----------------------------------------------------------------------
    // Slots
    // -----------------------------------------------------------------------

    /// Open an empty slot edited with `hierarchy`
    pub fn open_slot(&mut self, name: &str, hierarchy: Hierarchy) -> Result<(), SessionError> {
        self.restore_slot(name, hierarchy, Tree::default(), ErrorTree::new())
    }

    /// Open a slot holding a previously saved form value
    pub fn restore_slot(
        &mut self,
        name: &str,
        hierarchy: Hierarchy,
        tree: Tree,
        errors: ErrorTree,
    ) -> Result<(), SessionError> {
        if self.slots.contains_key(name) {
            return Err(SessionError::DuplicateSlot(name.to_string()));
        }
        if !tree.fits(&hierarchy) {
            return Err(SessionError::TreeShape(name.to_string()));
        }
        let mut slot = Slot::new(hierarchy);
        slot.tree = tree;
        slot.errors = errors;
        self.slots.insert(name.to_string(), slot);
        debug!(session = %self.id, slot = name, "slot opened");
        Ok(())
    }

    pub fn close_slot(&mut self, name: &str) -> Result<(), SessionError> {
        self.slots
            .shift_remove(name)
            .map(|_| ())
            .ok_or_else(|| SessionError::UnknownSlot(name.to_string()))
    }

    pub fn slot_names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn slot(&self, name: &str) -> Result<&Slot, SessionError> {
        self.slots
            .get(name)
            .ok_or_else(|| SessionError::UnknownSlot(name.to_string()))
    }

    fn slot_mut(&mut self, name: &str) -> Result<&mut Slot, SessionError> {
        self.slots
            .get_mut(name)
            .ok_or_else(|| SessionError::UnknownSlot(name.to_string()))
    }

    pub fn tree(&self, slot: &str) -> Result<&Tree, SessionError> {
        Ok(&self.slot(slot)?.tree)
    }

    pub fn errors(&self, slot: &str) -> Result<&ErrorTree, SessionError> {
        Ok(&self.slot(slot)?.errors)
    }

    /// Clear every slot's tree, errors and pending hydrations. Hydrations
    /// still in flight are discarded when they complete.
    pub fn reset(&mut self) {
        for slot in self.slots.values_mut() {
            slot.tree = Tree::default();
            slot.errors.clear();
            slot.pending.clear();
        }
        self.epoch += 1;
        info!(session = %self.id, epoch = self.epoch, "session reset");
    }

    // -----------------------------------------------------------------------
    // Form binding
    // -----------------------------------------------------------------------

    pub fn field_path(
        &self,
        slot: &str,
        level: &str,
        at: &Coordinate,
        field: &str,
    ) -> Result<String, SessionError> {
        Ok(path::field_path(&self.slot(slot)?.hierarchy, level, at, field)?)
    }

    pub fn collection_path(&self, slot: &str, parent: &Coordinate) -> Result<String, SessionError> {
        Ok(path::collection_path(&self.slot(slot)?.hierarchy, parent)?)
    }

    /// Read the value a flat field path is bound to
    pub fn get_field(&self, slot: &str, field_path: &str) -> Result<&Value, SessionError> {
        let state = self.slot(slot)?;
        let addr = path::parse_field_path(&state.hierarchy, field_path)?;
        let node = state
            .tree
            .node_at(&addr.coordinate)
            .ok_or_else(|| StoreError::MissingNode(addr.coordinate.clone()))?;
        node.field(&addr.field).ok_or_else(|| {
            StoreError::UnknownField {
                at: addr.coordinate.clone(),
                field: addr.field.clone(),
            }
            .into()
        })
    }

    /// The declared kind of the field a flat path is bound to
    pub fn field_kind(&self, slot: &str, field_path: &str) -> Result<FieldKind, SessionError> {
        let hierarchy = &self.slot(slot)?.hierarchy;
        let addr = path::parse_field_path(hierarchy, field_path)?;
        hierarchy.levels()[addr.rank]
            .field_kind(&addr.field)
            .ok_or_else(|| {
                PathError::UnknownField {
                    level: addr.level.clone(),
                    field: addr.field.clone(),
                }
                .into()
            })
    }

    /// Write the value a flat field path is bound to
    pub fn set_field(&mut self, slot: &str, field_path: &str, value: Value) -> Result<(), SessionError> {
        let addr = path::parse_field_path(&self.slot(slot)?.hierarchy, field_path)?;
        self.mutate(slot, |v| v.set_field(&addr.coordinate, &addr.field, value))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Structural edits
    // -----------------------------------------------------------------------

    /// The single mutation entry point for a slot: build a patch from the
    /// slot's vocabulary, apply it, and store the new tree
    pub fn mutate<F>(&mut self, slot: &str, build: F) -> Result<Patch, SessionError>
    where
        F: FnOnce(&PatchVocabulary) -> Result<Patch, PatchError>,
    {
        self.slot_mut(slot)?.dispatch(slot, build)
    }

    /// Append a blank node under `parent`; returns its identity
    pub fn add_blank(&mut self, slot: &str, parent: &Coordinate) -> Result<NodeId, SessionError> {
        let node = self
            .slot(slot)?
            .vocab
            .blank(parent.len())
            .ok_or_else(|| PatchError::TooDeep {
                coordinate: parent.clone(),
            })?;
        let id = node.id.clone();
        self.mutate(slot, |v| v.append_children(parent, vec![node]))?;
        Ok(id)
    }

    pub fn delete(&mut self, slot: &str, at: &Coordinate) -> Result<(), SessionError> {
        self.mutate(slot, |v| v.delete_at(at))?;
        Ok(())
    }

    /// Delete by identity, resolving the node's current coordinate first
    pub fn delete_node(&mut self, slot: &str, id: &NodeId) -> Result<Coordinate, SessionError> {
        let at = self
            .tree(slot)?
            .locate(id)
            .ok_or_else(|| StoreError::MissingNode(Coordinate::root()))?;
        self.mutate(slot, |v| Ok(v.delete_at(&at)?.expecting(id.clone())))?;
        Ok(at)
    }

    /// Re-seed the whole slot, e.g. when edit mode pre-loads existing data
    pub fn replace_all(&mut self, slot: &str, nodes: Vec<Node>) -> Result<(), SessionError> {
        self.mutate(slot, |v| Ok(v.replace_all(nodes)))?;
        Ok(())
    }

    /// Apply a same-list drag. Returns false when nothing moved, in which
    /// case neither the tree nor the error markers are touched.
    pub fn reorder(
        &mut self,
        slot: &str,
        level: &str,
        parent: &Coordinate,
        source: usize,
        destination: usize,
    ) -> Result<bool, SessionError> {
        let state = self.slot(slot)?;
        let reorder = ReorderController::new(&state.vocab).on_reorder(level, parent, source, destination)?;
        self.dispatch_reorder(slot, reorder)
    }

    pub fn reorder_drop(
        &mut self,
        slot: &str,
        level: &str,
        parent: &Coordinate,
        drop: DropResult,
    ) -> Result<bool, SessionError> {
        let state = self.slot(slot)?;
        let reorder = ReorderController::new(&state.vocab).on_drop(level, parent, drop)?;
        self.dispatch_reorder(slot, reorder)
    }

    fn dispatch_reorder(&mut self, slot: &str, reorder: Reorder) -> Result<bool, SessionError> {
        match reorder {
            Reorder::Noop => Ok(false),
            Reorder::Move(patch) => {
                self.mutate(slot, |_| Ok(patch))?;
                Ok(true)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Validation errors
    // -----------------------------------------------------------------------

    /// Replace a slot's errors with a freshly routed error tree
    pub fn set_errors(&mut self, slot: &str, errors: ErrorTree) -> Result<(), SessionError> {
        let state = self.slot_mut(slot)?;
        if let Some(first) = errors.first_error_coordinate() {
            info!(slot, count = errors.count(), first = %first, "validation errors received");
        }
        state.errors = errors;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Template hydration
    // -----------------------------------------------------------------------

    /// Record a template selection for `target` before its fetch starts.
    ///
    /// While the ticket is outstanding, a second selection for an
    /// overlapping subtree fails with `HydrationPending` and structural
    /// edits touching it fail with `SubtreeBusy`.
    pub fn begin_hydration(
        &mut self,
        slot: &str,
        target: HydrationTarget,
        kind: TemplateKind,
        ids: Vec<u64>,
    ) -> Result<HydrationTicket, SessionError> {
        if ids.is_empty() {
            return Err(SessionError::EmptySelection);
        }
        let serial = self.next_ticket;
        let epoch = self.epoch;
        let state = self.slot_mut(slot)?;
        let parent = target.parent();

        let level_fits = state
            .hierarchy
            .level(parent.len())
            .is_some_and(|l| l.name == kind.level_name());
        if !level_fits {
            return Err(SessionError::TemplateLevelMismatch {
                slot: slot.to_string(),
                parent,
                kind,
            });
        }
        if !parent.is_root() && state.tree.node_at(&parent).is_none() {
            return Err(StoreError::MissingNode(parent).into());
        }
        if state
            .pending
            .iter()
            .any(|p| p.parent.starts_with(&parent) || parent.starts_with(&p.parent))
        {
            return Err(SessionError::HydrationPending {
                slot: slot.to_string(),
                parent,
            });
        }

        state.pending.push(PendingHydration {
            ticket: serial,
            parent: parent.clone(),
            kind,
            ids: ids.clone(),
        });
        self.next_ticket += 1;
        info!(slot, parent = %parent, %kind, ?ids, "template hydration started");
        Ok(HydrationTicket {
            serial,
            epoch,
            slot: slot.to_string(),
            target,
            kind,
            ids,
        })
    }

    /// Settle a hydration with the fetch outcome for each selected id.
    ///
    /// Failed fetches are dropped and reported; the successes are hydrated
    /// in their original order and merged in one patch. Nothing changes if
    /// every fetch failed.
    pub fn complete_hydration(
        &mut self,
        ticket: HydrationTicket,
        results: Vec<(u64, Result<TemplateDocument, FetchError>)>,
    ) -> Result<Completion, SessionError> {
        if ticket.epoch != self.epoch {
            info!(slot = %ticket.slot, "discarding hydration from before reset");
            return Ok(Completion::Discarded);
        }
        let Some(state) = self.slots.get_mut(&ticket.slot) else {
            info!(slot = %ticket.slot, "discarding hydration for closed slot");
            return Ok(Completion::Discarded);
        };
        let Some(pos) = state.pending.iter().position(|p| p.ticket == ticket.serial) else {
            return Ok(Completion::Discarded);
        };
        state.pending.remove(pos);

        let mut docs = Vec::new();
        let mut dropped = Vec::new();
        for (id, result) in results {
            match result {
                Ok(doc) if doc.kind() == ticket.kind => docs.push(doc),
                Ok(doc) => {
                    warn!(slot = %ticket.slot, id, kind = %doc.kind(), "template of wrong kind dropped");
                    dropped.push(id);
                }
                Err(e) => {
                    warn!(slot = %ticket.slot, id, error = %e, "template fetch failed; dropped");
                    dropped.push(id);
                }
            }
        }
        if docs.is_empty() {
            return Ok(Completion::Applied(HydrationReport {
                added: Vec::new(),
                dropped,
            }));
        }

        let nodes = state.hydrator.hydrate_many(&docs)?;
        let added: Vec<NodeId> = nodes.iter().map(|n| n.id.clone()).collect();
        state.dispatch(&ticket.slot, |v| match &ticket.target {
            HydrationTarget::Replace => Ok(v.replace_all(nodes)),
            HydrationTarget::Append(parent) => v.append_children(parent, nodes),
        })?;
        info!(slot = %ticket.slot, added = added.len(), dropped = dropped.len(), "template hydration applied");
        Ok(Completion::Applied(HydrationReport { added, dropped }))
    }

    /// Begin, fetch settle-all from `source`, and complete in one call
    pub fn hydrate_from(
        &mut self,
        source: &dyn TemplateSource,
        slot: &str,
        target: HydrationTarget,
        kind: TemplateKind,
        ids: Vec<u64>,
    ) -> Result<Completion, SessionError> {
        let ticket = self.begin_hydration(slot, target, kind, ids)?;
        let results = fetch_all(source, kind, ticket.ids());
        self.complete_hydration(ticket, results)
    }
}
