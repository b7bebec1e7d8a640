use crate::model::coordinate::Coordinate;
use crate::ops::patch::{Patch, PatchError, PatchVocabulary};

/// The outcome of a drag gesture within one list
#[derive(Debug, Clone, PartialEq)]
pub enum Reorder {
    /// Nothing moved; no patch, no error-marker reset
    Noop,
    /// Apply this move
    Move(Patch),
}

/// The end of a drag gesture, independent of any drag library
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropResult {
    pub source: usize,
    /// `None` when the item was dropped outside any valid target
    pub destination: Option<usize>,
}

/// Interprets same-list drag results as moves
#[derive(Debug, Clone, Copy)]
pub struct ReorderController<'a> {
    vocab: &'a PatchVocabulary,
}

impl<'a> ReorderController<'a> {
    pub fn new(vocab: &'a PatchVocabulary) -> Self {
        ReorderController { vocab }
    }

    /// Reorder within the `level` collection under `parent`
    pub fn on_reorder(
        &self,
        level: &str,
        parent: &Coordinate,
        source: usize,
        destination: usize,
    ) -> Result<Reorder, PatchError> {
        let ops = self.vocab.level(level)?;
        if source == destination {
            return Ok(Reorder::Noop);
        }
        Ok(Reorder::Move(ops.move_item(parent, source, destination)?))
    }

    pub fn on_drop(&self, level: &str, parent: &Coordinate, drop: DropResult) -> Result<Reorder, PatchError> {
        match drop.destination {
            Some(destination) => self.on_reorder(level, parent, drop.source, destination),
            None => {
                self.vocab.level(level)?;
                Ok(Reorder::Noop)
            }
        }
    }
}
