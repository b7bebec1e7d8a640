use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::io::config_io::{self, ConfigError};
use crate::model::config::EditorConfig;
use crate::model::node::Tree;
use crate::model::validation::ErrorTree;
use crate::ops::session::{EditorSession, SessionError};

/// Error type for reading and writing the draft file
#[derive(Debug, thiserror::Error)]
pub enum DraftError {
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("could not serialize draft: {0}")]
    SerializeError(#[from] serde_json::Error),
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// The in-progress form value, one entry per slot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftFile {
    #[serde(default)]
    pub slots: IndexMap<String, DraftSlot>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftSlot {
    #[serde(default)]
    pub tree: Tree,
    #[serde(default, skip_serializing_if = "ErrorTree::is_empty")]
    pub errors: ErrorTree,
}

pub fn draft_path(root: &Path, config: &EditorConfig) -> PathBuf {
    root.join(&config.editor.draft_file)
}

/// Read the draft; a missing file is an empty draft.
pub fn read_draft(path: &Path) -> Result<DraftFile, DraftError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no draft yet");
            return Ok(DraftFile::default());
        }
        Err(source) => {
            return Err(DraftError::ReadError {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_str(&text).map_err(|source| DraftError::ParseError {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_draft(path: &Path, draft: &DraftFile) -> Result<(), DraftError> {
    let mut text = serde_json::to_string_pretty(draft)?;
    text.push('\n');
    config_io::atomic_write(path, text.as_bytes())?;
    Ok(())
}

/// Open a session with every configured slot, restoring saved trees and
/// errors where the draft has them
pub fn open_session(config: &EditorConfig, mut draft: DraftFile) -> Result<EditorSession, DraftError> {
    let mut session = EditorSession::new();
    for (name, hierarchy) in config_io::slot_hierarchies(config)? {
        match draft.slots.shift_remove(&name) {
            Some(saved) => session.restore_slot(&name, hierarchy, saved.tree, saved.errors)?,
            None => session.open_slot(&name, hierarchy)?,
        }
    }
    for name in draft.slots.keys() {
        warn!(slot = %name, "draft slot is not configured; ignoring it");
    }
    Ok(session)
}

/// Capture every slot of `session` for saving
pub fn snapshot(session: &EditorSession) -> Result<DraftFile, DraftError> {
    let mut slots = IndexMap::new();
    for name in session.slot_names() {
        let slot = session.slot(name)?;
        slots.insert(
            name.to_string(),
            DraftSlot {
                tree: slot.tree().clone(),
                errors: slot.errors().clone(),
            },
        );
    }
    Ok(DraftFile { slots })
}
