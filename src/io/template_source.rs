use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::model::template::{TemplateDocument, TemplateKind};

/// Error type for fetching a single template
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{kind} template #{id} not found")]
    NotFound { kind: TemplateKind, id: u64 },
    #[error("could not read {path}: {source}")]
    ReadError { path: PathBuf, source: io::Error },
    #[error("could not parse {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("{path} holds template #{found}, expected #{expected}")]
    IdMismatch {
        path: PathBuf,
        expected: u64,
        found: u64,
    },
}

/// Where templates come from
pub trait TemplateSource {
    fn fetch_template(&self, kind: TemplateKind, id: u64) -> Result<TemplateDocument, FetchError>;
}

/// Fetch every id, keeping each outcome. One failure never stops the
/// others; results come back in the order of `ids`.
pub fn fetch_all(
    source: &dyn TemplateSource,
    kind: TemplateKind,
    ids: &[u64],
) -> Vec<(u64, Result<TemplateDocument, FetchError>)> {
    ids.iter()
        .map(|&id| (id, source.fetch_template(kind, id)))
        .collect()
}

/// Reads templates from `<root>/<kind>/<id>.json`, where `<kind>` is the
/// level name (`milestones`, `tasks`, `steps`, `checklists`)
#[derive(Debug, Clone)]
pub struct DirTemplateSource {
    root: PathBuf,
}

impl DirTemplateSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirTemplateSource { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn template_path(&self, kind: TemplateKind, id: u64) -> PathBuf {
        self.root.join(kind.level_name()).join(format!("{}.json", id))
    }

    /// Ids of every template of `kind` present on disk, sorted
    pub fn list(&self, kind: TemplateKind) -> Result<Vec<u64>, io::Error> {
        let dir = self.root.join(kind.level_name());
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
            {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}

impl TemplateSource for DirTemplateSource {
    fn fetch_template(&self, kind: TemplateKind, id: u64) -> Result<TemplateDocument, FetchError> {
        let path = self.template_path(kind, id);
        debug!(path = %path.display(), "fetching template");
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(FetchError::NotFound { kind, id });
            }
            Err(source) => return Err(FetchError::ReadError { path, source }),
        };
        let doc = TemplateDocument::from_json(kind, &text).map_err(|source| FetchError::ParseError {
            path: path.clone(),
            source,
        })?;
        if doc.id() != id {
            return Err(FetchError::IdMismatch {
                path,
                expected: id,
                found: doc.id(),
            });
        }
        Ok(doc)
    }
}
