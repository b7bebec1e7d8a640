use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::model::config::EditorConfig;
use crate::model::hierarchy::{Hierarchy, HierarchyError};

pub const CONFIG_FILE: &str = "plantree.toml";

/// Error type for project configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("not a plantree project: no {CONFIG_FILE} found")]
    NotAProject,
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse {CONFIG_FILE}: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("could not serialize {CONFIG_FILE}: {0}")]
    SerializeError(#[from] toml::ser::Error),
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("slot {slot}: {source}")]
    Hierarchy {
        slot: String,
        source: HierarchyError,
    },
}

/// Find the project root by walking up from `start`, looking for
/// `plantree.toml`.
pub fn discover_project(start: &Path) -> Result<PathBuf, ConfigError> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CONFIG_FILE).is_file() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(ConfigError::NotAProject);
        }
    }
}

/// Read and check the project config: every slot must resolve to a
/// valid hierarchy.
pub fn read_config(root: &Path) -> Result<EditorConfig, ConfigError> {
    let config_path = root.join(CONFIG_FILE);
    let config_text = fs::read_to_string(&config_path).map_err(|e| ConfigError::ReadError {
        path: config_path.clone(),
        source: e,
    })?;
    let config: EditorConfig = toml::from_str(&config_text)?;
    slot_hierarchies(&config)?;
    Ok(config)
}

/// Write the config atomically.
pub fn write_config(root: &Path, config: &EditorConfig) -> Result<(), ConfigError> {
    let text = toml::to_string_pretty(config)?;
    atomic_write(&root.join(CONFIG_FILE), text.as_bytes())?;
    Ok(())
}

/// Each configured slot paired with its hierarchy, in config order
pub fn slot_hierarchies(config: &EditorConfig) -> Result<Vec<(String, Hierarchy)>, ConfigError> {
    config
        .slots
        .iter()
        .map(|slot| {
            config
                .hierarchy_for(slot)
                .map(|h| (slot.name.clone(), h))
                .map_err(|source| ConfigError::Hierarchy {
                    slot: slot.name.clone(),
                    source,
                })
        })
        .collect()
}

/// Write to a temp file in the same directory, then rename over `path`.
pub fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config::Preset;
    use tempfile::TempDir;

    #[test]
    fn test_discover_walks_up() {
        let tmp = TempDir::new().unwrap();
        write_config(tmp.path(), &EditorConfig::preset(Preset::Tasks)).unwrap();
        let nested = tmp.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();
        assert_eq!(discover_project(&nested).unwrap(), tmp.path());
    }

    #[test]
    fn test_discover_outside_project() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            discover_project(tmp.path()),
            Err(ConfigError::NotAProject)
        ));
    }

    #[test]
    fn test_write_then_read() {
        let tmp = TempDir::new().unwrap();
        write_config(tmp.path(), &EditorConfig::preset(Preset::Project)).unwrap();
        let config = read_config(tmp.path()).unwrap();
        let names: Vec<&str> = config.slots.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["milestones", "tasks"]);
        assert_eq!(config.editor.draft_file, "draft.json");
    }

    #[test]
    fn test_read_rejects_unknown_level() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILE),
            "[[slots]]\nname = \"phases\"\nlevels = [\"phases\"]\n",
        )
        .unwrap();
        let err = read_config(tmp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Hierarchy { slot, .. } if slot == "phases"));
    }

    #[test]
    fn test_level_override_from_toml() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILE),
            r#"
[[slots]]
name = "phases"
levels = ["phases", "checklists"]

[levels.phases.fields]
title = "text"
deadline = "date"
"#,
        )
        .unwrap();
        let config = read_config(tmp.path()).unwrap();
        let slots = slot_hierarchies(&config).unwrap();
        let (name, h) = &slots[0];
        assert_eq!(name, "phases");
        assert_eq!(h.names(), vec!["phases", "checklists"]);
        assert!(h.root().has_field("deadline"));
    }
}
