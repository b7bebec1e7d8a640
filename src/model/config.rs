use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::hierarchy::{FieldKind, Hierarchy, HierarchyError, LevelSchema};

/// Configuration from plantree.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorConfig {
    #[serde(default)]
    pub editor: EditorSettings,
    #[serde(default)]
    pub slots: Vec<SlotConfig>,
    /// Per-level field overrides; levels without an entry use the built-in schema
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub levels: IndexMap<String, LevelOverride>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorSettings {
    /// chrono format of dates as typed into the form
    #[serde(default = "default_date_input_format")]
    pub date_input_format: String,
    /// Directory holding `<kind>/<id>.json` template documents
    #[serde(default = "default_templates_dir")]
    pub templates_dir: String,
    /// File the CLI keeps the in-progress form value in
    #[serde(default = "default_draft_file")]
    pub draft_file: String,
}

impl Default for EditorSettings {
    fn default() -> Self {
        EditorSettings {
            date_input_format: default_date_input_format(),
            templates_dir: default_templates_dir(),
            draft_file: default_draft_file(),
        }
    }
}

fn default_date_input_format() -> String {
    "%d.%m.%Y".to_string()
}

fn default_templates_dir() -> String {
    "templates".to_string()
}

fn default_draft_file() -> String {
    "draft.json".to_string()
}

/// One named tree in the form, e.g. `milestones` or `tasks`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotConfig {
    pub name: String,
    pub levels: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LevelOverride {
    #[serde(default)]
    pub fields: IndexMap<String, FieldKind>,
}

/// Built-in starting points for `pt init`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// A milestones tree and a bare tasks tree side by side
    Project,
    /// A bare tasks tree only
    Tasks,
}

impl EditorConfig {
    pub fn preset(preset: Preset) -> Self {
        let tasks = SlotConfig {
            name: "tasks".into(),
            levels: vec!["tasks".into(), "steps".into(), "checklists".into()],
        };
        let slots = match preset {
            Preset::Project => vec![
                SlotConfig {
                    name: "milestones".into(),
                    levels: vec![
                        "milestones".into(),
                        "tasks".into(),
                        "steps".into(),
                        "checklists".into(),
                    ],
                },
                tasks,
            ],
            Preset::Tasks => vec![tasks],
        };
        EditorConfig {
            editor: EditorSettings::default(),
            slots,
            levels: IndexMap::new(),
        }
    }

    pub fn slot(&self, name: &str) -> Option<&SlotConfig> {
        self.slots.iter().find(|s| s.name == name)
    }

    /// Resolve the hierarchy a slot is edited with
    pub fn hierarchy_for(&self, slot: &SlotConfig) -> Result<Hierarchy, HierarchyError> {
        let levels = slot
            .levels
            .iter()
            .map(|name| match self.levels.get(name) {
                Some(o) if !o.fields.is_empty() => Ok(LevelSchema {
                    name: name.clone(),
                    fields: o.fields.clone(),
                }),
                _ => LevelSchema::standard(name)
                    .ok_or_else(|| HierarchyError::UnknownLevelSchema(name.clone())),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Hierarchy::new(levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config_uses_defaults() {
        let config: EditorConfig = toml::from_str(
            r#"
[[slots]]
name = "tasks"
levels = ["tasks", "steps"]
"#,
        )
        .unwrap();
        assert_eq!(config.editor.date_input_format, "%d.%m.%Y");
        assert_eq!(config.editor.templates_dir, "templates");
        let h = config.hierarchy_for(&config.slots[0]).unwrap();
        assert_eq!(h.names(), vec!["tasks", "steps"]);
    }

    #[test]
    fn test_level_override_replaces_fields() {
        let config: EditorConfig = toml::from_str(
            r#"
[[slots]]
name = "tasks"
levels = ["tasks", "subtasks"]

[levels.subtasks.fields]
title = "text"
estimate = "number"
"#,
        )
        .unwrap();
        let h = config.hierarchy_for(&config.slots[0]).unwrap();
        let sub = h.level(1).unwrap();
        assert_eq!(sub.field_kind("estimate"), Some(FieldKind::Number));
        assert!(!sub.has_field("note"));
    }

    #[test]
    fn test_unknown_level_without_override_fails() {
        let config = EditorConfig {
            slots: vec![SlotConfig {
                name: "x".into(),
                levels: vec!["phases".into()],
            }],
            ..EditorConfig::preset(Preset::Tasks)
        };
        let err = config.hierarchy_for(&config.slots[0]).unwrap_err();
        assert_eq!(err, HierarchyError::UnknownLevelSchema("phases".into()));
    }

    #[test]
    fn test_preset_round_trips_through_toml() {
        let config = EditorConfig::preset(Preset::Project);
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: EditorConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.slots, config.slots);
        assert!(parsed.slot("milestones").is_some());
    }
}
