use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error type for building a hierarchy definition
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HierarchyError {
    #[error("hierarchy must declare at least one level")]
    Empty,
    #[error("duplicate level name: {0}")]
    DuplicateLevel(String),
    #[error("no built-in schema for level {0}; declare its fields in [levels.{0}.fields]")]
    UnknownLevelSchema(String),
}

/// The kind of a declared field, which decides its blank value and how it
/// is reshaped on submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Free text
    Text,
    /// A date string in the editor's input format
    Date,
    /// A single relation: a bare id or an `{ "id": .., .. }` object
    Ref,
    /// A list of relations
    RefList,
    /// A boolean
    Flag,
    /// A number
    Number,
}

impl FieldKind {
    /// The value a field of this kind takes on a blank node
    pub fn blank_value(self) -> Value {
        match self {
            FieldKind::Text => Value::String(String::new()),
            FieldKind::Date | FieldKind::Ref | FieldKind::Number => Value::Null,
            FieldKind::RefList => Value::Array(Vec::new()),
            FieldKind::Flag => Value::Bool(false),
        }
    }

    /// Does `value` have the JSON shape this kind stores? `null` clears
    /// every kind except flags.
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (FieldKind::Flag, v) => v.is_boolean(),
            (_, Value::Null) => true,
            (FieldKind::Text | FieldKind::Date, v) => v.is_string(),
            (FieldKind::Number, v) => v.is_number(),
            (FieldKind::Ref, v) => is_ref(v),
            (FieldKind::RefList, Value::Array(items)) => items.iter().all(is_ref),
            (FieldKind::RefList, _) => false,
        }
    }

    /// Turn raw user input into a value of this kind. Text is taken
    /// literally; every other kind is read as JSON, with an empty date
    /// meaning no date.
    pub fn parse_input(self, raw: &str) -> Option<Value> {
        let value = match self {
            FieldKind::Text => return Some(Value::String(raw.to_string())),
            FieldKind::Date if raw.is_empty() => Value::Null,
            FieldKind::Date => serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())),
            _ => serde_json::from_str(raw).ok()?,
        };
        self.accepts(&value).then_some(value)
    }
}

/// A relation is a bare id or an object carrying one
fn is_ref(value: &Value) -> bool {
    match value {
        Value::Number(_) | Value::String(_) => true,
        Value::Object(obj) => obj.contains_key("id"),
        _ => false,
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Text => "text",
            FieldKind::Date => "date",
            FieldKind::Ref => "ref",
            FieldKind::RefList => "ref_list",
            FieldKind::Flag => "flag",
            FieldKind::Number => "number",
        };
        f.write_str(name)
    }
}

/// One level of a hierarchy: its collection name and declared fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSchema {
    pub name: String,
    pub fields: IndexMap<String, FieldKind>,
}

impl LevelSchema {
    pub fn new(name: impl Into<String>, fields: &[(&str, FieldKind)]) -> Self {
        LevelSchema {
            name: name.into(),
            fields: fields
                .iter()
                .map(|(field, kind)| (field.to_string(), *kind))
                .collect(),
        }
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn field_kind(&self, field: &str) -> Option<FieldKind> {
        self.fields.get(field).copied()
    }

    /// Built-in schema for the standard project levels
    pub fn standard(name: &str) -> Option<LevelSchema> {
        use FieldKind::*;
        let schema = match name {
            "milestones" => LevelSchema::new(
                name,
                &[
                    ("title", Text),
                    ("note", Text),
                    ("start_date", Date),
                    ("end_date", Date),
                ],
            ),
            "tasks" => LevelSchema::new(
                name,
                &[
                    ("title", Text),
                    ("note", Text),
                    ("status_id", Ref),
                    ("priority_id", Ref),
                    ("assignees", RefList),
                    ("controllers", RefList),
                    ("professions", RefList),
                    ("start_date", Date),
                    ("end_date", Date),
                    ("parent_task_id", Ref),
                ],
            ),
            "steps" => LevelSchema::new(
                name,
                &[
                    ("title", Text),
                    ("note", Text),
                    ("status_id", Ref),
                    ("assignee_id", Ref),
                    ("due_date", Date),
                ],
            ),
            "checklists" => LevelSchema::new(name, &[("title", Text), ("is_done", Flag)]),
            _ => return None,
        };
        Some(schema)
    }
}

/// The fixed nesting shape of one editing session's tree.
///
/// Rank 0 is the root collection; a node at rank `i` owns a child
/// collection of rank `i + 1` unless it sits at the deepest rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawHierarchy")]
pub struct Hierarchy {
    levels: Vec<LevelSchema>,
}

#[derive(Deserialize)]
struct RawHierarchy {
    levels: Vec<LevelSchema>,
}

impl TryFrom<RawHierarchy> for Hierarchy {
    type Error = HierarchyError;

    fn try_from(raw: RawHierarchy) -> Result<Self, Self::Error> {
        Hierarchy::new(raw.levels)
    }
}

impl Hierarchy {
    pub fn new(levels: Vec<LevelSchema>) -> Result<Self, HierarchyError> {
        if levels.is_empty() {
            return Err(HierarchyError::Empty);
        }
        for (i, level) in levels.iter().enumerate() {
            if levels[..i].iter().any(|l| l.name == level.name) {
                return Err(HierarchyError::DuplicateLevel(level.name.clone()));
            }
        }
        Ok(Hierarchy { levels })
    }

    /// Build a hierarchy from level names using the built-in schemas
    pub fn standard(names: &[&str]) -> Result<Self, HierarchyError> {
        let levels = names
            .iter()
            .map(|name| {
                LevelSchema::standard(name)
                    .ok_or_else(|| HierarchyError::UnknownLevelSchema(name.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Hierarchy::new(levels)
    }

    /// `milestones → tasks → steps → checklists`
    pub fn project() -> Self {
        Hierarchy::standard(&["milestones", "tasks", "steps", "checklists"])
            .unwrap_or_else(|_| unreachable!("standard project levels are built in"))
    }

    /// `tasks → steps → checklists`, for forms without milestones
    pub fn tasks() -> Self {
        Hierarchy::standard(&["tasks", "steps", "checklists"])
            .unwrap_or_else(|_| unreachable!("standard task levels are built in"))
    }

    /// Number of levels
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    pub fn levels(&self) -> &[LevelSchema] {
        &self.levels
    }

    pub fn level(&self, rank: usize) -> Option<&LevelSchema> {
        self.levels.get(rank)
    }

    pub fn rank(&self, name: &str) -> Option<usize> {
        self.levels.iter().position(|l| l.name == name)
    }

    pub fn root(&self) -> &LevelSchema {
        &self.levels[0]
    }

    /// The level whose nodes live under a node of `rank`
    pub fn child_level(&self, rank: usize) -> Option<&LevelSchema> {
        self.levels.get(rank + 1)
    }

    pub fn names(&self) -> Vec<&str> {
        self.levels.iter().map(|l| l.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_project_hierarchy_ranks() {
        let h = Hierarchy::project();
        assert_eq!(h.depth(), 4);
        assert_eq!(h.rank("milestones"), Some(0));
        assert_eq!(h.rank("checklists"), Some(3));
        assert_eq!(h.rank("projects"), None);
        assert_eq!(h.child_level(1).map(|l| l.name.as_str()), Some("steps"));
        assert!(h.child_level(3).is_none());
    }

    #[test]
    fn test_empty_hierarchy_rejected() {
        assert_eq!(Hierarchy::new(Vec::new()), Err(HierarchyError::Empty));
    }

    #[test]
    fn test_duplicate_level_rejected() {
        let result = Hierarchy::standard(&["tasks", "steps", "tasks"]);
        assert_eq!(result, Err(HierarchyError::DuplicateLevel("tasks".into())));
    }

    #[test]
    fn test_unknown_standard_level() {
        let result = Hierarchy::standard(&["tasks", "subtasks"]);
        assert_eq!(
            result,
            Err(HierarchyError::UnknownLevelSchema("subtasks".into()))
        );
    }

    #[test]
    fn test_blank_values() {
        assert_eq!(FieldKind::Text.blank_value(), Value::String(String::new()));
        assert_eq!(FieldKind::RefList.blank_value(), Value::Array(vec![]));
        assert_eq!(FieldKind::Flag.blank_value(), Value::Bool(false));
        assert_eq!(FieldKind::Date.blank_value(), Value::Null);
    }

    #[test]
    fn test_deserialize_checks_levels() {
        let h = Hierarchy::tasks();
        let text = serde_json::to_string(&h).unwrap();
        assert_eq!(serde_json::from_str::<Hierarchy>(&text).unwrap(), h);

        assert!(serde_json::from_str::<Hierarchy>(r#"{"levels": []}"#).is_err());
        let dup = r#"{"levels": [{"name": "a", "fields": {}}, {"name": "a", "fields": {}}]}"#;
        assert!(serde_json::from_str::<Hierarchy>(dup).is_err());
    }

    #[test]
    fn test_field_kind_accepts() {
        assert!(FieldKind::Text.accepts(&json!("2025")));
        assert!(!FieldKind::Text.accepts(&json!(2025)));
        assert!(FieldKind::Date.accepts(&Value::Null));
        assert!(FieldKind::Ref.accepts(&json!({"id": 4, "name": "Ann"})));
        assert!(!FieldKind::Ref.accepts(&json!({"name": "Ann"})));
        assert!(FieldKind::RefList.accepts(&json!([1, {"id": 2}])));
        assert!(!FieldKind::RefList.accepts(&json!(1)));
        assert!(!FieldKind::Flag.accepts(&Value::Null));
        assert!(FieldKind::Number.accepts(&json!(3.5)));
    }

    #[test]
    fn test_field_kind_parse_input() {
        assert_eq!(FieldKind::Text.parse_input("2025"), Some(json!("2025")));
        assert_eq!(FieldKind::Text.parse_input("true"), Some(json!("true")));
        assert_eq!(FieldKind::Date.parse_input("01.03.2025"), Some(json!("01.03.2025")));
        assert_eq!(FieldKind::Date.parse_input(""), Some(Value::Null));
        assert_eq!(FieldKind::Flag.parse_input("true"), Some(json!(true)));
        assert_eq!(FieldKind::Flag.parse_input("yes"), None);
        assert_eq!(FieldKind::RefList.parse_input("[3, 4]"), Some(json!([3, 4])));
        assert_eq!(FieldKind::Number.parse_input("abc"), None);
    }
}
