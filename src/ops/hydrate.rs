use std::sync::Arc;

use serde_json::{Value, json};
use tracing::debug;

use crate::model::hierarchy::Hierarchy;
use crate::model::node::Node;
use crate::model::template::{
    ChecklistTemplate, MilestoneTemplate, StepTemplate, TaskTemplate, TemplateDocument,
    TemplateKind,
};

/// Error type for template hydration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HydrateError {
    #[error("{kind} templates have no level in this hierarchy (levels: {levels})")]
    NoLevelForKind { kind: TemplateKind, levels: String },
}

/// Borrowed view over a template at any level, so nested templates are
/// hydrated without cloning them into documents
#[derive(Clone, Copy)]
enum TemplateRef<'a> {
    Milestone(&'a MilestoneTemplate),
    Task(&'a TaskTemplate),
    Step(&'a StepTemplate),
    Checklist(&'a ChecklistTemplate),
}

impl<'a> TemplateRef<'a> {
    fn of(doc: &'a TemplateDocument) -> Self {
        match doc {
            TemplateDocument::Milestone(t) => TemplateRef::Milestone(t),
            TemplateDocument::Task(t) => TemplateRef::Task(t),
            TemplateDocument::Step(t) => TemplateRef::Step(t),
            TemplateDocument::Checklist(t) => TemplateRef::Checklist(t),
        }
    }

    fn kind(self) -> TemplateKind {
        match self {
            TemplateRef::Milestone(_) => TemplateKind::Milestone,
            TemplateRef::Task(_) => TemplateKind::Task,
            TemplateRef::Step(_) => TemplateKind::Step,
            TemplateRef::Checklist(_) => TemplateKind::Checklist,
        }
    }

    /// Template fields renamed onto node fields. Fields that only make
    /// sense on a live instance are never produced here.
    fn mapped_fields(self) -> Vec<(&'static str, Value)> {
        let note = |d: &Option<String>| json!(d.clone().unwrap_or_default());
        match self {
            TemplateRef::Milestone(t) => vec![("title", json!(t.name)), ("note", note(&t.description))],
            TemplateRef::Task(t) => vec![
                ("title", json!(t.name)),
                ("note", note(&t.description)),
                ("priority_id", json!(t.priority_id)),
            ],
            TemplateRef::Step(t) => vec![("title", json!(t.name)), ("note", note(&t.description))],
            TemplateRef::Checklist(t) => vec![("title", json!(t.name)), ("is_done", json!(false))],
        }
    }

    fn children(self) -> Vec<TemplateRef<'a>> {
        match self {
            TemplateRef::Milestone(t) => t.tasks.iter().map(TemplateRef::Task).collect(),
            TemplateRef::Task(t) => t.steps.iter().map(TemplateRef::Step).collect(),
            TemplateRef::Step(t) => t.checklists.iter().map(TemplateRef::Checklist).collect(),
            TemplateRef::Checklist(_) => Vec::new(),
        }
    }
}

/// Turns fetched templates into fresh, independently editable subtrees
#[derive(Debug, Clone)]
pub struct TemplateHydrator {
    hierarchy: Arc<Hierarchy>,
}

impl TemplateHydrator {
    pub fn new(hierarchy: Arc<Hierarchy>) -> Self {
        TemplateHydrator { hierarchy }
    }

    /// Hydrate one template into a node of the level matching its kind
    pub fn hydrate(&self, template: &TemplateDocument) -> Result<Node, HydrateError> {
        let kind = template.kind();
        let rank = self
            .hierarchy
            .rank(kind.level_name())
            .ok_or_else(|| HydrateError::NoLevelForKind {
                kind,
                levels: self.hierarchy.names().join(", "),
            })?;
        Ok(self.build(TemplateRef::of(template), rank))
    }

    /// Hydrate a batch, preserving order
    pub fn hydrate_many(&self, templates: &[TemplateDocument]) -> Result<Vec<Node>, HydrateError> {
        templates.iter().map(|t| self.hydrate(t)).collect()
    }

    fn build(&self, template: TemplateRef<'_>, rank: usize) -> Node {
        let schema = &self.hierarchy.levels()[rank];
        let mut node = Node::blank(schema);
        for (field, value) in template.mapped_fields() {
            node.set_declared(field, value);
        }

        let children = template.children();
        match self.hierarchy.child_level(rank) {
            Some(child) if children.iter().all(|c| c.kind().level_name() == child.name) => {
                for sub in children {
                    node.push_child(self.build(sub, rank + 1));
                }
            }
            _ if children.is_empty() => {}
            _ => {
                debug!(
                    level = %schema.name,
                    skipped = children.len(),
                    "template children have no matching child level; skipping"
                );
            }
        }
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::coordinate::Coordinate;
    use crate::model::node::Tree;
    use pretty_assertions::assert_eq;

    fn draft_review() -> TaskTemplate {
        TaskTemplate {
            id: 41,
            name: "Draft review".into(),
            description: Some("check grammar".into()),
            priority_id: Some(2),
            steps: vec![
                StepTemplate {
                    id: 1,
                    name: "Read".into(),
                    description: None,
                    checklists: vec![
                        ChecklistTemplate {
                            id: 10,
                            name: "Spelling".into(),
                        },
                        ChecklistTemplate {
                            id: 11,
                            name: "Tone".into(),
                        },
                    ],
                },
                StepTemplate {
                    id: 2,
                    name: "Annotate".into(),
                    description: Some("inline comments".into()),
                    checklists: vec![],
                },
            ],
        }
    }

    #[test]
    fn test_task_template_field_mapping() {
        let hydrator = TemplateHydrator::new(Arc::new(Hierarchy::project()));
        let node = hydrator
            .hydrate(&TemplateDocument::Task(draft_review()))
            .unwrap();

        assert_eq!(node.title(), "Draft review");
        assert_eq!(node.field("note"), Some(&json!("check grammar")));
        assert_eq!(node.field("priority_id"), Some(&json!(2)));
        assert_eq!(node.field("assignees"), Some(&json!([])));
        assert_eq!(node.field("controllers"), Some(&json!([])));
        assert_eq!(node.field("professions"), Some(&json!([])));
        assert_eq!(node.field("status_id"), Some(&Value::Null));
        assert_eq!(node.field("parent_task_id"), Some(&Value::Null));
        assert_eq!(node.server_id, None);
        assert_ne!(node.id.as_str(), "41");

        assert_eq!(node.children.len(), 2);
        let read = &node.children[0];
        assert_eq!(read.title(), "Read");
        assert_eq!(read.field("note"), Some(&json!("")));
        assert_eq!(read.field("assignee_id"), Some(&Value::Null));
        assert_eq!(read.children.len(), 2);
        assert_eq!(read.children[1].title(), "Tone");
        assert_eq!(read.children[1].field("is_done"), Some(&json!(false)));
        assert_eq!(node.children[1].field("note"), Some(&json!("inline comments")));
    }

    #[test]
    fn test_every_hydrated_node_gets_a_fresh_id() {
        let hydrator = TemplateHydrator::new(Arc::new(Hierarchy::project()));
        let doc = TemplateDocument::Task(draft_review());
        let a = hydrator.hydrate(&doc).unwrap();
        let b = hydrator.hydrate(&doc).unwrap();
        let tree = Tree::new(vec![a, b]);
        let mut ids = Vec::new();
        tree.walk(&mut |_, n| ids.push(n.id.clone()));
        let count = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), count);
        assert_eq!(count, 10);
        assert!(tree.node_at(&Coordinate::from([1, 0, 1])).is_some());
    }

    #[test]
    fn test_milestone_template_nests_tasks() {
        let hydrator = TemplateHydrator::new(Arc::new(Hierarchy::project()));
        let doc = TemplateDocument::Milestone(MilestoneTemplate {
            id: 3,
            name: "Onboarding".into(),
            description: None,
            tasks: vec![draft_review()],
        });
        let node = hydrator.hydrate(&doc).unwrap();
        assert_eq!(node.title(), "Onboarding");
        assert!(node.field("start_date").is_some());
        assert_eq!(node.children[0].title(), "Draft review");
        assert_eq!(node.children[0].children[0].children.len(), 2);
    }

    #[test]
    fn test_missing_child_level_drops_nested_templates() {
        let h = Hierarchy::standard(&["tasks", "steps"]).unwrap();
        let hydrator = TemplateHydrator::new(Arc::new(h));
        let node = hydrator
            .hydrate(&TemplateDocument::Task(draft_review()))
            .unwrap();
        assert_eq!(node.children.len(), 2);
        assert!(node.children[0].children.is_empty());
    }

    #[test]
    fn test_kind_without_level_fails() {
        let hydrator = TemplateHydrator::new(Arc::new(Hierarchy::tasks()));
        let doc = TemplateDocument::Milestone(MilestoneTemplate {
            id: 1,
            name: "M".into(),
            description: None,
            tasks: vec![],
        });
        assert!(matches!(
            hydrator.hydrate(&doc),
            Err(HydrateError::NoLevelForKind {
                kind: TemplateKind::Milestone,
                ..
            })
        ));
    }
}
