//! Behavioral properties of the nested-collection editor, exercised through
//! the public library API.

use std::sync::Arc;

use plantree::io::template_source::{FetchError, TemplateSource};
use plantree::model::coordinate::Coordinate;
use plantree::model::hierarchy::Hierarchy;
use plantree::model::node::{Node, Tree};
use plantree::model::template::{
    ChecklistTemplate, StepTemplate, TaskTemplate, TemplateDocument, TemplateKind,
};
use plantree::model::validation::ErrorTree;
use plantree::ops::hydrate::TemplateHydrator;
use plantree::ops::patch::PatchVocabulary;
use plantree::ops::path::field_path;
use plantree::ops::reorder::{Reorder, ReorderController};
use plantree::ops::session::{Completion, EditorSession, HydrationTarget};
use plantree::ops::tree_store::TreeStore;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

fn titled(h: &Hierarchy, rank: usize, title: &str) -> Node {
    let mut n = Node::blank(h.level(rank).unwrap());
    n.set_declared("title", json!(title));
    n
}

/// Two milestones: M0 with tasks T00 (one step) and T01, M1 with three tasks
fn sample_tree(h: &Hierarchy) -> Tree {
    let mut m0 = titled(h, 0, "M0");
    let mut t00 = titled(h, 1, "T00");
    t00.push_child(titled(h, 2, "S000"));
    m0.push_child(t00);
    m0.push_child(titled(h, 1, "T01"));
    let mut m1 = titled(h, 0, "M1");
    for t in ["T10", "T11", "T12"] {
        m1.push_child(titled(h, 1, t));
    }
    Tree::new(vec![m0, m1])
}

/// Every node behind an `Arc` in the tree, depth-first
fn all_arcs(nodes: &[Arc<Node>], out: &mut Vec<Arc<Node>>) {
    for node in nodes {
        out.push(node.clone());
        all_arcs(&node.children, out);
    }
}

fn titles(nodes: &[Arc<Node>]) -> Vec<&str> {
    nodes.iter().map(|n| n.title()).collect()
}

fn draft_review() -> TaskTemplate {
    TaskTemplate {
        id: 500,
        name: "Draft review".into(),
        description: Some("check grammar".into()),
        priority_id: None,
        steps: vec![StepTemplate {
            id: 501,
            name: "Read through".into(),
            description: Some("slowly".into()),
            checklists: vec![ChecklistTemplate {
                id: 502,
                name: "Spelling".into(),
            }],
        }],
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

#[test]
fn test_path_determinism() {
    let h = Hierarchy::standard(&["milestones", "tasks"]).unwrap();
    let at = Coordinate::from([1, 2]);
    let first = field_path(&h, "tasks", &at, "title").unwrap();
    for _ in 0..10 {
        assert_eq!(field_path(&h, "tasks", &at, "title").unwrap(), first);
    }
    assert_eq!(first, "milestones[1].tasks[2].title");
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[test]
fn test_apply_never_mutates_input() {
    let h = Arc::new(Hierarchy::project());
    let vocab = PatchVocabulary::new(h.clone());
    let store = TreeStore::new(h.clone());
    let tree = sample_tree(&h);
    let snapshot = tree.clone();
    let mut before = Vec::new();
    all_arcs(tree.roots(), &mut before);

    let patches = vec![
        vocab.delete_at(&Coordinate::from([0, 0])).unwrap(),
        vocab.move_within_parent(&Coordinate::from([1]), 2, 0).unwrap(),
        vocab
            .append_children(&Coordinate::from([0, 0]), vec![titled(&h, 2, "new")])
            .unwrap(),
        vocab
            .set_field(&Coordinate::from([1, 1]), "note", json!("edited"))
            .unwrap(),
        vocab.replace_all(vec![]),
    ];
    for patch in &patches {
        store.apply(&tree, patch).unwrap();
    }

    let mut after = Vec::new();
    all_arcs(tree.roots(), &mut after);
    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(&after) {
        assert!(Arc::ptr_eq(b, a));
    }
    assert_eq!(tree, snapshot);
}

#[test]
fn test_move_round_trip() {
    let h = Arc::new(Hierarchy::project());
    let vocab = PatchVocabulary::new(h.clone());
    let store = TreeStore::new(h.clone());
    let tree = sample_tree(&h);
    let parent = Coordinate::from([1]);

    let there = store
        .apply(&tree, &vocab.move_within_parent(&parent, 2, 0).unwrap())
        .unwrap();
    assert_eq!(titles(&there.roots()[1].children), vec!["T12", "T10", "T11"]);
    let back = store
        .apply(&there, &vocab.move_within_parent(&parent, 0, 2).unwrap())
        .unwrap();
    assert_eq!(back, tree);
}

#[test]
fn test_append_preserves_everything_outside_parent() {
    let h = Arc::new(Hierarchy::project());
    let vocab = PatchVocabulary::new(h.clone());
    let store = TreeStore::new(h.clone());
    let tree = sample_tree(&h);

    let patch = vocab
        .append_children(&Coordinate::from([1]), vec![titled(&h, 1, "T13")])
        .unwrap();
    let next = store.apply(&tree, &patch).unwrap();

    assert_eq!(next.roots()[0], tree.roots()[0]);
    assert!(Arc::ptr_eq(&next.roots()[0], &tree.roots()[0]));
    assert_eq!(
        titles(&next.roots()[1].children),
        vec!["T10", "T11", "T12", "T13"]
    );
    for i in 0..3 {
        assert!(Arc::ptr_eq(
            &next.roots()[1].children[i],
            &tree.roots()[1].children[i]
        ));
    }
    assert_eq!(next.roots()[1].fields, tree.roots()[1].fields);
}

// ---------------------------------------------------------------------------
// Hydration
// ---------------------------------------------------------------------------

fn assert_blank_relations(node: &Node) {
    for field in ["assignees", "controllers", "professions"] {
        assert_eq!(node.field(field), Some(&json!([])), "{}", field);
    }
    for field in ["status_id", "start_date", "end_date", "parent_task_id"] {
        assert_eq!(node.field(field), Some(&Value::Null), "{}", field);
    }
}

#[test]
fn test_hydration_field_mapping() {
    let hydrator = TemplateHydrator::new(Arc::new(Hierarchy::tasks()));
    let template = draft_review();
    let task = hydrator
        .hydrate(&TemplateDocument::Task(template.clone()))
        .unwrap();

    assert_eq!(task.title(), "Draft review");
    assert_eq!(task.field("note"), Some(&json!("check grammar")));
    assert_ne!(task.id.as_str(), template.id.to_string());
    assert_eq!(task.server_id, None);
    assert_blank_relations(&task);

    assert_eq!(task.children.len(), template.steps.len());
    let step = &task.children[0];
    assert_eq!(step.title(), "Read through");
    assert_eq!(step.field("note"), Some(&json!("slowly")));
    assert_eq!(step.field("assignee_id"), Some(&Value::Null));
    assert_eq!(step.field("due_date"), Some(&Value::Null));
    assert_ne!(step.id, task.id);

    assert_eq!(step.children.len(), 1);
    let item = &step.children[0];
    assert_eq!(item.title(), "Spelling");
    assert_eq!(item.field("is_done"), Some(&json!(false)));
    assert!(item.children.is_empty());
}

/// Serves tasks by id, failing for the ids it is told to fail
struct FlakySource {
    failing: Vec<u64>,
}

impl TemplateSource for FlakySource {
    fn fetch_template(&self, kind: TemplateKind, id: u64) -> Result<TemplateDocument, FetchError> {
        if self.failing.contains(&id) {
            return Err(FetchError::NotFound { kind, id });
        }
        Ok(TemplateDocument::Task(TaskTemplate {
            id,
            name: format!("Template {}", id),
            description: None,
            priority_id: None,
            steps: vec![],
        }))
    }
}

#[test]
fn test_partial_hydration_keeps_successes_in_order() {
    let mut session = EditorSession::new();
    session.open_slot("tasks", Hierarchy::tasks()).unwrap();
    let source = FlakySource { failing: vec![2] };

    let completion = session
        .hydrate_from(
            &source,
            "tasks",
            HydrationTarget::Append(Coordinate::root()),
            TemplateKind::Task,
            vec![1, 2, 3],
        )
        .unwrap();

    let Completion::Applied(report) = completion else {
        panic!("expected the hydration to apply");
    };
    assert_eq!(report.added.len(), 2);
    assert_eq!(report.dropped, vec![2]);
    let tree = session.tree("tasks").unwrap();
    assert_eq!(titles(tree.roots()), vec!["Template 1", "Template 3"]);
    assert_eq!(tree.roots()[0].id, report.added[0]);
}

// ---------------------------------------------------------------------------
// Reorder
// ---------------------------------------------------------------------------

#[test]
fn test_noop_reorder_guard() {
    let h = Hierarchy::project();
    let vocab = PatchVocabulary::new(Arc::new(h.clone()));
    assert_eq!(
        ReorderController::new(&vocab)
            .on_reorder("tasks", &Coordinate::from([1]), 1, 1)
            .unwrap(),
        Reorder::Noop
    );

    let mut session = EditorSession::new();
    session
        .restore_slot("milestones", h.clone(), sample_tree(&h), ErrorTree::new())
        .unwrap();
    let mut errors = ErrorTree::new();
    errors.insert(&Coordinate::from([1, 1]), "title", "required");
    session.set_errors("milestones", errors.clone()).unwrap();
    let before = session.tree("milestones").unwrap().clone();

    let moved = session
        .reorder("milestones", "tasks", &Coordinate::from([1]), 1, 1)
        .unwrap();

    assert!(!moved);
    assert_eq!(session.errors("milestones").unwrap(), &errors);
    // No new tree was produced: every root is the same allocation
    let after = session.tree("milestones").unwrap();
    for (b, a) in before.roots().iter().zip(after.roots()) {
        assert!(Arc::ptr_eq(b, a));
    }
}

#[test]
fn test_real_reorder_clears_only_that_collection() {
    let h = Hierarchy::project();
    let mut session = EditorSession::new();
    session
        .restore_slot("milestones", h.clone(), sample_tree(&h), ErrorTree::new())
        .unwrap();
    let mut errors = ErrorTree::new();
    errors.insert(&Coordinate::from([1, 1]), "title", "required");
    errors.insert(&Coordinate::from([0, 0]), "title", "required");
    session.set_errors("milestones", errors).unwrap();

    assert!(session
        .reorder("milestones", "tasks", &Coordinate::from([1]), 0, 2)
        .unwrap());
    let errors = session.errors("milestones").unwrap();
    assert!(!errors.collection_has_errors(&Coordinate::from([1])));
    assert!(errors.has_errors(&Coordinate::from([0, 0])));
}
