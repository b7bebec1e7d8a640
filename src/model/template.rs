use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which kind of template a document is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    Milestone,
    Task,
    Step,
    Checklist,
}

impl TemplateKind {
    /// The hierarchy level that nodes hydrated from this kind belong to
    pub fn level_name(self) -> &'static str {
        match self {
            TemplateKind::Milestone => "milestones",
            TemplateKind::Task => "tasks",
            TemplateKind::Step => "steps",
            TemplateKind::Checklist => "checklists",
        }
    }

    pub fn for_level(level: &str) -> Option<TemplateKind> {
        match level {
            "milestones" => Some(TemplateKind::Milestone),
            "tasks" => Some(TemplateKind::Task),
            "steps" => Some(TemplateKind::Step),
            "checklists" => Some(TemplateKind::Checklist),
            _ => None,
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateKind::Milestone => write!(f, "milestone"),
            TemplateKind::Task => write!(f, "task"),
            TemplateKind::Step => write!(f, "step"),
            TemplateKind::Checklist => write!(f, "checklist"),
        }
    }
}

impl FromStr for TemplateKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "milestone" | "milestones" => Ok(TemplateKind::Milestone),
            "task" | "tasks" => Ok(TemplateKind::Task),
            "step" | "steps" => Ok(TemplateKind::Step),
            "checklist" | "checklists" => Ok(TemplateKind::Checklist),
            other => Err(format!(
                "unknown template kind '{}' (expected milestone, task, step or checklist)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneTemplate {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tasks: Vec<TaskTemplate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority_id: Option<u64>,
    #[serde(default)]
    pub steps: Vec<StepTemplate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTemplate {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub checklists: Vec<ChecklistTemplate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistTemplate {
    pub id: u64,
    pub name: String,
}

/// A fetched, read-only template of any kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateDocument {
    Milestone(MilestoneTemplate),
    Task(TaskTemplate),
    Step(StepTemplate),
    Checklist(ChecklistTemplate),
}

impl TemplateDocument {
    /// Parse a template body whose kind is known from where it was fetched
    pub fn from_json(kind: TemplateKind, text: &str) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            TemplateKind::Milestone => TemplateDocument::Milestone(serde_json::from_str(text)?),
            TemplateKind::Task => TemplateDocument::Task(serde_json::from_str(text)?),
            TemplateKind::Step => TemplateDocument::Step(serde_json::from_str(text)?),
            TemplateKind::Checklist => TemplateDocument::Checklist(serde_json::from_str(text)?),
        })
    }

    pub fn kind(&self) -> TemplateKind {
        match self {
            TemplateDocument::Milestone(_) => TemplateKind::Milestone,
            TemplateDocument::Task(_) => TemplateKind::Task,
            TemplateDocument::Step(_) => TemplateKind::Step,
            TemplateDocument::Checklist(_) => TemplateKind::Checklist,
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            TemplateDocument::Milestone(t) => t.id,
            TemplateDocument::Task(t) => t.id,
            TemplateDocument::Step(t) => t.id,
            TemplateDocument::Checklist(t) => t.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            TemplateDocument::Milestone(t) => &t.name,
            TemplateDocument::Task(t) => &t.name,
            TemplateDocument::Step(t) => &t.name,
            TemplateDocument::Checklist(t) => &t.name,
        }
    }
}
