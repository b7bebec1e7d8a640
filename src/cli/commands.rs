use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::model::coordinate::Coordinate;
use crate::model::template::TemplateKind;

#[derive(Parser)]
#[command(name = "pt", about = concat!("plantree v", env!("CARGO_PKG_VERSION"), " - edit nested project plans"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Run against a different project directory
    #[arg(short = 'C', long = "project-dir", global = true)]
    pub project_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new plantree project in the current directory
    Init(InitArgs),
    /// Show the draft as an outline
    Show(ShowArgs),
    /// Print the form field path for a node field or child collection
    Path(PathArgs),
    /// Read a field by its path
    Get(GetArgs),
    /// Write a field by its path
    Set(SetArgs),
    /// Append a blank node
    Add(AddArgs),
    /// Delete a node and its subtree
    Rm(RmArgs),
    /// Reorder a node within its list
    Mv(MvArgs),
    /// Add nodes built from templates
    Hydrate(HydrateArgs),
    /// List available templates of a kind
    Templates(TemplatesArgs),
    /// Replace a slot with existing server data
    Load(LoadArgs),
    /// Print the submission payload
    Submit(SubmitArgs),
    /// Show, import or clear validation errors
    Errors(ErrorsArgs),
    /// Discard the draft
    Reset,
}

// ---------------------------------------------------------------------------
// Init args
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, ValueEnum)]
pub enum PresetArg {
    /// Milestones tree plus a bare tasks tree
    Project,
    /// Bare tasks tree only
    Tasks,
}

#[derive(Args)]
pub struct InitArgs {
    /// Starting layout
    #[arg(long, value_enum, default_value = "project")]
    pub preset: PresetArg,
    /// Reinitialize even if plantree.toml already exists
    #[arg(long)]
    pub force: bool,
}

// ---------------------------------------------------------------------------
// Read command args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct ShowArgs {
    /// Slot to show (default: all slots)
    pub slot: Option<String>,
}

#[derive(Args)]
pub struct PathArgs {
    pub slot: String,
    /// Node coordinate, e.g. 2,0,1 (`root` for the top list)
    pub coordinate: Coordinate,
    /// Field name; without it, prints the path of the node's child list
    pub field: Option<String>,
}

#[derive(Args)]
pub struct GetArgs {
    pub slot: String,
    /// Field path, e.g. milestones[0].tasks[1].title
    pub path: String,
}

#[derive(Args)]
pub struct TemplatesArgs {
    /// milestone, task, step or checklist
    pub kind: TemplateKind,
}

#[derive(Args)]
pub struct SubmitArgs {
    /// Slot to submit (default: all slots)
    pub slot: Option<String>,
}

// ---------------------------------------------------------------------------
// Write command args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct SetArgs {
    pub slot: String,
    /// Field path, e.g. milestones[0].tasks[1].title
    pub path: String,
    /// New value as JSON; anything that is not valid JSON is taken as a string
    pub value: String,
}

#[derive(Args)]
pub struct AddArgs {
    pub slot: String,
    /// Parent coordinate (default: top list)
    #[arg(default_value = "root")]
    pub parent: Coordinate,
    /// Title for the new node
    #[arg(long)]
    pub title: Option<String>,
}

#[derive(Args)]
pub struct RmArgs {
    pub slot: String,
    pub coordinate: Coordinate,
}

#[derive(Args)]
pub struct MvArgs {
    pub slot: String,
    /// Parent of the list to reorder (`root` for the top list)
    pub parent: Coordinate,
    /// Current position
    pub from: usize,
    /// New position
    pub to: usize,
}

#[derive(Args)]
pub struct HydrateArgs {
    pub slot: String,
    /// milestone, task, step or checklist
    pub kind: TemplateKind,
    /// Template ids
    #[arg(required = true)]
    pub ids: Vec<u64>,
    /// Parent to append under (default: top list)
    #[arg(long, default_value = "root")]
    pub under: Coordinate,
    /// Replace the whole slot instead of appending
    #[arg(long, conflicts_with = "under")]
    pub replace: bool,
}

#[derive(Args)]
pub struct LoadArgs {
    pub slot: String,
    /// JSON file holding the slot's server data (an array of root nodes)
    pub file: String,
}

#[derive(Args)]
pub struct ErrorsArgs {
    /// Slot (default: all slots)
    pub slot: Option<String>,
    /// Import a server validation response from this JSON file
    #[arg(long, requires = "slot")]
    pub load: Option<String>,
    /// Clear the slot's errors
    #[arg(long, conflicts_with = "load")]
    pub clear: bool,
}
