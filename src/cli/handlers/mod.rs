mod init;
pub use init::cmd_init;

use std::fs;
use std::path::PathBuf;

use serde_json::{Map, Value, json};
use tracing::debug;

use crate::cli::commands::*;
use crate::cli::output::*;
use crate::io::config_io;
use crate::io::draft_io::{self, DraftError};
use crate::io::template_source::{DirTemplateSource, TemplateSource};
use crate::model::config::EditorConfig;
use crate::model::coordinate::Coordinate;
use crate::model::hierarchy::Hierarchy;
use crate::model::validation::ErrorTree;
use crate::ops::session::{Completion, EditorSession, HydrationTarget};
use crate::ops::submit::{self, SubmitOptions};
use crate::ops::validation;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn dispatch(cli: Cli) -> CmdResult {
    let json = cli.json;
    let project_dir = cli.project_dir;

    if let Commands::Init(args) = cli.command {
        return cmd_init(args, project_dir.as_deref());
    }

    let mut project = load_project(project_dir.as_deref())?;
    match cli.command {
        Commands::Init(_) => Ok(()),

        // Read commands
        Commands::Show(args) => cmd_show(&project, args, json),
        Commands::Path(args) => cmd_path(&project, args, json),
        Commands::Get(args) => cmd_get(&project, args, json),
        Commands::Templates(args) => cmd_templates(&project, args, json),
        Commands::Submit(args) => cmd_submit(&project, args),

        // Write commands
        Commands::Set(args) => cmd_set(&mut project, args),
        Commands::Add(args) => cmd_add(&mut project, args, json),
        Commands::Rm(args) => cmd_rm(&mut project, args),
        Commands::Mv(args) => cmd_mv(&mut project, args),
        Commands::Hydrate(args) => cmd_hydrate(&mut project, args, json),
        Commands::Load(args) => cmd_load(&mut project, args),
        Commands::Errors(args) => cmd_errors(&mut project, args, json),
        Commands::Reset => cmd_reset(&mut project),
    }
}

// ---------------------------------------------------------------------------
// Project context
// ---------------------------------------------------------------------------

/// A discovered project with its draft opened as a session
struct Project {
    root: PathBuf,
    config: EditorConfig,
    session: EditorSession,
    draft_path: PathBuf,
}

impl Project {
    fn save(&self) -> Result<(), DraftError> {
        draft_io::write_draft(&self.draft_path, &draft_io::snapshot(&self.session)?)
    }

    fn templates(&self) -> DirTemplateSource {
        DirTemplateSource::new(self.root.join(&self.config.editor.templates_dir))
    }

    fn submit_options(&self) -> SubmitOptions {
        SubmitOptions::from(&self.config.editor)
    }

    fn hierarchy(&self, slot: &str) -> Result<&Hierarchy, Box<dyn std::error::Error>> {
        Ok(self.session.slot(slot)?.hierarchy())
    }

    /// `only` if given (and it exists), otherwise every slot
    fn slots(&self, only: Option<&str>) -> Result<Vec<String>, Box<dyn std::error::Error>> {
        match only {
            Some(name) => {
                self.session.slot(name)?;
                Ok(vec![name.to_string()])
            }
            None => Ok(self.session.slot_names().map(String::from).collect()),
        }
    }
}

fn load_project(project_dir: Option<&str>) -> Result<Project, Box<dyn std::error::Error>> {
    let start = match project_dir {
        Some(dir) => fs::canonicalize(dir).map_err(|e| format!("cannot resolve -C path '{}': {}", dir, e))?,
        None => std::env::current_dir()?,
    };
    let root = config_io::discover_project(&start)?;
    let config = config_io::read_config(&root)?;
    let draft_path = draft_io::draft_path(&root, &config);
    let session = draft_io::open_session(&config, draft_io::read_draft(&draft_path)?)?;
    debug!(root = %root.display(), session = %session.id(), "project loaded");
    Ok(Project {
        root,
        config,
        session,
        draft_path,
    })
}

/// The level whose nodes sit at `at` (one index per level)
fn level_of(hierarchy: &Hierarchy, at: &Coordinate) -> Result<String, Box<dyn std::error::Error>> {
    if at.is_root() {
        return Err("expected a node coordinate, got root".into());
    }
    hierarchy
        .level(at.len() - 1)
        .map(|l| l.name.clone())
        .ok_or_else(|| format!("coordinate {} is deeper than the hierarchy ({})", at, hierarchy.names().join(" > ")).into())
}

// ---------------------------------------------------------------------------
// Read commands
// ---------------------------------------------------------------------------

fn cmd_show(project: &Project, args: ShowArgs, json: bool) -> CmdResult {
    let names = project.slots(args.slot.as_deref())?;
    if json {
        let mut out = Vec::new();
        for name in &names {
            let slot = project.session.slot(name)?;
            out.push(SlotJson {
                slot: name,
                levels: slot.hierarchy().names(),
                tree: slot.tree(),
                errors: slot.errors(),
            });
        }
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    for (i, name) in names.iter().enumerate() {
        if i > 0 {
            println!();
        }
        let slot = project.session.slot(name)?;
        for line in format_outline(name, slot.tree(), slot.errors()) {
            println!("{}", line);
        }
    }
    Ok(())
}

fn cmd_path(project: &Project, args: PathArgs, json: bool) -> CmdResult {
    let path = match &args.field {
        Some(field) => {
            let level = level_of(project.hierarchy(&args.slot)?, &args.coordinate)?;
            project
                .session
                .field_path(&args.slot, &level, &args.coordinate, field)?
        }
        None => project.session.collection_path(&args.slot, &args.coordinate)?,
    };
    if json {
        println!("{}", json!({ "path": path }));
    } else {
        println!("{}", path);
    }
    Ok(())
}

fn cmd_get(project: &Project, args: GetArgs, json: bool) -> CmdResult {
    let value = project.session.get_field(&args.slot, &args.path)?;
    if json {
        let out = ValueJson {
            path: &args.path,
            value,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        match value {
            Value::String(s) => println!("{}", s),
            other => println!("{}", other),
        }
    }
    Ok(())
}

fn cmd_templates(project: &Project, args: TemplatesArgs, json: bool) -> CmdResult {
    let source = project.templates();
    let mut rows = Vec::new();
    for id in source.list(args.kind)? {
        let name = match source.fetch_template(args.kind, id) {
            Ok(doc) => doc.name().to_string(),
            Err(e) => format!("(unreadable: {})", e),
        };
        rows.push((id, name));
    }
    if json {
        let out: Vec<Value> = rows
            .iter()
            .map(|(id, name)| json!({ "id": id, "name": name }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if rows.is_empty() {
        println!("no {} templates in {}", args.kind, source.root().display());
    } else {
        for (id, name) in rows {
            println!("{:>4}  {}", id, name);
        }
    }
    Ok(())
}

fn cmd_submit(project: &Project, args: SubmitArgs) -> CmdResult {
    let opts = project.submit_options();
    let mut payload = Map::new();
    for name in project.slots(args.slot.as_deref())? {
        let slot = project.session.slot(&name)?;
        payload.insert(name.clone(), submit::submit(slot.hierarchy(), slot.tree(), &opts)?);
    }
    println!("{}", serde_json::to_string_pretty(&Value::Object(payload))?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Write commands
// ---------------------------------------------------------------------------

fn cmd_set(project: &mut Project, args: SetArgs) -> CmdResult {
    let kind = project.session.field_kind(&args.slot, &args.path)?;
    let value = kind
        .parse_input(&args.value)
        .ok_or_else(|| format!("{} expects a {} value, got {:?}", args.path, kind, args.value))?;
    project.session.set_field(&args.slot, &args.path, value)?;
    project.save()?;
    println!("set {}", args.path);
    Ok(())
}

fn cmd_add(project: &mut Project, args: AddArgs, json: bool) -> CmdResult {
    let session = &mut project.session;
    let id = session.add_blank(&args.slot, &args.parent)?;
    let at = session
        .tree(&args.slot)?
        .locate(&id)
        .ok_or_else(|| format!("new node {} not found", id))?;
    let level = level_of(session.slot(&args.slot)?.hierarchy(), &at)?;
    if let Some(title) = args.title {
        let title_path = session.field_path(&args.slot, &level, &at, "title")?;
        session.set_field(&args.slot, &title_path, Value::String(title))?;
    }
    let node_path = format!(
        "{}[{}]",
        session.collection_path(&args.slot, &args.parent)?,
        at.indices().last().copied().unwrap_or_default()
    );
    project.save()?;

    if json {
        let out = AddedJson {
            slot: args.slot,
            coordinate: at,
            id,
            path: node_path,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("added {} {}", at.dotted(), node_path);
    }
    Ok(())
}

fn cmd_rm(project: &mut Project, args: RmArgs) -> CmdResult {
    project.session.delete(&args.slot, &args.coordinate)?;
    project.save()?;
    println!("deleted {}", args.coordinate.dotted());
    Ok(())
}

fn cmd_mv(project: &mut Project, args: MvArgs) -> CmdResult {
    let level = project
        .hierarchy(&args.slot)?
        .level(args.parent.len())
        .map(|l| l.name.clone())
        .ok_or_else(|| format!("{} has no child list", args.parent))?;
    let moved = project
        .session
        .reorder(&args.slot, &level, &args.parent, args.from, args.to)?;
    if moved {
        project.save()?;
        println!("moved {} {} -> {}", level, args.from, args.to);
    } else {
        println!("nothing to move");
    }
    Ok(())
}

fn cmd_hydrate(project: &mut Project, args: HydrateArgs, json: bool) -> CmdResult {
    let source = project.templates();
    let target = if args.replace {
        HydrationTarget::Replace
    } else {
        HydrationTarget::Append(args.under)
    };
    let completion = project
        .session
        .hydrate_from(&source, &args.slot, target, args.kind, args.ids)?;
    let Completion::Applied(report) = completion else {
        println!("hydration discarded");
        return Ok(());
    };
    if !report.added.is_empty() {
        project.save()?;
    }

    let out = hydrate_to_json(&args.slot, project.session.tree(&args.slot)?, &report);
    if json {
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }
    for id in &out.dropped {
        eprintln!("warning: {} template #{} could not be loaded", args.kind, id);
    }
    if out.added.is_empty() {
        println!("no templates added");
    }
    for node in &out.added {
        println!("added {} {}", node.coordinate.dotted(), node.title);
    }
    Ok(())
}

fn cmd_load(project: &mut Project, args: LoadArgs) -> CmdResult {
    let text = fs::read_to_string(&args.file).map_err(|e| format!("could not read {}: {}", args.file, e))?;
    let value: Value = serde_json::from_str(&text)?;
    let nodes = submit::load_existing(project.hierarchy(&args.slot)?, &value, &project.submit_options())?;
    let count = nodes.len();
    project.session.replace_all(&args.slot, nodes)?;
    project.save()?;
    println!("loaded {} {} into {}", count, project.hierarchy(&args.slot)?.root().name, args.slot);
    Ok(())
}

fn cmd_errors(project: &mut Project, args: ErrorsArgs, json: bool) -> CmdResult {
    if let (Some(slot), Some(file)) = (&args.slot, &args.load) {
        let text = fs::read_to_string(file).map_err(|e| format!("could not read {}: {}", file, e))?;
        let response: Value = serde_json::from_str(&text)?;
        let errors = validation::route_errors(project.hierarchy(slot)?, &response)?;
        let count = errors.count();
        let first = errors.first_error_coordinate();
        project.session.set_errors(slot, errors)?;
        project.save()?;
        match first {
            Some(at) => println!("{} errors in {}, first at {}", count, slot, at.dotted()),
            None => println!("no errors in {}", slot),
        }
        return Ok(());
    }

    let names = project.slots(args.slot.as_deref())?;
    if args.clear {
        for name in &names {
            project.session.set_errors(name, ErrorTree::new())?;
        }
        project.save()?;
        println!("errors cleared");
        return Ok(());
    }

    let mut entries = Vec::new();
    let mut lines = Vec::new();
    for name in &names {
        let slot = project.session.slot(name)?;
        if json {
            entries.extend(errors_to_json(name, slot.hierarchy(), slot.errors()));
        } else {
            lines.extend(format_errors(slot.hierarchy(), slot.errors()));
        }
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if lines.is_empty() {
        println!("no errors");
    } else {
        for line in lines {
            println!("{}", line);
        }
    }
    Ok(())
}

fn cmd_reset(project: &mut Project) -> CmdResult {
    project.session.reset();
    project.save()?;
    println!("draft cleared");
    Ok(())
}
