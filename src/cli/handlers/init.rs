use std::fs;
use std::path::{Path, PathBuf};

use crate::cli::commands::{InitArgs, PresetArg};
use crate::io::config_io::{self, CONFIG_FILE};
use crate::io::draft_io::{self, DraftFile};
use crate::model::config::{EditorConfig, Preset};
use crate::model::template::TemplateKind;

const CONFIG_HEADER: &str = r##"# plantree project configuration
#
# [editor]
#   date_input_format  chrono format of dates as typed into the form
#   templates_dir      holds <kind>/<id>.json, kind being milestones, tasks,
#                      steps or checklists
#   draft_file         where the in-progress form value is kept
#
# Each [[slots]] entry is one tree in the form. Levels with a built-in
# schema (milestones, tasks, steps, checklists) need no field list; any
# other level declares its fields:
#
# [levels.phases.fields]
# title = "text"
# deadline = "date"
#
# Field kinds: text, date, ref, ref_list, flag, number

"##;

fn preset_of(arg: PresetArg) -> Preset {
    match arg {
        PresetArg::Project => Preset::Project,
        PresetArg::Tasks => Preset::Tasks,
    }
}

fn render_config(config: &EditorConfig) -> Result<String, toml::ser::Error> {
    Ok(format!("{}{}", CONFIG_HEADER, toml::to_string_pretty(config)?))
}

pub fn cmd_init(args: InitArgs, project_dir: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let root: PathBuf = match project_dir {
        Some(dir) => PathBuf::from(dir),
        None => std::env::current_dir()?,
    };
    fs::create_dir_all(&root)?;

    if root.join(CONFIG_FILE).exists() && !args.force {
        return Err(format!("{} already exists (use --force to overwrite)", CONFIG_FILE).into());
    }

    // Check for an enclosing project and warn
    if let Some(parent) = root.parent()
        && let Ok(parent_root) = config_io::discover_project(parent)
    {
        eprintln!("Note: enclosing project found at {}/", parent_root.display());
    }

    let config = EditorConfig::preset(preset_of(args.preset));
    config_io::atomic_write(&root.join(CONFIG_FILE), render_config(&config)?.as_bytes())?;

    let templates = root.join(&config.editor.templates_dir);
    create_template_dirs(&templates)?;

    let draft_path = draft_io::draft_path(&root, &config);
    if args.force || !draft_path.exists() {
        draft_io::write_draft(&draft_path, &DraftFile::default())?;
    }

    let slots: Vec<&str> = config.slots.iter().map(|s| s.name.as_str()).collect();
    println!("Initialized plantree project: {}", slots.join(", "));
    Ok(())
}

fn create_template_dirs(templates: &Path) -> std::io::Result<()> {
    for kind in [
        TemplateKind::Milestone,
        TemplateKind::Task,
        TemplateKind::Step,
        TemplateKind::Checklist,
    ] {
        fs::create_dir_all(templates.join(kind.level_name()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendered_config_parses_back() {
        let config = EditorConfig::preset(Preset::Tasks);
        let text = render_config(&config).unwrap();
        assert!(text.starts_with("# plantree project configuration"));
        let parsed: EditorConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.slots, config.slots);
        assert_eq!(parsed.editor.date_input_format, "%d.%m.%Y");
    }

    #[test]
    fn test_preset_mapping() {
        assert_eq!(preset_of(PresetArg::Project), Preset::Project);
        assert_eq!(preset_of(PresetArg::Tasks), Preset::Tasks);
    }
}
