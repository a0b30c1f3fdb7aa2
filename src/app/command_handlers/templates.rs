use crate::app::command_support::{format_timestamp, now_secs, open_engine, take_switch};
use crate::compliance::{ComplianceTemplate, NewTemplate};
use crate::config::Settings;
use std::fs;
use std::path::Path;

pub fn cmd_template(settings: &Settings, args: &[String]) -> Result<String, String> {
    let Some(action) = args.first() else {
        return Err("usage: template <add|list|show|default|set-default|deactivate> ...".to_string());
    };
    let engine = open_engine(settings)?;

    match action.as_str() {
        "add" => {
            let [org_id, file] = &args[1..] else {
                return Err("usage: template add <org_id> <file.yaml>".to_string());
            };
            let input = read_template_file(Path::new(file))?;
            let template = engine
                .create_template(org_id, input, now_secs())
                .map_err(|e| e.to_string())?;
            Ok(format!(
                "template added\ntemplate={}\norg={}\nsteps={}\ndefault={}",
                template.template_id,
                template.org_id,
                template.steps.len(),
                template.is_default
            ))
        }
        "list" => {
            let (include_inactive, rest) = take_switch(&args[1..], "--all");
            let [org_id] = rest.as_slice() else {
                return Err("usage: template list <org_id> [--all]".to_string());
            };
            let templates = engine
                .list_templates(org_id, include_inactive)
                .map_err(|e| e.to_string())?;
            if templates.is_empty() {
                return Ok("no templates".to_string());
            }
            Ok(templates
                .iter()
                .map(render_template_line)
                .collect::<Vec<_>>()
                .join("\n"))
        }
        "show" => {
            let [template_id] = &args[1..] else {
                return Err("usage: template show <template_id>".to_string());
            };
            let template = engine
                .get_template(template_id)
                .map_err(|e| e.to_string())?
                .ok_or_else(|| format!("template `{template_id}` not found"))?;
            serde_yaml::to_string(&template)
                .map_err(|e| format!("failed to render template `{template_id}`: {e}"))
        }
        "default" => {
            let (org_id, category) = match &args[1..] {
                [org_id] => (org_id, None),
                [org_id, category] => (org_id, Some(category.as_str())),
                _ => return Err("usage: template default <org_id> [category]".to_string()),
            };
            match engine
                .get_default_template(org_id, category)
                .map_err(|e| e.to_string())?
            {
                Some(template) => Ok(render_template_line(&template)),
                None => Ok("no default template".to_string()),
            }
        }
        "set-default" => {
            let [template_id] = &args[1..] else {
                return Err("usage: template set-default <template_id>".to_string());
            };
            let template = engine
                .set_default_template(template_id, now_secs())
                .map_err(|e| e.to_string())?
                .ok_or_else(|| format!("template `{template_id}` not found"))?;
            Ok(format!("default template set\ntemplate={}", template.template_id))
        }
        "deactivate" => {
            let [template_id] = &args[1..] else {
                return Err("usage: template deactivate <template_id>".to_string());
            };
            let template = engine
                .deactivate_template(template_id, now_secs())
                .map_err(|e| e.to_string())?
                .ok_or_else(|| format!("template `{template_id}` not found"))?;
            Ok(format!(
                "template deactivated\ntemplate={}\nupdated_at={}",
                template.template_id,
                format_timestamp(template.updated_at)
            ))
        }
        other => Err(format!("unknown template subcommand `{other}`")),
    }
}

fn read_template_file(path: &Path) -> Result<NewTemplate, String> {
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    serde_yaml::from_str(&raw).map_err(|e| format!("failed to parse {}: {e}", path.display()))
}

fn render_template_line(template: &ComplianceTemplate) -> String {
    format!(
        "{}\t{}\tcategory={}\tsteps={}\tdefault={}\tactive={}",
        template.template_id,
        template.name,
        template.deliverable_category.as_deref().unwrap_or("-"),
        template.steps.len(),
        template.is_default,
        template.is_active
    )
}
