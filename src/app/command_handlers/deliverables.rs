use crate::app::command_support::{
    format_optional_timestamp, now_secs, open_engine, render_step_line,
};
use crate::compliance::Deliverable;
use crate::config::Settings;

pub fn cmd_deliverable(settings: &Settings, args: &[String]) -> Result<String, String> {
    let Some(action) = args.first() else {
        return Err(
            "usage: deliverable <add|show|instantiate|progress|head|unlock> ...".to_string(),
        );
    };
    let engine = open_engine(settings)?;

    match action.as_str() {
        "add" => {
            let (deliverable_id, org_id, category) = match &args[1..] {
                [id, org] => (id, org, None),
                [id, org, category] => (id, org, Some(category.as_str())),
                _ => {
                    return Err(
                        "usage: deliverable add <id> <org_id> [category]".to_string(),
                    )
                }
            };
            let deliverable = engine
                .register_deliverable(deliverable_id, org_id, category, now_secs())
                .map_err(|e| e.to_string())?;
            Ok(format!("deliverable registered\n{}", render_deliverable(&deliverable)))
        }
        "show" => {
            let [deliverable_id] = &args[1..] else {
                return Err("usage: deliverable show <id>".to_string());
            };
            let deliverable = engine
                .get_deliverable(deliverable_id)
                .map_err(|e| e.to_string())?
                .ok_or_else(|| format!("deliverable `{deliverable_id}` not found"))?;
            let mut lines = vec![render_deliverable(&deliverable)];
            match engine
                .chain_record(deliverable_id)
                .map_err(|e| e.to_string())?
            {
                Some(chain) => {
                    lines.push(format!("chain_template={}", chain.template_id));
                    lines.push(format!("chain_steps={}", chain.step_count));
                    lines.push(format!(
                        "instantiated_at={}",
                        format_optional_timestamp(Some(chain.instantiated_at))
                    ));
                    let drift = engine
                        .template_drifted(deliverable_id)
                        .map_err(|e| e.to_string())?;
                    lines.push(format!(
                        "template_drift={}",
                        drift.map_or("unknown".to_string(), |d| d.to_string())
                    ));
                }
                None => lines.push("chain_template=-".to_string()),
            }
            Ok(lines.join("\n"))
        }
        "instantiate" => {
            let (deliverable_id, template_id) = match &args[1..] {
                [id] => (id, None),
                [id, template_id] => (id, Some(template_id.as_str())),
                _ => {
                    return Err(
                        "usage: deliverable instantiate <id> [template_id]".to_string(),
                    )
                }
            };
            if engine
                .get_deliverable(deliverable_id)
                .map_err(|e| e.to_string())?
                .is_none()
            {
                return Err(format!("deliverable `{deliverable_id}` not found"));
            }
            let now = now_secs();
            let steps = match template_id {
                Some(template_id) => engine
                    .instantiate_steps(deliverable_id, template_id, now)
                    .map_err(|e| e.to_string())?
                    .ok_or_else(|| format!("template `{template_id}` not found"))?,
                None => engine
                    .instantiate_for_deliverable(deliverable_id, now)
                    .map_err(|e| e.to_string())?
                    .ok_or_else(|| {
                        format!("no default compliance template applies to `{deliverable_id}`")
                    })?,
            };
            let mut lines = vec![
                "steps instantiated".to_string(),
                format!("deliverable={deliverable_id}"),
                format!("steps={}", steps.len()),
            ];
            lines.extend(steps.iter().map(render_step_line));
            Ok(lines.join("\n"))
        }
        "progress" => {
            let [deliverable_id, org_id] = &args[1..] else {
                return Err("usage: deliverable progress <id> <org_id>".to_string());
            };
            let deliverable = engine
                .recompute_deliverable_progress(deliverable_id, org_id, now_secs())
                .map_err(|e| e.to_string())?
                .ok_or_else(|| {
                    format!("deliverable `{deliverable_id}` not found in org `{org_id}`")
                })?;
            Ok(render_deliverable(&deliverable))
        }
        "head" => {
            let [deliverable_id] = &args[1..] else {
                return Err("usage: deliverable head <id>".to_string());
            };
            match engine.head_step(deliverable_id).map_err(|e| e.to_string())? {
                Some(step) => Ok(render_step_line(&step)),
                None => Ok("no open steps".to_string()),
            }
        }
        "unlock" => {
            let [deliverable_id, number] = &args[1..] else {
                return Err("usage: deliverable unlock <id> <step_number>".to_string());
            };
            let number = number
                .parse::<u32>()
                .map_err(|_| format!("invalid step number `{number}`"))?;
            match engine
                .unlock_next(deliverable_id, number, now_secs())
                .map_err(|e| e.to_string())?
            {
                Some(step) => Ok(format!("step unlocked\n{}", render_step_line(&step))),
                None => Ok("no step unlocked".to_string()),
            }
        }
        other => Err(format!("unknown deliverable subcommand `{other}`")),
    }
}

fn render_deliverable(deliverable: &Deliverable) -> String {
    format!(
        "deliverable={}\norg={}\ncategory={}\nprogress={}\nupload_unlocked={}",
        deliverable.deliverable_id,
        deliverable.org_id,
        deliverable.deliverable_category.as_deref().unwrap_or("-"),
        deliverable.compliance_progress,
        deliverable.is_upload_unlocked
    )
}
