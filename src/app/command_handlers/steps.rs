use crate::app::command_support::{
    now_secs, open_engine, render_step_line, render_step_result, take_flag_values,
};
use crate::compliance::{Actor, ApprovalGate, StepData};
use crate::config::Settings;
use serde_json::Value;

pub fn cmd_step(settings: &Settings, args: &[String]) -> Result<String, String> {
    let Some(action) = args.first() else {
        return Err("usage: step <list|show|save|submit|approve|reject> ...".to_string());
    };
    let engine = open_engine(settings)?;

    match action.as_str() {
        "list" => {
            let [deliverable_id] = &args[1..] else {
                return Err("usage: step list <deliverable_id>".to_string());
            };
            let steps = engine.list_steps(deliverable_id).map_err(|e| e.to_string())?;
            if steps.is_empty() {
                return Ok(format!("no steps for `{deliverable_id}`"));
            }
            Ok(steps
                .iter()
                .map(render_step_line)
                .collect::<Vec<_>>()
                .join("\n"))
        }
        "show" => {
            let [step_id] = &args[1..] else {
                return Err("usage: step show <step_id>".to_string());
            };
            let step = engine
                .get_step(step_id)
                .map_err(|e| e.to_string())?
                .ok_or_else(|| step_not_found(step_id))?;
            serde_yaml::to_string(&step).map_err(|e| format!("failed to render step: {e}"))
        }
        "save" => {
            let [step_id, payload] = &args[1..] else {
                return Err("usage: step save <step_id> <json>".to_string());
            };
            let data = parse_step_data(payload)?;
            let step = engine
                .save_draft(step_id, data, now_secs())
                .map_err(|e| e.to_string())?
                .ok_or_else(|| step_not_found(step_id))?;
            Ok(render_step_result("saved", &step))
        }
        "submit" => {
            let [step_id] = &args[1..] else {
                return Err("usage: step submit <step_id>".to_string());
            };
            let step = engine
                .submit(step_id, now_secs())
                .map_err(|e| e.to_string())?
                .ok_or_else(|| step_not_found(step_id))?;
            Ok(render_step_result("submitted", &step))
        }
        "approve" => {
            let (actor, rest) = admin_actor(settings, &args[1..])?;
            let Some((step_id, comment)) = rest.split_first() else {
                return Err("usage: step approve <step_id> --admin <id> [comment]".to_string());
            };
            let comment = comment.join(" ");
            let comment = Some(comment.as_str()).filter(|c| !c.trim().is_empty());
            let step = ApprovalGate::new(&engine)
                .approve(&actor, step_id, comment, now_secs())
                .map_err(|e| e.to_string())?
                .ok_or_else(|| step_not_found(step_id))?;
            Ok(render_step_result("approved", &step))
        }
        "reject" => {
            let (actor, rest) = admin_actor(settings, &args[1..])?;
            let Some((step_id, reason)) = rest.split_first() else {
                return Err("usage: step reject <step_id> --admin <id> <reason>".to_string());
            };
            let step = ApprovalGate::new(&engine)
                .reject(&actor, step_id, &reason.join(" "), now_secs())
                .map_err(|e| e.to_string())?
                .ok_or_else(|| step_not_found(step_id))?;
            Ok(render_step_result("rejected", &step))
        }
        other => Err(format!("unknown step subcommand `{other}`")),
    }
}

fn admin_actor(settings: &Settings, args: &[String]) -> Result<(Actor, Vec<String>), String> {
    let (mut admins, rest) = take_flag_values(args, "--admin")?;
    if admins.len() != 1 {
        return Err("exactly one `--admin <id>` is required".to_string());
    }
    let admin_id = admins.remove(0);
    Ok((Actor::from_settings(settings, &admin_id), rest))
}

/// Parses an autosave payload. Only a JSON object is accepted.
pub fn parse_step_data(payload: &str) -> Result<StepData, String> {
    let value: Value =
        serde_json::from_str(payload).map_err(|e| format!("invalid step payload: {e}"))?;
    if !value.is_object() {
        return Err("invalid step payload: expected a json object".to_string());
    }
    serde_json::from_value(value).map_err(|e| format!("invalid step payload: {e}"))
}

fn step_not_found(step_id: &str) -> String {
    format!("step `{step_id}` not found")
}
