use crate::compliance::{ComplianceEngine, ComplianceStep};
use crate::config::{load_global_settings, ConfigError, Settings};
use chrono::{SecondsFormat, TimeZone, Utc};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

pub fn map_config_err(err: ConfigError) -> String {
    err.to_string()
}

pub fn load_settings() -> Result<Settings, String> {
    load_global_settings().map_err(map_config_err)
}

pub fn open_engine(settings: &Settings) -> Result<ComplianceEngine, String> {
    ComplianceEngine::from_settings(settings).map_err(|e| e.to_string())
}

/// RFC 3339 in UTC, or the raw number when it is out of chrono's range.
pub fn format_timestamp(unix_ts: i64) -> String {
    match Utc.timestamp_opt(unix_ts, 0).single() {
        Some(at) => at.to_rfc3339_opts(SecondsFormat::Secs, true),
        None => unix_ts.to_string(),
    }
}

pub fn format_optional_timestamp(unix_ts: Option<i64>) -> String {
    unix_ts
        .map(format_timestamp)
        .unwrap_or_else(|| "-".to_string())
}

/// Removes every `<flag> <value>` pair from `args` and returns the values.
pub fn take_flag_values(args: &[String], flag: &str) -> Result<(Vec<String>, Vec<String>), String> {
    let mut values = Vec::new();
    let mut rest = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == flag {
            let value = iter
                .next()
                .ok_or_else(|| format!("missing value for `{flag}`"))?;
            values.push(value.clone());
        } else {
            rest.push(arg.clone());
        }
    }
    Ok((values, rest))
}

/// Removes a boolean `flag` from `args`.
pub fn take_switch(args: &[String], flag: &str) -> (bool, Vec<String>) {
    let present = args.iter().any(|arg| arg == flag);
    let rest = args.iter().filter(|arg| *arg != flag).cloned().collect();
    (present, rest)
}

pub fn render_step_line(step: &ComplianceStep) -> String {
    let mut flags = Vec::new();
    if !step.is_required {
        flags.push("optional");
    }
    if step.requires_admin_approval {
        flags.push("needs-approval");
    }
    if !step.auto_unlock_next {
        flags.push("manual-unlock");
    }
    format!(
        "{}\t{}\t{}\t{}\t{}{}",
        step.step_number,
        step.step_id,
        step.status,
        step.step_type,
        step.title,
        if flags.is_empty() {
            String::new()
        } else {
            format!("\t[{}]", flags.join(","))
        }
    )
}

pub fn render_step_result(action: &str, step: &ComplianceStep) -> String {
    let mut lines = vec![
        format!("step {action}"),
        format!("step={}", step.step_id),
        format!("deliverable={}", step.deliverable_id),
        format!("status={}", step.status),
        format!("progress={}", step.progress),
    ];
    if let Some(reason) = &step.rejection_reason {
        lines.push(format!("rejection_reason={reason}"));
    }
    if let Some(comment) = &step.admin_comment {
        lines.push(format!("admin_comment={comment}"));
    }
    lines.join("\n")
}
