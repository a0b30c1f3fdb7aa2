use crate::app::command_support::{map_config_err, open_engine, take_flag_values};
use crate::config::{
    default_global_config_path, default_state_root_path, load_settings_from, save_settings_to,
    Settings,
};
use std::fs;

/// Creates or extends the global config, then bootstraps the state root.
pub fn cmd_setup(args: &[String]) -> Result<String, String> {
    let (admins, rest) = take_flag_values(args, "--admin")?;
    if let Some(extra) = rest.first() {
        return Err(format!("unexpected setup argument `{extra}`"));
    }

    let config_path = default_global_config_path().map_err(map_config_err)?;
    let mut settings = if config_path.exists() {
        load_settings_from(&config_path).map_err(map_config_err)?
    } else {
        Settings::new(default_state_root_path().map_err(map_config_err)?)
    };
    for admin in admins {
        if !settings.is_administrator(&admin) {
            settings.administrators.push(admin);
        }
    }
    fs::create_dir_all(&settings.state_root)
        .map_err(|e| format!("failed to create {}: {e}", settings.state_root.display()))?;
    save_settings_to(&settings, &config_path).map_err(map_config_err)?;

    let summary = bootstrap_state_root(&settings)?;
    Ok(format!("config={}\n{summary}", config_path.display()))
}

pub fn bootstrap_state_root(settings: &Settings) -> Result<String, String> {
    settings.validate().map_err(map_config_err)?;
    let logs_dir = settings.state_root.join("logs");
    fs::create_dir_all(&logs_dir)
        .map_err(|e| format!("failed to create {}: {e}", logs_dir.display()))?;
    let engine = open_engine(settings)?;
    Ok(format!(
        "setup complete\nstate_root={}\ndatabase={}\nadministrators={}",
        settings.state_root.display(),
        engine.store().db_path().display(),
        settings.administrators.len()
    ))
}
