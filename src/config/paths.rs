use crate::config::ConfigError;
use std::path::PathBuf;

pub const GLOBAL_STATE_DIR: &str = ".complygate";
pub const GLOBAL_SETTINGS_FILE_NAME: &str = "config.yaml";
pub const HOME_OVERRIDE_ENV: &str = "COMPLYGATE_HOME";

/// `$COMPLYGATE_HOME` when set, else `$HOME/.complygate`.
pub fn default_state_root_path() -> Result<PathBuf, ConfigError> {
    if let Some(root) = std::env::var_os(HOME_OVERRIDE_ENV) {
        if !root.is_empty() {
            return Ok(PathBuf::from(root));
        }
    }
    let home = std::env::var_os("HOME").ok_or(ConfigError::HomeDirectoryUnavailable)?;
    Ok(PathBuf::from(home).join(GLOBAL_STATE_DIR))
}

pub fn default_global_config_path() -> Result<PathBuf, ConfigError> {
    Ok(default_state_root_path()?.join(GLOBAL_SETTINGS_FILE_NAME))
}
