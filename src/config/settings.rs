use super::ConfigError;
use crate::shared::ids::validate_identifier_value;
use crate::shared::logging::compliance_log_path;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// What the progress rollup does for a deliverable whose steps are all optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ZeroRequiredProgress {
    /// Progress is 100 and upload is unlocked.
    #[default]
    Complete,
    /// Rollup fields are left untouched.
    Unchanged,
}

impl ZeroRequiredProgress {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Unchanged => "unchanged",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "complete" => Ok(Self::Complete),
            "unchanged" => Ok(Self::Unchanged),
            _ => Err("zero_required_progress must be one of: complete, unchanged".to_string()),
        }
    }
}

impl std::fmt::Display for ZeroRequiredProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn default_strict_transitions() -> bool {
    true
}

fn default_database_path() -> PathBuf {
    PathBuf::from("compliance.db")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default = "default_strict_transitions")]
    pub strict_transitions: bool,
    #[serde(default)]
    pub zero_required_progress: ZeroRequiredProgress,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strict_transitions: default_strict_transitions(),
            zero_required_progress: ZeroRequiredProgress::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub state_root: PathBuf,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default)]
    pub administrators: Vec<String>,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Settings {
    pub fn new(state_root: impl Into<PathBuf>) -> Self {
        Self {
            state_root: state_root.into(),
            database_path: default_database_path(),
            administrators: Vec::new(),
            engine: EngineConfig::default(),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.state_root.as_os_str().is_empty() {
            return Err(ConfigError::Settings(
                "state_root must be non-empty".to_string(),
            ));
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::Settings(
                "database_path must be non-empty".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for admin in &self.administrators {
            validate_identifier_value("administrator id", admin)
                .map_err(|err| ConfigError::Settings(format!("administrators: {err}")))?;
            if !seen.insert(admin.as_str()) {
                return Err(ConfigError::Settings(format!(
                    "administrators: duplicate id `{admin}`"
                )));
            }
        }
        Ok(())
    }

    pub fn resolve_database_path(&self) -> PathBuf {
        if self.database_path.is_absolute() {
            self.database_path.clone()
        } else {
            self.state_root.join(&self.database_path)
        }
    }

    pub fn event_log_path(&self) -> PathBuf {
        compliance_log_path(&self.state_root)
    }

    pub fn is_administrator(&self, actor_id: &str) -> bool {
        self.administrators.iter().any(|admin| admin == actor_id)
    }
}
