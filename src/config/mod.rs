pub mod error;
pub mod load;
pub mod paths;
pub mod settings;

pub use error::ConfigError;
pub use load::{load_global_settings, load_settings_from, save_settings, save_settings_to};
pub use paths::{
    default_global_config_path, default_state_root_path, GLOBAL_SETTINGS_FILE_NAME,
    GLOBAL_STATE_DIR, HOME_OVERRIDE_ENV,
};
pub use settings::{EngineConfig, Settings, ZeroRequiredProgress};
