//! Default paths for corral
//!
//! - Config: `$CORRAL_CONFIG`, else `$XDG_CONFIG_HOME/corral/corral.toml`,
//!   else `~/.config/corral/corral.toml`, else `./corral.toml`

use std::path::PathBuf;

/// Environment variable for overriding the config file path
pub const CORRAL_CONFIG_ENV: &str = "CORRAL_CONFIG";

/// Config filename within the config directory
const CONFIG_FILENAME: &str = "corral.toml";

/// Application subdirectory name
const APP_DIR: &str = "corral";

/// Get the default config file path.
///
/// Order of precedence:
/// 1. `$CORRAL_CONFIG` environment variable (if set)
/// 2. `$XDG_CONFIG_HOME/corral/corral.toml` (if XDG_CONFIG_HOME is set)
/// 3. `~/.config/corral/corral.toml`
/// 4. `./corral.toml` when no home directory can be found
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CORRAL_CONFIG_ENV) {
        return PathBuf::from(path);
    }

    config_path_without_env()
}

/// Get the config path without checking `CORRAL_CONFIG`.
pub fn config_path_without_env() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    match dirs::home_dir() {
        Some(home) => home.join(".config").join(APP_DIR).join(CONFIG_FILENAME),
        None => PathBuf::from(CONFIG_FILENAME),
    }
}
