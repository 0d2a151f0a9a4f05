//! Configuration parsing and validation for corral
//!
//! A config file is TOML with a `config_version`, an optional `[supervisor]`
//! table and any number of `[[actions]]`. Every validation problem is
//! reported, not just the first.

mod schema;
mod settings;
mod validation;

pub use schema::*;
pub use settings::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Invalid TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("{} invalid setting(s): {errors:?}", .errors.len())]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("config_version {0} is not supported (expected {})", CURRENT_CONFIG_VERSION)]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Read, parse and validate a config file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Config> {
    let path = path.as_ref();
    debug!(path = %path.display(), "Loading config");
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate config text
pub fn parse_config(content: &str) -> ConfigResult<Config> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(Config::from_raw(raw))
}

pub const CURRENT_CONFIG_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;
    use corral_host_api::{KillMode, ShellPolicy};
    use std::io::Write;

    #[test]
    fn parse_minimal_config() {
        let config = r#"
            config_version = 1

            [[actions]]
            name = "build"
            command = ["cargo", "build"]
        "#;

        let cfg = parse_config(config).unwrap();
        assert_eq!(cfg.actions.len(), 1);
        assert_eq!(cfg.actions[0].name, "build");
        assert_eq!(cfg.actions[0].process.as_str(), "build");
        assert!(cfg.get_action("build").is_some());
        assert!(cfg.get_action("deploy").is_none());
    }

    #[test]
    fn parse_supervisor_section() {
        let config = r#"
            config_version = 1

            [supervisor]
            shell = "/bin/bash"
            quote_arguments = true
            kill_grace_seconds = 0
            strip_ansi = true
        "#;

        let cfg = parse_config(config).unwrap();
        assert_eq!(cfg.supervisor.shell, std::path::PathBuf::from("/bin/bash"));
        assert_eq!(cfg.supervisor.shell_policy, ShellPolicy::Quoted);
        assert_eq!(cfg.supervisor.kill_mode, KillMode::Force);
        assert!(cfg.supervisor.strip_ansi);
        assert!(cfg.actions.is_empty());
    }

    #[test]
    fn reject_wrong_version() {
        let config = r#"
            config_version = 99

            [[actions]]
            name = "build"
            command = ["make"]
        "#;

        let result = parse_config(config);
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_invalid_actions() {
        let config = r#"
            config_version = 1

            [[actions]]
            name = "build"
            command = []
        "#;

        let result = parse_config(config);
        assert!(matches!(result, Err(ConfigError::ValidationFailed { errors }) if errors.len() == 1));
    }

    #[test]
    fn reject_malformed_toml() {
        assert!(matches!(
            parse_config("config_version = "),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            config_version = 1

            [[actions]]
            name = "serve"
            process = "dev-server"
            command = ["npm", "run", "dev"]
            description = "Development server"
            "#
        )
        .unwrap();

        let cfg = load_config(file.path()).unwrap();
        let action = cfg.get_action("serve").unwrap();
        assert_eq!(action.process.as_str(), "dev-server");
        assert_eq!(action.description.as_deref(), Some("Development server"));
    }

    #[test]
    fn load_missing_file() {
        assert!(matches!(
            load_config("/nonexistent/corral.toml"),
            Err(ConfigError::ReadError(_))
        ));
    }
}
