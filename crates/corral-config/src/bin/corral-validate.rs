//! Config validation CLI tool
//!
//! Validates a corral configuration file and reports any errors.

use corral_host_api::{KillMode, ShellPolicy};
use corral_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: corral-validate [config-file]");
            eprintln!();
            eprintln!("Validates a corral configuration file.");
            eprintln!();
            eprintln!("Example:");
            eprintln!("  corral-validate {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match corral_config::load_config(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Supervisor:");
            println!("  Shell: {}", config.supervisor.shell.display());
            let quoting = match config.supervisor.shell_policy {
                ShellPolicy::Raw => "raw (shell syntax allowed)",
                ShellPolicy::Quoted => "quoted",
            };
            println!("  Arguments: {}", quoting);
            match config.supervisor.kill_mode {
                KillMode::Graceful { timeout } => {
                    println!("  Kill: SIGTERM, SIGKILL after {}s", timeout.as_secs())
                }
                KillMode::Force => println!("  Kill: SIGKILL"),
            }

            println!();
            println!("Actions: {}", config.actions.len());
            for action in &config.actions {
                println!(
                    "  - {} [{}]: {}",
                    action.name,
                    action.process,
                    action.command.join(" ")
                );
                if let Some(description) = &action.description {
                    println!("      {}", description);
                }
            }

            ExitCode::SUCCESS
        }
        Err(corral_config::ConfigError::ValidationFailed { errors }) => {
            eprintln!("✗ {} has {} problem(s):", config_path.display(), errors.len());
            for err in &errors {
                eprintln!("  - {}", err);
            }
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("✗ {}: {}", config_path.display(), e);
            ExitCode::from(1)
        }
    }
}
