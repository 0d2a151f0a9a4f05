//! Configuration validation

use crate::schema::{RawAction, RawConfig};
use std::collections::HashSet;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Action '{action}': {message}")]
    ActionError { action: String, message: String },

    #[error("Duplicate action name: {0}")]
    DuplicateActionName(String),

    #[error("Process name '{0}' is used by more than one action")]
    DuplicateProcessName(String),

    #[error("Supervisor config error: {0}")]
    SupervisorError(String),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(shell) = &config.supervisor.shell
        && shell.as_os_str().is_empty()
    {
        errors.push(ValidationError::SupervisorError("shell cannot be empty".into()));
    }

    let mut seen_names = HashSet::new();
    let mut seen_processes = HashSet::new();
    for action in &config.actions {
        if !seen_names.insert(action.name.as_str()) {
            errors.push(ValidationError::DuplicateActionName(action.name.clone()));
        }

        let process = action.process.as_deref().unwrap_or(&action.name);
        if !seen_processes.insert(process) {
            errors.push(ValidationError::DuplicateProcessName(process.to_string()));
        }
    }

    for action in &config.actions {
        errors.extend(validate_action(action));
    }

    errors
}

fn validate_action(action: &RawAction) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let err = |message: &str| ValidationError::ActionError {
        action: action.name.clone(),
        message: message.into(),
    };

    if action.name.trim().is_empty() {
        errors.push(err("name cannot be empty"));
    }

    match action.command.first() {
        None => errors.push(err("command cannot be empty")),
        Some(program) if program.trim().is_empty() => {
            errors.push(err("executable cannot be empty"));
        }
        Some(_) => {}
    }

    if let Some(process) = &action.process
        && process.trim().is_empty()
    {
        errors.push(err("process name cannot be empty"));
    }

    errors
}
