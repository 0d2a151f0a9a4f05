//! Actions: named units of work that spawn tracked processes

use corral_util::ProcessName;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::{Supervisor, SupervisorResult};

/// Caller-supplied properties passed to an action's handler
pub type Props = serde_json::Map<String, Value>;

/// A named unit of work
///
/// The handler runs synchronously and is expected to call
/// [`Supervisor::spawn`] for each process it starts.
pub trait Action: Send + Sync {
    fn name(&self) -> &str;

    fn on_run(&self, supervisor: &Supervisor, props: &Props) -> SupervisorResult<()>;
}

/// Lookup of actions by name
pub trait ActionCatalog: Send + Sync {
    fn find(&self, name: &str) -> Option<Arc<dyn Action>>;

    /// Names in catalog order
    fn names(&self) -> Vec<String>;
}

/// An ordered list of actions; the first with a matching name wins
#[derive(Default, Clone)]
pub struct ActionSet {
    actions: Vec<Arc<dyn Action>>,
}

impl ActionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, action: impl Action + 'static) -> Self {
        self.push(action);
        self
    }

    pub fn push(&mut self, action: impl Action + 'static) {
        self.actions.push(Arc::new(action));
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl fmt::Debug for ActionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.actions.iter().map(|a| a.name()))
            .finish()
    }
}

impl ActionCatalog for ActionSet {
    fn find(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.iter().find(|a| a.name() == name).cloned()
    }

    fn names(&self) -> Vec<String> {
        self.actions.iter().map(|a| a.name().to_string()).collect()
    }
}

/// An action backed by a closure
pub struct FnAction<F> {
    name: String,
    handler: F,
}

impl<F> FnAction<F>
where
    F: Fn(&Supervisor, &Props) -> SupervisorResult<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

impl<F> Action for FnAction<F>
where
    F: Fn(&Supervisor, &Props) -> SupervisorResult<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn on_run(&self, supervisor: &Supervisor, props: &Props) -> SupervisorResult<()> {
        (self.handler)(supervisor, props)
    }
}

/// An action that spawns one command, filling `{key}` placeholders from props
#[derive(Debug, Clone)]
pub struct CommandAction {
    name: String,
    process: ProcessName,
    command: Vec<String>,
}

impl CommandAction {
    pub fn new(name: impl Into<String>, process: impl Into<ProcessName>, command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            process: process.into(),
            command,
        }
    }

    pub fn process(&self) -> &ProcessName {
        &self.process
    }

    /// The command with placeholders expanded
    pub fn render(&self, props: &Props) -> Vec<String> {
        self.command.iter().map(|part| expand(part, props)).collect()
    }
}

impl Action for CommandAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_run(&self, supervisor: &Supervisor, props: &Props) -> SupervisorResult<()> {
        supervisor.spawn(self.process.clone(), self.render(props))?;
        Ok(())
    }
}

/// Replace `{key}` with the matching prop. Unknown keys stay as written.
pub fn expand(template: &str, props: &Props) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = &after[..close];
                match props.get(key) {
                    Some(value) => out.push_str(&prop_text(value)),
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

fn prop_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Props {
        match value {
            Value::Object(map) => map,
            _ => panic!("props must be an object"),
        }
    }

    #[test]
    fn expand_placeholders() {
        let p = props(json!({"port": 8080, "host": "localhost", "debug": true, "empty": null}));
        assert_eq!(expand("--port={port}", &p), "--port=8080");
        assert_eq!(expand("{host}:{port}", &p), "localhost:8080");
        assert_eq!(expand("{debug}", &p), "true");
        assert_eq!(expand("x{empty}y", &p), "xy");
    }

    #[test]
    fn expand_leaves_unknown_and_unbalanced() {
        let p = props(json!({"a": "1"}));
        assert_eq!(expand("{missing}", &p), "{missing}");
        assert_eq!(expand("open {a", &p), "open {a");
        assert_eq!(expand("no braces", &p), "no braces");
        assert_eq!(expand("{a}}", &p), "1}");
    }

    #[test]
    fn command_action_renders() {
        let action = CommandAction::new(
            "serve",
            "web",
            vec!["npm".into(), "run".into(), "dev".into(), "--port={port}".into()],
        );
        assert_eq!(action.name(), "serve");
        assert_eq!(action.process().as_str(), "web");
        assert_eq!(
            action.render(&props(json!({"port": 3000}))),
            vec!["npm", "run", "dev", "--port=3000"]
        );
    }

    #[test]
    fn action_set_first_match_wins() {
        let set = ActionSet::new()
            .with(CommandAction::new("build", "first", vec!["make".into()]))
            .with(CommandAction::new("build", "second", vec!["ninja".into()]))
            .with(CommandAction::new("test", "test", vec!["make".into(), "test".into()]));

        assert_eq!(set.len(), 3);
        assert_eq!(set.names(), vec!["build", "build", "test"]);
        assert!(set.find("build").is_some());
        assert!(set.find("deploy").is_none());
        assert_eq!(format!("{:?}", set), r#"["build", "build", "test"]"#);
    }
}
