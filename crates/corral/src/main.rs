//! corral - run configured actions under a process supervisor
//!
//! Wires together:
//! - Configuration loading
//! - The Linux launcher, tree killer and host control
//! - One supervisor and the exit coordinator
//! - Event printing, drained before exit

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use clap::Parser;
use corral_config::{Config, load_config};
use corral_core::{
    ActionSet, Cleanup, CommandAction, ExitCoordinator, ExitTrigger, ProcessRegistry, Props,
    StripAnsiHook, Supervisor, SupervisorEvent, SupervisorOptions, SupervisorResult,
};
use corral_host_linux::{LinuxHostControl, LinuxLauncher, LinuxTreeKiller};
use corral_util::{CORRAL_ENV, RunMode, default_config_path};
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// corral - run configured actions under a process supervisor
#[derive(Parser, Debug)]
#[command(name = "corral")]
#[command(about = "Run configured actions under a process supervisor", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/corral/corral.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Run mode: ui captures output as JSON events, cli inherits the terminal
    /// and exits with the first child's status
    #[arg(short, long, env = CORRAL_ENV, default_value = "cli")]
    mode: String,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Property passed to every action, as key=value
    #[arg(short, long = "prop", value_parser = parse_prop)]
    props: Vec<(String, Value)>,

    /// Actions to run, in order
    #[arg(required = true)]
    actions: Vec<String>,
}

/// Parse `key=value`; values that parse as JSON keep their type
fn parse_prop(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty property name in '{}'", raw));
    }

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn build_actions(config: &Config) -> ActionSet {
    let mut actions = ActionSet::new();
    for action in &config.actions {
        actions.push(CommandAction::new(
            action.name.clone(),
            action.process.clone(),
            action.command.clone(),
        ));
    }
    actions
}

fn build_supervisor(config: &Config, registry: &ProcessRegistry, mode: RunMode) -> Arc<Supervisor> {
    let mut options = SupervisorOptions::new(mode)
        .label("corral")
        .shell(config.supervisor.shell_policy);
    if config.supervisor.strip_ansi {
        options = options.line_hook(StripAnsiHook);
    }

    Supervisor::new(
        registry,
        Arc::new(LinuxLauncher::with_shell(config.supervisor.shell.clone())),
        Arc::new(LinuxTreeKiller::new(config.supervisor.kill_mode)),
        Arc::new(build_actions(config)),
        options,
    )
}

/// Print events: JSON lines in ui mode, plain text otherwise
async fn print_events(mut events: mpsc::UnboundedReceiver<SupervisorEvent>, mode: RunMode) {
    while let Some(event) = events.recv().await {
        if mode == RunMode::Ui {
            match serde_json::to_string(&event) {
                Ok(json) => println!("{}", json),
                Err(e) => error!(error = %e, "Failed to encode event"),
            }
            continue;
        }

        match event {
            SupervisorEvent::Data(line) => println!("{}", line),
            SupervisorEvent::Error(line) => eprintln!("{}", line),
            SupervisorEvent::Action(_) => {}
        }
    }
}

/// How long shutdown waits for queued events to be printed
const EVENT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Exit cleanup member that flushes the event printer
///
/// Registered after the supervisor, so it runs once every process is gone
/// and their last lines are queued.
struct EventPrinter {
    supervisor: Arc<Supervisor>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EventPrinter {
    fn start(supervisor: Arc<Supervisor>, mode: RunMode) -> Self {
        let task = supervisor
            .subscribe()
            .map(|events| tokio::spawn(print_events(events, mode)));
        Self {
            supervisor,
            task: Mutex::new(task),
        }
    }
}

#[async_trait]
impl Cleanup for EventPrinter {
    fn label(&self) -> &str {
        "events"
    }

    async fn clean(&self) -> SupervisorResult<()> {
        self.supervisor.close_events();

        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(task) = task else {
            return Ok(());
        };

        match tokio::time::timeout(EVENT_DRAIN_TIMEOUT, task).await {
            Ok(Ok(())) => debug!("Event stream drained"),
            Ok(Err(e)) => warn!(error = %e, "Event printer failed"),
            Err(_) => warn!(timeout = ?EVENT_DRAIN_TIMEOUT, "Gave up draining events"),
        }
        Ok(())
    }
}

async fn run(args: Args) -> Result<i32> {
    let mode = RunMode::parse(&args.mode);

    let config = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    info!(
        config_path = %args.config.display(),
        action_count = config.actions.len(),
        mode = %mode,
        "Configuration loaded"
    );

    for name in &args.actions {
        if config.get_action(name).is_none() {
            bail!("Unknown action: {}", name);
        }
    }

    let registry = ProcessRegistry::new();
    let coordinator = ExitCoordinator::new(registry.clone(), mode, Arc::new(LinuxHostControl::new()));
    coordinator.install_panic_hook();

    let supervisor = build_supervisor(&config, &registry, mode);
    registry.register(Arc::new(EventPrinter::start(supervisor.clone(), mode)));

    let props: Props = args.props.into_iter().collect();

    for name in &args.actions {
        if let Err(e) = supervisor.run(name, props.clone()) {
            error!(action = %name, error = %e, "Action failed");
            let outcome = coordinator.shutdown(ExitTrigger::Fault(e.to_string())).await;
            return Ok(outcome.exit_code().unwrap_or(1));
        }
    }

    // cli exits with the first child; other modes once nothing is left running
    if !mode.owns_exit() {
        let supervisor = supervisor.clone();
        let triggers = registry.trigger_sender();
        tokio::spawn(async move {
            supervisor.wait_idle().await;
            info!("All actions finished");
            triggers.fire(ExitTrigger::Exit(0));
        });
    }

    let outcome = coordinator.watch().await?;
    Ok(outcome.exit_code().unwrap_or(0))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries child output and events
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "corral starting");

    let code = run(args).await?;
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_core::ActionCatalog;

    #[test]
    fn props_keep_json_types() {
        assert_eq!(parse_prop("port=8080").unwrap(), ("port".into(), serde_json::json!(8080)));
        assert_eq!(parse_prop("debug=true").unwrap(), ("debug".into(), serde_json::json!(true)));
        assert_eq!(
            parse_prop("target=release").unwrap(),
            ("target".into(), serde_json::json!("release"))
        );
        assert_eq!(parse_prop("expr=a=b").unwrap(), ("expr".into(), serde_json::json!("a=b")));
    }

    #[test]
    fn malformed_props_are_rejected() {
        assert!(parse_prop("novalue").is_err());
        assert!(parse_prop("=value").is_err());
    }

    #[test]
    fn actions_follow_config_order() {
        let config = corral_config::parse_config(
            r#"
            config_version = 1

            [[actions]]
            name = "build"
            command = ["cargo", "build"]

            [[actions]]
            name = "serve"
            process = "web"
            command = ["npm", "start"]
            "#,
        )
        .unwrap();

        let actions = build_actions(&config);
        assert_eq!(actions.names(), vec!["build", "serve"]);
        assert!(actions.find("serve").is_some());
        assert!(actions.find("deploy").is_none());
    }

    #[tokio::test]
    async fn event_printer_drains_on_cleanup() {
        let config = corral_config::parse_config("config_version = 1").unwrap();
        let registry = ProcessRegistry::new();
        let supervisor = build_supervisor(&config, &registry, RunMode::Ui);
        let printer = EventPrinter::start(supervisor.clone(), RunMode::Ui);

        supervisor.log("final words", corral_core::LogKind::Error);
        printer.clean().await.unwrap();

        assert!(printer.task.lock().unwrap().is_none());
        // A second pass has nothing left to wait for
        printer.clean().await.unwrap();
    }

    #[test]
    fn args_parse() {
        let args = Args::try_parse_from([
            "corral", "--mode", "ui", "--prop", "port=3000", "build", "serve",
        ])
        .unwrap();
        assert_eq!(args.mode, "ui");
        assert_eq!(args.actions, vec!["build", "serve"]);
        assert_eq!(args.props, vec![("port".to_string(), serde_json::json!(3000))]);
    }
}
