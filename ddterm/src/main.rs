use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result};
use argh::FromArgs;
use ddterm::app::ActionBroker;
use ddterm::core::Config;
use ddterm::dbus::SessionBus;
use ddterm::platform::ProcessSpawner;
use ddterm::settings::{JsonSettingsStore, Settings};
use ddterm_ipc::APP_ID;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::LocalSet;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long to wait for the initial name owner query.
const PRESENCE_TIMEOUT: Duration = Duration::from_secs(2);
/// How long pending remote calls may take before exiting.
const CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// ddterm - dropdown terminal window controller
#[derive(FromArgs)]
struct Cli {
    /// command that starts the terminal when it is not running
    #[argh(option)]
    app: Option<String>,
    /// settings file read by `status` (default: the user config dir)
    #[argh(option)]
    settings: Option<PathBuf>,
    #[argh(subcommand)]
    command: Option<SubCommand>,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum SubCommand {
    Toggle(ToggleCmd),
    Show(ShowCmd),
    Hide(HideCmd),
    Quit(QuitCmd),
    Status(StatusCmd),
    Version(VersionCmd),
}

/// Show the terminal if hidden, hide it otherwise; starts it if needed
#[derive(FromArgs)]
#[argh(subcommand, name = "toggle")]
struct ToggleCmd {}

/// Show the terminal, starting it if needed
#[derive(FromArgs)]
#[argh(subcommand, name = "show")]
struct ShowCmd {}

/// Hide the terminal if it is running
#[derive(FromArgs)]
#[argh(subcommand, name = "hide")]
struct HideCmd {}

/// Ask the running terminal to quit
#[derive(FromArgs)]
#[argh(subcommand, name = "quit")]
struct QuitCmd {}

/// Print whether the terminal is running and the window settings
#[derive(FromArgs)]
#[argh(subcommand, name = "status")]
struct StatusCmd {
    /// print as JSON
    #[argh(switch)]
    json: bool,
}

/// Show version information
#[derive(FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCmd {}

#[derive(Serialize)]
struct Status {
    running: bool,
    bus_name: &'static str,
    app_command: Vec<String>,
    settings_path: String,
    window_height: f64,
    window_maximize: bool,
    window_position: &'static str,
}

fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    let command = match cli.command {
        None => {
            // No subcommand - show help (simulate --help)
            let args: Vec<&str> = vec!["ddterm", "--help"];
            if let Err(e) = Cli::from_args(&args[..1], &args[1..]) {
                println!("{}", e.output);
            }
            return Ok(());
        }
        Some(SubCommand::Version(_)) => {
            println!("ddterm {}", VERSION);
            return Ok(());
        }
        Some(command) => command,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let app_command = cli
        .app
        .map(|app| app.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    let mut config = Config::new().with_app_command(app_command);
    if let Some(path) = cli.settings {
        config = config.with_settings_path(path);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")?;
    let local = LocalSet::new();

    let result = local.block_on(&runtime, run(command, config));

    // Let fire-and-forget bus calls finish before exiting
    let drained = runtime.block_on(async { tokio::time::timeout(CALL_TIMEOUT, local).await });
    if drained.is_err() {
        tracing::warn!("Pending bus calls did not finish in {:?}", CALL_TIMEOUT);
    }

    result
}

async fn run(command: SubCommand, config: Config) -> Result<()> {
    let bus = Rc::new(SessionBus::connect().await?);
    let broker = ActionBroker::new(bus, Rc::new(ProcessSpawner), config.app_command.clone());

    let (tx, rx) = oneshot::channel();
    let tx = RefCell::new(Some(tx));
    broker.presence_changed().connect(move |present| {
        if let Some(tx) = tx.borrow_mut().take() {
            let _ = tx.send(*present);
        }
    });
    broker.enable()?;

    let present = tokio::time::timeout(PRESENCE_TIMEOUT, rx)
        .await
        .with_context(|| format!("Timed out looking up {} on the bus", APP_ID))?
        .context("Bus name watch stopped")?;
    tracing::debug!("{} running: {}", APP_ID, present);

    let quit = matches!(command, SubCommand::Quit(_));
    let result = match command {
        SubCommand::Toggle(_) => broker.toggle(),
        SubCommand::Show(_) => broker.show(),
        SubCommand::Hide(_) => {
            broker.hide();
            Ok(())
        }
        SubCommand::Quit(_) => {
            if !present {
                println!("{} is not running", APP_ID);
            }
            Ok(())
        }
        SubCommand::Status(cmd) => print_status(&broker, &config, cmd.json),
        SubCommand::Version(_) => unreachable!("handled in main"),
    };

    broker.disable(quit);
    result
}

fn print_status(broker: &ActionBroker, config: &Config, json: bool) -> Result<()> {
    let store = JsonSettingsStore::load(&config.settings_path)?;
    let settings = Settings::new(Rc::new(store));

    let status = Status {
        running: broker.is_present(),
        bus_name: APP_ID,
        app_command: broker.spawn_command(),
        settings_path: config.settings_path.display().to_string(),
        window_height: settings.window_height().get(),
        window_maximize: settings.window_maximize(),
        window_position: settings.window_position().name(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Running: {}", status.running);
    println!("Bus name: {}", status.bus_name);
    println!("Start command: {}", status.app_command.join(" "));
    println!("Settings: {}", status.settings_path);
    println!("Window height: {}", status.window_height);
    println!("Window maximize: {}", status.window_maximize);
    println!("Window position: {}", status.window_position);
    Ok(())
}
