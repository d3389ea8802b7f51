//! CLI entrypoint for the automation kernel.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use softrelay_runtime::card::CardLayout;
use softrelay_runtime::config::{validate_cards, ConfigManager, ConfigStore};
use softrelay_runtime::control::command_channel;
use softrelay_runtime::hal::{Hal, StdHal};
use softrelay_runtime::pause::PauseBarrier;
use softrelay_runtime::runner::ScanRunner;
use softrelay_runtime::snapshot::SharedSnapshot;
use softrelay_runtime::web::{start_portal, PortalState};
use softrelay_runtime::Engine;

#[derive(Debug, Parser)]
#[command(name = "softrelay-runtime", about = "Configuration-driven automation kernel")]
struct Cli {
    /// Increase log verbosity.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the kernel with the portal (default).
    Run {
        /// Configuration store directory.
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,
        /// Portal HTTP listen address.
        #[arg(long, default_value = "0.0.0.0:8080")]
        listen: String,
        /// Portal WebSocket listen address.
        #[arg(long, default_value = "0.0.0.0:8081")]
        ws_listen: String,
    },
    /// Validate a configuration file and exit.
    Validate {
        /// Path to a JSON card array.
        file: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    match cli.command {
        None => run(PathBuf::from("./data"), "0.0.0.0:8080", "0.0.0.0:8081"),
        Some(Command::Run {
            data_dir,
            listen,
            ws_listen,
        }) => run(data_dir, &listen, &ws_listen),
        Some(Command::Validate { file }) => validate(&file),
    }
}

fn run(data_dir: PathBuf, listen: &str, ws_listen: &str) -> anyhow::Result<()> {
    let layout = CardLayout::factory();
    let hal = StdHal::new();
    let snapshot = Arc::new(SharedSnapshot::new());
    let barrier = Arc::new(PauseBarrier::new());
    let (commands, queue) = command_channel();

    let store = ConfigStore::open(&data_dir)
        .with_context(|| format!("open config store at {}", data_dir.display()))?;

    // The engine boots before the manager exists; wire them up afterwards.
    let engine = Arc::new(Mutex::new(Engine::factory(10)));
    let clock = {
        let hal = hal.clone();
        Arc::new(move || hal.monotonic_ms()) as Arc<dyn Fn() -> u64 + Send + Sync>
    };
    let manager = Arc::new(ConfigManager::new(
        layout,
        store,
        engine.clone(),
        snapshot.clone(),
        barrier.clone(),
        clock,
    )?);

    let (cards, degraded) = manager.boot_cards();
    let settings = manager.portal_settings().unwrap_or_default();
    {
        let mut engine = engine.lock().expect("engine lock poisoned");
        engine.apply_config(cards);
        engine.set_scan_interval_ms(settings.scan_interval_ms);
        engine.set_storage_degraded(degraded);
    }
    if degraded {
        info!("config store degraded; running on in-memory factory defaults");
    }

    let runner = ScanRunner::new(engine, hal, snapshot.clone(), barrier, queue);
    let mut handle = runner.spawn("softrelay-scan")?;

    let portal = start_portal(
        listen,
        ws_listen,
        PortalState {
            manager,
            snapshot,
            commands,
        },
    )?;
    info!(
        "portal listening on http://{} (ws://{})",
        portal.http_addr(),
        portal.ws_addr()
    );

    handle
        .join()
        .map_err(|_| anyhow::anyhow!("scan executor panicked"))?;
    Ok(())
}

fn validate(file: &PathBuf) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("read {}", file.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("parse {}", file.display()))?;
    let cards = value
        .get("config")
        .and_then(|config| config.get("cards"))
        .unwrap_or(&value);

    let layout = CardLayout::factory();
    let report = validate_cards(cards, &layout);
    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    for error in &report.errors {
        println!("error: {error}");
    }
    if report.is_ok() {
        println!("ok: {} cards valid", layout.total());
        Ok(())
    } else {
        anyhow::bail!("{} validation error(s)", report.errors.len());
    }
}
