//! Keystroke Agent CLI
//!
//! Per-project keystroke aggregation for editor plugins.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use keystroke_agent::{
    config::{Config, Overrides},
    core::{Aggregator, TokioSizeProbe},
    delivery::CompanionClient,
    feed::EventFeed,
    notice::FailureNotice,
    scheduler::{FlushScheduler, KeystrokeService},
    stats::{read_persisted, ActivityStats},
    VERSION,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "keystroke-agent")]
#[command(version = VERSION)]
#[command(about = "Per-project keystroke aggregation for editor plugins", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start aggregating editor events
    Start {
        /// Do not read JSON-lines events from stdin
        #[arg(long)]
        no_stdin: bool,

        /// Also accept events over HTTP (requires server feature)
        #[arg(long)]
        serve: bool,

        /// Port for the HTTP event server
        #[arg(long)]
        port: Option<u16>,

        /// Flush interval in seconds
        #[arg(long)]
        interval: Option<u64>,

        /// Plugin manager API base URL
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Show configuration and statistics from the last session
    Status,

    /// Check whether the plugin manager is reachable
    Ping,

    /// Show configuration
    Config,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Start {
            no_stdin,
            serve,
            port,
            interval,
            base_url,
        } => cmd_start(!no_stdin, serve, port, interval, base_url),
        Commands::Status => cmd_status(),
        Commands::Ping => cmd_ping(),
        Commands::Config => cmd_config(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

/// Log to stderr; stdin carries the event feed.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("keystroke_agent=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config() -> Config {
    Config::load().unwrap_or_else(|e| {
        tracing::warn!("Could not load config, using defaults: {}", e);
        Config::default()
    })
}

fn cmd_start(
    read_stdin: bool,
    serve: bool,
    port: Option<u16>,
    interval: Option<u64>,
    base_url: Option<String>,
) -> anyhow::Result<()> {
    let (mut config, plugin_uuid) = match Config::load_session(&Config::config_path()) {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!("Could not load config, using defaults: {}", e);
            let mut config = Config::default();
            let (id, _) = config.ensure_plugin_uuid();
            (config, id)
        }
    };
    config.apply(Overrides {
        flush_secs: interval,
        base_url,
        server_port: port,
    })?;
    if let Err(e) = config.ensure_directories() {
        tracing::warn!("Could not create data directory: {}", e);
    }

    tracing::info!("Keystroke Agent v{} starting", VERSION);
    tracing::info!("Flush interval: {}s", config.flush_interval.as_secs());
    tracing::info!("Plugin manager: {}", config.companion.data_url());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create async runtime")?;

    let client = CompanionClient::new(config.companion.clone(), VERSION, &plugin_uuid)?;
    if !runtime.block_on(client.is_available()) {
        tracing::warn!("Plugin manager is not reachable yet; data will be dropped until it is");
    }

    let stats = Arc::new(ActivityStats::with_persistence(config.stats_path()));
    let aggregator = Aggregator::new(config.flush_interval.as_secs())
        .with_size_probe(Arc::new(TokioSizeProbe::new(runtime.handle().clone())));
    let service = Arc::new(KeystrokeService::new(
        aggregator,
        Arc::new(client),
        Arc::new(FailureNotice::default()),
        stats.clone(),
    ));

    let scheduler = FlushScheduler::start_on(runtime.handle(), service.clone(), config.flush_interval);

    #[cfg(feature = "server")]
    let server_shutdown = if serve {
        let server_config = keystroke_agent::server::ServerConfig::new(config.server_port);
        let (addr, shutdown_tx) = runtime
            .block_on(keystroke_agent::server::run(server_config, service.clone()))
            .context("Failed to start event server")?;
        tracing::info!("Accepting events on http://{}/events", addr);
        Some(shutdown_tx)
    } else {
        None
    };

    #[cfg(not(feature = "server"))]
    if serve {
        tracing::warn!("--serve ignored (server feature not enabled at compile time)");
    }

    #[cfg(feature = "server")]
    let serving = server_shutdown.is_some();
    #[cfg(not(feature = "server"))]
    let serving = false;

    anyhow::ensure!(
        read_stdin || serving,
        "no event source: drop --no-stdin or use --serve"
    );

    let mut feed = EventFeed::new();
    if read_stdin {
        feed.start_stdin()?;
    }

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    // Main event loop
    let receiver = feed.receiver().clone();
    while running.load(Ordering::SeqCst) {
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => {
                service.handle_event(&event);
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                // Editor closed our stdin and nothing else can feed us.
                if read_stdin && !feed.is_running() && !serving {
                    tracing::info!("Event feed closed");
                    break;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                tracing::error!("Event feed disconnected unexpectedly");
                break;
            }
        }
    }

    tracing::info!("Stopping...");
    feed.stop();
    runtime.block_on(scheduler.shutdown());

    #[cfg(feature = "server")]
    if let Some(tx) = server_shutdown {
        let _ = tx.send(());
    }

    let pending = service.with_aggregator(|agg| agg.len());
    if pending > 0 {
        tracing::info!("Dropping {} unflushed record(s)", pending);
    }

    if let Err(e) = stats.save() {
        tracing::warn!("Could not save activity stats: {}", e);
    }
    runtime.shutdown_timeout(Duration::from_secs(1));

    eprintln!();
    eprintln!("{}", stats.summary());
    Ok(())
}

fn cmd_status() -> anyhow::Result<()> {
    let config = load_config();

    println!("Keystroke Agent Status");
    println!("======================");
    println!();
    println!("Configuration:");
    println!("  Flush interval: {}s", config.flush_interval.as_secs());
    println!("  Plugin manager: {}", config.companion.data_url());
    println!("  Event server port: {}", config.server_port);
    println!();

    let stats_path = config.stats_path();
    if stats_path.exists() {
        let stats = read_persisted(&stats_path)
            .with_context(|| format!("Failed to read {}", stats_path.display()))?;
        println!("Cumulative Statistics:");
        println!("  Events counted: {}", stats.events_counted);
        println!("  Events ignored: {}", stats.events_ignored);
        println!("  Records delivered: {}", stats.records_delivered);
        println!("  Records failed: {}", stats.records_failed);
        println!("  Empty records discarded: {}", stats.records_discarded);
        println!("  Last updated: {}", stats.last_updated.format("%Y-%m-%d %H:%M:%S UTC"));
    } else {
        println!("No previous session data found.");
    }
    Ok(())
}

fn cmd_ping() -> anyhow::Result<()> {
    let mut config = load_config();
    let (plugin_uuid, _) = config.ensure_plugin_uuid();
    let client = CompanionClient::new(config.companion.clone(), VERSION, &plugin_uuid)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create async runtime")?;

    if runtime.block_on(client.is_available()) {
        println!("Plugin manager at {} is available ✓", config.companion.base_url);
        Ok(())
    } else {
        anyhow::bail!(
            "Plugin manager at {} is not reachable",
            config.companion.base_url
        )
    }
}

fn cmd_config() -> anyhow::Result<()> {
    let config = load_config();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("Error setting Ctrl+C handler")
}
