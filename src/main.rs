#![forbid(unsafe_code)]

//! `object-exchange`: interactive demo of two-process object sync.
//!
//! Run one instance as the listener and one as the connector on the same
//! channel. Edits typed into either instance show up in the other:
//!
//! ```text
//! object-exchange --channel Channel --role listener
//! object-exchange --channel Channel --role connector
//! ```
//!
//! Commands read from stdin: `text <value>`, `int <number>`, `show`, `quit`.

use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use object_exchange::console::{print_record, run_console, spawn_line_reader, ConsoleExit};
use object_exchange::exchange::codec::JsonCodec;
use object_exchange::models::demo::{DemoRecord, DEMO_OBJECT_NAME};
use object_exchange::transport::pipe::PipeTransport;
use object_exchange::{
    AppError, ExchangeConfig, ExchangeCoordinator, ExchangeEvent, ExchangeRole, Result,
    SharedObject,
};

/// Upper bound on waiting for spawned tasks once the operator loop is done.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "object-exchange", about = "Synchronize an object with a peer process", version, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Channel name both peers use. Overrides the config file.
    #[arg(long)]
    channel: Option<String>,

    /// Side of the pipe to own. Overrides the config file.
    #[arg(long, value_enum)]
    role: Option<ExchangeRole>,

    /// Name of the exchanged object.
    #[arg(long, default_value = DEMO_OBJECT_NAME)]
    object: String,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?;
    let result = runtime.block_on(run(args));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);
    result
}

async fn run(args: Cli) -> Result<()> {
    // ── Resolve configuration ───────────────────────────
    let config = resolve_config(&args)?;
    info!(channel = %config.channel_name, role = %config.role, "configuration loaded");

    // ── Build the coordinator ───────────────────────────
    let settings = config.settings();
    let object = SharedObject::new(DemoRecord::named(args.object.clone()));
    let coordinator = ExchangeCoordinator::with_options(
        object.clone(),
        Arc::new(PipeTransport::with_max_frame_bytes(settings.max_frame_bytes)),
        settings,
        Arc::new(JsonCodec::new()),
    );
    let events = coordinator.subscribe();
    let printer = tokio::spawn(print_events(events));

    coordinator
        .start(&config.channel_name, config.role)
        .await
        .map_err(|err| {
            error!(%err, "exchange failed to start");
            err
        })?;

    // ── Operator loop ───────────────────────────────────
    let mut lines = spawn_line_reader(BufReader::new(std::io::stdin()));
    match run_console(&mut lines, &object, shutdown_signal()).await {
        ConsoleExit::Quit => info!("quit requested"),
        ConsoleExit::InputClosed => info!("stdin closed"),
        ConsoleExit::Shutdown => {}
    }

    coordinator.stop();
    let stats = coordinator.stats();
    info!(
        sent = stats.sent,
        applied = stats.applied,
        rejected = stats.rejected,
        connect_attempts = stats.connect_attempts,
        "object-exchange shut down"
    );
    drop(coordinator);
    printer.abort();

    Ok(())
}

fn resolve_config(args: &Cli) -> Result<ExchangeConfig> {
    let mut config = match &args.config {
        Some(path) => ExchangeConfig::load_from_path(path)?,
        None => {
            let channel = args.channel.clone().ok_or_else(|| {
                AppError::Config("--channel is required without --config".into())
            })?;
            let role = args.role.ok_or_else(|| {
                AppError::Config("--role is required without --config".into())
            })?;
            return ExchangeConfig::new(channel, role);
        }
    };

    // Command-line values win over the file.
    if let Some(channel) = &args.channel {
        channel.clone_into(&mut config.channel_name);
    }
    if let Some(role) = args.role {
        config.role = role;
    }
    object_exchange::config::validate_channel_name(&config.channel_name)?;
    Ok(config)
}

async fn print_events(mut events: broadcast::Receiver<ExchangeEvent<DemoRecord>>) {
    loop {
        match events.recv().await {
            Ok(ExchangeEvent::ObjectChanged(object)) => {
                println!("<- remote update");
                print_record(&object.snapshot());
            }
            Ok(ExchangeEvent::ConnectionStateChange(connected)) => {
                println!(
                    "** peer {}",
                    if connected { "connected" } else { "disconnected" }
                );
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Resolves on ctrl-c, or SIGTERM on unix, and logs which one arrived.
async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(%err, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signal = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                error!(%err, "ctrl-c handler failed");
            }
            "ctrl-c"
        }
        () = terminate => "SIGTERM",
    };
    info!(signal, "shutdown signal received, stopping exchange");
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
