//! Relay receiver - Accepts remote action requests over the relay and hands
//! them to the action engine.

mod runner;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use observability::LogConfig;
use relay_receiver::{FileGlobalConfig, ReceiverConfig, RelayReceiver};
use tracing::{info, warn};

use runner::LoggingActionRunner;

/// How long shutdown waits for the current connection to end.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Relay receiver command-line interface.
///
/// Flags override the `WEBSOCKET_RELAY_ADDRESS`, `INCOMING_*` and
/// `RECEIVER_ENABLE_WEBSOCKET_TRACING` environment variables.
#[derive(Parser)]
#[command(name = "relay-receiver")]
#[command(about = "Receive signed action requests from the relay")]
#[command(version)]
struct Cli {
    /// Relay WebSocket URL
    #[arg(long)]
    relay_address: Option<String>,

    /// Do not open a relay connection
    #[arg(long)]
    disable_incoming: bool,

    /// Log every raw frame at debug level
    #[arg(long)]
    trace_transport: bool,

    /// Delay between reconnect attempts, in seconds
    #[arg(long)]
    reconnect_delay_secs: Option<u64>,

    /// Maximum age of a signed request, in seconds
    #[arg(long)]
    request_window_secs: Option<u64>,

    /// JSON file holding account_id, cluster_name, signing_key and target_id.
    /// Re-read on every request. Defaults to ~/.action-relay/global_config.json
    #[arg(long, env = "RELAY_RECEIVER_GLOBAL_CONFIG")]
    global_config: Option<PathBuf>,

    /// Node identity used when the global config file has none
    #[arg(long, env = "RELAY_RECEIVER_TARGET_ID")]
    target_id: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// JSONL log file. Defaults to ~/.action-relay/logs/dev.jsonl
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn receiver_config(&self) -> ReceiverConfig {
        let mut config = ReceiverConfig::from_env();
        if let Some(address) = &self.relay_address {
            config.relay_address = address.trim().to_string();
        }
        if self.disable_incoming {
            config.incoming_enabled = false;
        }
        if self.trace_transport {
            config.transport_tracing = true;
        }
        if let Some(secs) = self.reconnect_delay_secs {
            config.reconnect_delay = Duration::from_secs(secs);
        }
        if let Some(secs) = self.request_window_secs {
            config.request_time_window_secs = secs;
        }
        config
    }

    fn global_config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.global_config {
            Some(path) => Ok(path.clone()),
            None => dirs::home_dir()
                .map(|home| home.join(".action-relay").join("global_config.json"))
                .ok_or_else(|| anyhow::anyhow!("could not determine home directory")),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    observability::init_with_config(LogConfig {
        service_name: "relay-receiver".into(),
        default_level: cli.log_level.clone(),
        log_path: cli
            .log_file
            .clone()
            .or_else(observability::default_log_path),
        also_stderr: true,
    });

    let config = cli.receiver_config();
    let global_path = cli.global_config_path()?;
    let target_id = cli
        .target_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    info!(
        global_config = %global_path.display(),
        fallback_target_id = %target_id,
        "Using global config file"
    );

    let receiver = RelayReceiver::new(
        config,
        Arc::new(LoggingActionRunner),
        Arc::new(FileGlobalConfig::new(global_path, target_id)),
    );

    let Some(handle) = receiver.start()? else {
        info!("Nothing to receive, exiting");
        return Ok(());
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    handle.stop();

    match tokio::time::timeout(SHUTDOWN_GRACE, tokio::task::spawn_blocking(move || handle.join()))
        .await
    {
        Ok(Ok(Ok(()))) => info!("Relay receiver shut down"),
        Ok(Ok(Err(_))) => warn!("Relay receiver thread panicked"),
        Ok(Err(e)) => warn!(error = %e, "Failed to join relay receiver thread"),
        Err(_) => warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "Relay connection still open, exiting without waiting"
        ),
    }

    Ok(())
}
