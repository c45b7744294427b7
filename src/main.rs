//! CLI for mqttrelay
//!
//! Loads configuration, connects to the broker and serves WebSocket clients
//! until Ctrl-C.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use mqttrelay::config::load_config;
use mqttrelay::hub::FanoutHub;
use mqttrelay::relay::{Relay, RetryPolicy};
use mqttrelay::transport::Server;
use mqttrelay::upstream::MqttSource;
use mqttrelay::utils::error::RelayError;
use mqttrelay::utils::logging;
use mqttrelay::utils::shutdown::shutdown_channel;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "mqttrelay", about = "Relay one MQTT topic to WebSocket clients")]
struct Cli {
    /// Configuration file layered over config/default.* and config.*
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level, overrides `log.level` (RUST_LOG still wins)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let settings = match load_config(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            logging::init(cli.log_level.as_deref().unwrap_or("info"));
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    logging::init(cli.log_level.as_deref().unwrap_or(&settings.log.level));

    match run(settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Relay failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(settings: mqttrelay::config::Settings) -> Result<(), RelayError> {
    settings.validate()?;

    let hub = FanoutHub::with_backlog(settings.hub.backlog);
    let source = MqttSource::from_settings(&settings.upstream)?;
    let relay = Relay::new(
        source,
        hub.clone(),
        settings.upstream.topic.clone(),
        RetryPolicy::from(&settings.upstream),
    );

    let (trigger, mut shutdown) = shutdown_channel();
    let trigger = Arc::new(trigger);
    {
        let trigger = trigger.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Shutdown signal received. Exiting gracefully.");
                    trigger.trigger();
                }
                Err(e) => error!("Unable to listen for shutdown signal: {}", e),
            }
        });
    }

    let stream = match relay.start(&mut shutdown).await {
        Ok(Some(stream)) => stream,
        Ok(None) => {
            relay.terminate();
            return Ok(());
        }
        Err(e) => {
            relay.terminate();
            return Err(e);
        }
    };

    let server = match Server::bind(&settings.listen_addr(), hub, shutdown.clone()).await {
        Ok(server) => server,
        Err(e) => {
            relay.terminate();
            return Err(e.into());
        }
    };
    let server_task = tokio::spawn(server.run());

    let outcome = relay.run(stream, shutdown).await;
    // A fatal upstream error takes the server down with it.
    trigger.trigger();
    if let Err(e) = server_task.await {
        error!("WebSocket server task failed: {}", e);
    }

    relay.terminate();
    info!("Relay stopped");
    outcome
}
