use std::error::Error;
use std::process;

use tracing::{error, info, instrument, trace};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

mod cli;
mod config;
mod console;
mod headless;

#[cfg(test)]
mod testing;

use freezer_device as device;
use freezer_remote as remote;
use freezer_util as util;

use crate::cli::Command;
use crate::config::Config;
use crate::device::Session;
use crate::remote::{DpsClient, HubTransport};
use crate::util::interrupt::Interrupt;

fn initialize_tracing() {
    // Initialize tracing subscriber for human-readable logs
    tracing_subscriber::registry()
        .with(
            // Use some log defaults. These can be overriden using
            // RUST_LOG
            EnvFilter::try_from_default_env().unwrap_or(
                EnvFilter::default()
                    .add_directive("debug".parse().unwrap())
                    .add_directive("rumqttc=warn".parse().unwrap())
                    .add_directive("hyper=error".parse().unwrap())
                    .add_directive("reqwest=info".parse().unwrap()),
            ),
        )
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_span_events(FmtSpan::CLOSE)
                .event_format(fmt::format().compact().with_target(false).without_time()),
        )
        .init();
}

/// Trigger the shutdown interrupt on Control+C
async fn interrupt_on_ctrl_c(shutdown: Interrupt) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("freezer execution cancellation requested, will exit");
            shutdown.trigger();
        }
        Err(e) => error!("failed to listen for Control+C: {e}"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    initialize_tracing();

    let cli = cli::parse();
    let config = match Config::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    start(cli.command.unwrap_or_default(), config).await?;

    Ok(())
}

#[instrument(name = "freezer", skip_all, err)]
async fn start(command: Command, config: Config) -> Result<(), Box<dyn Error>> {
    trace!(
        identity = ?config.identity,
        telemetry = ?config.telemetry,
        provisioning = ?config.provisioning,
        hub = ?config.hub,
        "using config:"
    );

    let session = Session::new(
        config.identity,
        config.model_id,
        DpsClient::new(config.provisioning),
        HubTransport::new(config.hub),
    )
    .with_settings(config.telemetry)
    .with_overheat(config.overheat);

    let shutdown = Interrupt::new();
    tokio::spawn(interrupt_on_ctrl_c(shutdown.clone()));

    match command {
        Command::Run => headless::run(session, shutdown).await?,
        Command::Console => console::run(session, console::stdin_lines(), shutdown).await?,
    }

    Ok(())
}
