use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand};
use std::num::ParseIntError;
use std::process;
use std::time::Duration;

use crate::util::types::ModelId;

fn parse_duration(s: &str) -> Result<Duration, ParseIntError> {
    let millis: u64 = s.parse()?;
    Ok(Duration::from_millis(millis))
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)] // read from Cargo.toml
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub device: DeviceArgs,

    #[command(flatten)]
    pub telemetry: TelemetryArgs,

    #[command(flatten)]
    pub provisioning: ProvisioningArgs,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Connect and publish telemetry until interrupted with Control+C (default)
    #[default]
    Run,

    /// Control the device from an interactive console
    Console,
}

#[derive(Clone, Debug, Args)]
pub struct DeviceArgs {
    /// Device id, used as the registration id with the provisioning service
    #[arg(
        env = "IOTHUB_DEVICE_DPS_DEVICE_ID",
        long = "device-id",
        value_name = "id",
        global = true
    )]
    pub device_id: Option<String>,

    /// Base64 encoded device symmetric key
    #[arg(
        env = "IOTHUB_DEVICE_DPS_DEVICE_KEY",
        long = "device-key",
        value_name = "key",
        hide_env_values = true,
        global = true
    )]
    pub device_key: Option<String>,

    /// Provisioning service endpoint host or URI
    #[arg(
        env = "IOTHUB_DEVICE_DPS_ENDPOINT",
        long = "dps-endpoint",
        value_name = "uri",
        default_value = "global.azure-devices-provisioning.net",
        global = true
    )]
    pub dps_endpoint: String,

    /// Provisioning service id scope
    #[arg(
        env = "IOTHUB_DEVICE_DPS_ID_SCOPE",
        long = "id-scope",
        value_name = "scope",
        global = true
    )]
    pub id_scope: Option<String>,

    /// Model identifier announced during provisioning and on connect
    #[arg(
        env = "FREEZER_MODEL_ID",
        long = "model-id",
        value_name = "dtmi",
        default_value = ModelId::THERMOSTAT,
        global = true
    )]
    pub model_id: String,
}

#[derive(Clone, Debug, Args)]
pub struct TelemetryArgs {
    /// Telemetry interval in seconds
    #[arg(
        env = "FREEZER_TELEMETRY_INTERVAL_SECS",
        long = "interval-secs",
        value_name = "secs",
        default_value_t = 5,
        global = true
    )]
    pub interval_secs: u64,

    /// Lower bound of the simulated temperature
    #[arg(
        env = "FREEZER_TEMPERATURE_LOW",
        long = "temperature-low",
        value_name = "celsius",
        default_value_t = -20.0,
        allow_negative_numbers = true,
        global = true
    )]
    pub temperature_low: f64,

    /// Upper bound of the simulated temperature
    #[arg(
        env = "FREEZER_TEMPERATURE_HIGH",
        long = "temperature-high",
        value_name = "celsius",
        default_value_t = -15.0,
        allow_negative_numbers = true,
        global = true
    )]
    pub temperature_high: f64,

    /// Report a fixed temperature instead of a random one
    #[arg(
        env = "FREEZER_TEMPERATURE",
        long = "temperature",
        value_name = "celsius",
        allow_negative_numbers = true,
        global = true
    )]
    pub temperature: Option<f64>,

    /// Simulate an overheating freezer
    #[arg(env = "FREEZER_OVERHEAT", long = "overheat", global = true)]
    pub overheat: bool,
}

#[derive(Clone, Debug, Args)]
pub struct ProvisioningArgs {
    /// Provisioning request timeout in milliseconds
    #[arg(
        env = "FREEZER_DPS_REQUEST_TIMEOUT_MS",
        long = "dps-request-timeout-ms",
        value_name = "ms",
        value_parser = parse_duration,
        global = true
    )]
    pub request_timeout: Option<Duration>,

    /// Registration status poll interval in milliseconds
    #[arg(
        env = "FREEZER_DPS_POLL_INTERVAL_MS",
        long = "dps-poll-interval-ms",
        value_name = "ms",
        value_parser = parse_duration,
        global = true
    )]
    pub poll_interval: Option<Duration>,
}

/// Parse the command line, exiting with status 1 if the arguments
/// cannot be parsed.
pub fn parse() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp
            | ErrorKind::DisplayVersion
            | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => err.exit(),
            _ => {
                let _ = err.print();
                process::exit(1);
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["freezer"]).unwrap();

        assert_eq!(cli.command, None);
        assert_eq!(cli.device.dps_endpoint, "global.azure-devices-provisioning.net");
        assert_eq!(cli.device.model_id, "dtmi:com:example:Thermostat;1");
        assert_eq!(cli.telemetry.interval_secs, 5);
        assert_eq!(cli.telemetry.temperature_low, -20.0);
        assert_eq!(cli.telemetry.temperature_high, -15.0);
        assert_eq!(cli.telemetry.temperature, None);
        assert!(!cli.telemetry.overheat);
    }

    #[test]
    fn test_arguments_after_subcommand() {
        let cli = Cli::try_parse_from([
            "freezer",
            "console",
            "--device-id",
            "freezer-01",
            "--temperature-low",
            "-25.5",
            "--overheat",
            "--dps-poll-interval-ms",
            "500",
        ])
        .unwrap();

        assert_eq!(cli.command, Some(Command::Console));
        assert_eq!(cli.device.device_id.as_deref(), Some("freezer-01"));
        assert_eq!(cli.telemetry.temperature_low, -25.5);
        assert!(cli.telemetry.overheat);
        assert_eq!(
            cli.provisioning.poll_interval,
            Some(Duration::from_millis(500))
        );
    }

    #[test]
    fn test_invalid_interval_is_a_parse_error() {
        let res = Cli::try_parse_from(["freezer", "--interval-secs", "soon"]);

        assert!(res.is_err());
    }
}
