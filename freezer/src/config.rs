use thiserror::Error;

use crate::cli::Cli;
use crate::device::{DeviceIdentity, SettingsError, TelemetrySettings};
use crate::remote::{HubConfig, ProvisioningConfig};
use crate::util::http::{InvalidUriError, Uri};
use crate::util::types::ModelId;

use std::time::Duration;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "Required parameter '{0}' is not set. Please recheck required variables by using \"--help\""
    )]
    Missing(&'static str),

    #[error("Invalid provisioning endpoint: {0}")]
    Endpoint(#[from] InvalidUriError),

    #[error("Invalid telemetry settings: {0}")]
    Settings(#[from] SettingsError),
}

/// Validated runtime configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub identity: DeviceIdentity,
    pub model_id: ModelId,
    pub telemetry: TelemetrySettings,
    pub overheat: bool,
    pub provisioning: ProvisioningConfig,
    pub hub: HubConfig,
}

fn required(value: Option<&str>, name: &'static str) -> Result<String, ConfigError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .ok_or(ConfigError::Missing(name))
}

impl Config {
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let device_id = required(cli.device.device_id.as_deref(), "device-id")?;
        let symmetric_key = required(cli.device.device_key.as_deref(), "device-key")?;
        let id_scope = required(cli.device.id_scope.as_deref(), "id-scope")?;
        let model_id = required(Some(&cli.device.model_id), "model-id")?;
        let provisioning_endpoint = Uri::from_host_or_uri(cli.device.dps_endpoint.trim())?;

        let telemetry = TelemetrySettings {
            interval: Duration::from_secs(cli.telemetry.interval_secs),
            temperature_low: cli.telemetry.temperature_low,
            temperature_high: cli.telemetry.temperature_high,
            fixed_temperature: cli.telemetry.temperature,
        };
        telemetry.validate()?;

        let mut provisioning = ProvisioningConfig::default();
        if let Some(timeout) = cli.provisioning.request_timeout {
            provisioning.timeout = timeout;
        }
        if let Some(poll_interval) = cli.provisioning.poll_interval {
            provisioning.poll_interval = poll_interval;
        }

        let model_id = ModelId::from(model_id);

        Ok(Self {
            identity: DeviceIdentity {
                device_id: device_id.into(),
                symmetric_key: symmetric_key.into(),
                provisioning_endpoint,
                id_scope,
            },
            model_id,
            telemetry,
            overheat: cli.telemetry.overheat,
            provisioning,
            hub: HubConfig::default(),
        })
    }
}
