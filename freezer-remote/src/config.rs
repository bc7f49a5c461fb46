use std::time::Duration;

/// Provisioning service configuration
#[derive(Clone, Debug)]
pub struct ProvisioningConfig {
    pub api_version: String,

    /// Timeout of a single request to the service
    pub timeout: Duration,

    /// Time between registration status checks, unless the service
    /// tells us otherwise
    pub poll_interval: Duration,

    /// Give up if the registration is still pending after this many checks
    pub max_polls: u32,

    /// Lifetime of the registration SAS token
    pub token_ttl: Duration,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            api_version: "2021-06-01".to_owned(),
            timeout: Duration::from_millis(30_000),
            poll_interval: Duration::from_millis(2_000),
            max_polls: 30,
            token_ttl: Duration::from_secs(3_600),
        }
    }
}

/// Hub connection configuration
#[derive(Clone, Debug)]
pub struct HubConfig {
    pub api_version: String,
    pub port: u16,
    pub use_tls: bool,
    pub keep_alive: Duration,

    /// How long to wait for the hub to accept the connection
    pub connect_timeout: Duration,

    /// How long to wait for the connection to shut down on close
    pub close_timeout: Duration,

    /// Delay before the transport tries to reconnect after losing the connection
    pub reconnect_delay: Duration,

    /// Lifetime of the connection SAS token
    pub token_ttl: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            api_version: "2021-04-12".to_owned(),
            port: 8883,
            use_tls: true,
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
            close_timeout: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(1),
            token_ttl: Duration::from_secs(3_600),
        }
    }
}
