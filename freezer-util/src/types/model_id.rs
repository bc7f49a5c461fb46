use std::fmt::Display;
use std::ops::Deref;

/// Digital twin model identifier announced during provisioning and on connect
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelId(String);

impl ModelId {
    pub const THERMOSTAT: &'static str = "dtmi:com:example:Thermostat;1";
}

impl Default for ModelId {
    fn default() -> Self {
        Self(Self::THERMOSTAT.to_owned())
    }
}

impl Deref for ModelId {
    type Target = String;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ModelId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ModelId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}
