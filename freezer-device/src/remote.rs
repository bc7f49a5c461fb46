use async_trait::async_trait;

use crate::identity::{AssignedEndpoint, DeviceIdentity};
use crate::telemetry::Message;
use crate::util::interrupt::Interrupt;
use crate::util::types::ModelId;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Registers a device with a provisioning service
#[async_trait]
pub trait Provision: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Register the device announcing the given model, returning the endpoint
    /// the device has been assigned to.
    ///
    /// The interrupt is checked between requests, an ongoing request is
    /// never aborted.
    async fn register(
        &self,
        identity: &DeviceIdentity,
        model_id: &ModelId,
        interrupt: &Interrupt,
    ) -> Result<AssignedEndpoint, Self::Error>;
}

/// Opens connections to an assigned endpoint
#[async_trait]
pub trait Transport: Send + Sync {
    type Connection: Connection + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Connect to the assigned endpoint, announcing the device model
    async fn open(
        &self,
        endpoint: &AssignedEndpoint,
        identity: &DeviceIdentity,
        model_id: &ModelId,
    ) -> Result<Self::Connection, Self::Error>;
}

/// An open device to cloud connection
#[async_trait]
pub trait Connection: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Submit a message for delivery
    async fn send(&self, message: Message) -> Result<(), Self::Error>;

    async fn close(&self) -> Result<(), Self::Error>;
}
