/*
This module is home to everything related to the cloud backend the
simulated device talks to.

It provides the device provisioning client, which registers the device
and finds out which hub it was assigned to, and the hub transport used
to publish telemetry once assigned.
*/

mod config;
mod provisioning;
mod transport;

pub use config::{HubConfig, ProvisioningConfig};
pub use provisioning::{DpsClient, ProvisioningError};
pub use transport::{HubConnection, HubTransport, TransportError};

use freezer_device as device;
use freezer_util as util;
