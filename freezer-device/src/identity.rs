use crate::util::http::Uri;
use crate::util::types::{DeviceId, IdScope, SymmetricKey};

/// Everything the device needs to know to register itself with the
/// provisioning service. Loaded once at startup and never modified.
#[derive(Clone, Debug)]
pub struct DeviceIdentity {
    pub device_id: DeviceId,
    pub symmetric_key: SymmetricKey,
    pub provisioning_endpoint: Uri,
    pub id_scope: IdScope,
}

/// The result of a successful registration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssignedEndpoint {
    /// Hostname of the hub the device was assigned to
    pub assigned_hub: String,

    /// Device id confirmed by the provisioning service
    pub device_id: DeviceId,
}
