/*
This crate is home to the simulated device itself: what it measures,
how readings are turned into messages, and the session lifecycle that
connects it to a cloud backend and drives the periodic telemetry.

The backend is abstracted by the traits in the `remote` module, so the
session can be exercised without any network access.
*/

mod identity;
mod remote;
mod sampler;
mod schedule;
mod session;
mod telemetry;

#[cfg(test)]
mod testing;

pub use identity::{AssignedEndpoint, DeviceIdentity};
pub use remote::{BoxError, Connection, Provision, Transport};
pub use sampler::{OVERHEAT_OFFSET, Overheat, Sampler, SettingsError, TelemetrySettings};
pub use schedule::run_telemetry;
pub use session::{Controls, Session, SessionError, SessionState};
pub use telemetry::{
    CONTENT_ENCODING_UTF8, CONTENT_TYPE_JSON, Message, PublishError, TelemetryReading, publish,
};

use freezer_util as util;
