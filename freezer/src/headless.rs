use tracing::{info, instrument};

use crate::device::{Provision, Session, SessionError, Transport};
use crate::util::interrupt::Interrupt;

/// Connect and publish telemetry until the shutdown interrupt is triggered.
///
/// Cancelling while the device is still provisioning is not an error.
#[instrument(name = "headless", skip_all, err)]
pub async fn run<P, T>(mut session: Session<P, T>, shutdown: Interrupt) -> Result<(), SessionError>
where
    P: Provision,
    T: Transport,
{
    println!("Press Control+C to quit the freezer.");

    if let Err(e) = session.connect(&shutdown).await {
        if shutdown.is_triggered() {
            info!("cancelled before the device was connected");
            return Ok(());
        }
        return Err(e);
    }

    shutdown.wait().await;
    info!("shutdown requested, disconnecting");
    session.disconnect().await
}
