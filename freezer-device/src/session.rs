use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::identity::{AssignedEndpoint, DeviceIdentity};
use crate::remote::{BoxError, Connection, Provision, Transport};
use crate::sampler::{Overheat, Sampler, SettingsError, TelemetrySettings};
use crate::schedule::run_telemetry;
use crate::util::interrupt::Interrupt;
use crate::util::types::ModelId;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("device is already connected")]
    AlreadyConnected,

    #[error("device is not connected")]
    NotConnected,

    #[error("telemetry settings cannot be changed while connected")]
    SettingsLocked,

    #[error("invalid telemetry settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("connect cancelled")]
    Cancelled,

    #[error("provisioning failed: {0}")]
    Provisioning(#[source] BoxError),

    #[error("failed to open device connection: {0}")]
    Open(#[source] BoxError),

    #[error("failed to close device connection: {0}")]
    Close(#[source] BoxError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
}

/// Which user actions are available in a given state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Controls {
    pub connect: bool,
    pub disconnect: bool,
    pub edit_settings: bool,
    pub toggle_overheat: bool,
}

impl SessionState {
    pub fn controls(self) -> Controls {
        let connected = self == SessionState::Connected;
        Controls {
            connect: !connected,
            disconnect: connected,
            edit_settings: !connected,
            toggle_overheat: true,
        }
    }
}

struct ActiveSession<C> {
    endpoint: AssignedEndpoint,
    connection: Arc<C>,
    stop: Interrupt,
    telemetry: JoinHandle<u64>,
}

/// The device session.
///
/// Owns the lifecycle `Disconnected -> Connected -> Disconnected`. Every
/// connect cycle provisions the device again; the assigned endpoint is
/// dropped on disconnect.
pub struct Session<P, T>
where
    P: Provision,
    T: Transport,
{
    identity: DeviceIdentity,
    model_id: ModelId,
    provisioner: P,
    transport: T,
    settings: TelemetrySettings,
    overheat: Overheat,
    active: Option<ActiveSession<T::Connection>>,
}

impl<P, T> Session<P, T>
where
    P: Provision,
    T: Transport,
{
    pub fn new(identity: DeviceIdentity, model_id: ModelId, provisioner: P, transport: T) -> Self {
        Self {
            identity,
            model_id,
            provisioner,
            transport,
            settings: TelemetrySettings::default(),
            overheat: Overheat::default(),
            active: None,
        }
    }

    pub fn with_settings(mut self, settings: TelemetrySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_overheat(self, enabled: bool) -> Self {
        self.overheat.set(enabled);
        self
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn state(&self) -> SessionState {
        if self.active.is_some() {
            SessionState::Connected
        } else {
            SessionState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// The endpoint assigned during the current connect cycle
    pub fn endpoint(&self) -> Option<&AssignedEndpoint> {
        self.active.as_ref().map(|active| &active.endpoint)
    }

    pub fn settings(&self) -> &TelemetrySettings {
        &self.settings
    }

    /// Modify the telemetry settings. Only allowed while disconnected,
    /// the settings are validated on the next connect.
    pub fn update_settings<F>(&mut self, update: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut TelemetrySettings),
    {
        if self.is_connected() {
            return Err(SessionError::SettingsLocked);
        }
        update(&mut self.settings);
        Ok(())
    }

    pub fn overheat(&self) -> bool {
        self.overheat.is_enabled()
    }

    /// Toggle the simulated overheat fault, also while connected
    pub fn set_overheat(&self, enabled: bool) {
        self.overheat.set(enabled);
    }

    /// Provision the device, open a connection to the assigned endpoint and
    /// start publishing telemetry.
    ///
    /// On failure the session stays disconnected. The interrupt allows
    /// the caller to cancel an ongoing provisioning.
    #[instrument(skip_all, fields(device_id = %self.identity.device_id), err)]
    pub async fn connect(&mut self, interrupt: &Interrupt) -> Result<(), SessionError> {
        if self.active.is_some() {
            return Err(SessionError::AlreadyConnected);
        }
        self.settings.validate()?;

        debug!("provisioning device");
        let endpoint = self
            .provisioner
            .register(&self.identity, &self.model_id, interrupt)
            .await
            .map_err(|e| SessionError::Provisioning(e.into()))?;
        info!(
            hub = %endpoint.assigned_hub,
            device_id = %endpoint.device_id,
            "device assigned"
        );
        if interrupt.is_triggered() {
            return Err(SessionError::Cancelled);
        }

        let connection = self
            .transport
            .open(&endpoint, &self.identity, &self.model_id)
            .await
            .map_err(|e| SessionError::Open(e.into()))?;
        let connection = Arc::new(connection);

        let stop = Interrupt::new();
        let sampler = Sampler::new(&self.settings, self.overheat.clone());
        let telemetry = tokio::spawn(run_telemetry(
            Arc::clone(&connection),
            sampler,
            self.settings.interval,
            stop.clone(),
        ));

        self.active = Some(ActiveSession {
            endpoint,
            connection,
            stop,
            telemetry,
        });
        info!("device connected");

        Ok(())
    }

    /// Stop the telemetry and close the connection.
    ///
    /// The session is disconnected when this returns, even if closing the
    /// connection failed.
    #[instrument(skip_all, fields(device_id = %self.identity.device_id), err)]
    pub async fn disconnect(&mut self) -> Result<(), SessionError> {
        let active = self.active.take().ok_or(SessionError::NotConnected)?;

        // Stop the schedule before tearing down the connection so
        // no reading can be sent on a closed connection
        active.stop.trigger();
        match active.telemetry.await {
            Ok(published) => debug!(published, "telemetry stopped"),
            Err(e) => warn!("telemetry task failed: {e}"),
        }

        active
            .connection
            .close()
            .await
            .map_err(|e| SessionError::Close(e.into()))?;
        info!("device disconnected");

        Ok(())
    }
}

impl<P, T> Drop for Session<P, T>
where
    P: Provision,
    T: Transport,
{
    fn drop(&mut self) {
        if let Some(active) = &self.active {
            active.stop.trigger();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Event, FakeProvisioner, FakeTransport, Recorder, identity};
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::time;

    fn session(
        provisioner: FakeProvisioner,
        transport: FakeTransport,
    ) -> Session<FakeProvisioner, FakeTransport> {
        Session::new(identity(), ModelId::default(), provisioner, transport).with_settings(
            TelemetrySettings {
                fixed_temperature: Some(-18.0),
                ..Default::default()
            },
        )
    }

    fn fakes() -> (Recorder, FakeProvisioner, FakeTransport) {
        let recorder = Recorder::default();
        let provisioner = FakeProvisioner {
            recorder: recorder.clone(),
            ..Default::default()
        };
        let transport = FakeTransport {
            recorder: recorder.clone(),
            ..Default::default()
        };
        (recorder, provisioner, transport)
    }

    #[tokio::test]
    async fn test_connect_then_disconnect() {
        let (recorder, provisioner, transport) = fakes();
        let mut session = session(provisioner, transport);
        assert_eq!(session.state(), SessionState::Disconnected);

        session.connect(&Interrupt::new()).await.unwrap();
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(
            session.endpoint(),
            Some(&AssignedEndpoint {
                assigned_hub: "hub.example.net".to_owned(),
                device_id: "freezer-01".into(),
            })
        );

        session.disconnect().await.unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.endpoint(), None);

        assert_eq!(recorder.registrations(), 1);
        assert_eq!(recorder.opens(), 1);
        assert_eq!(recorder.closes(), 1);
    }

    #[tokio::test]
    async fn test_each_cycle_provisions_again() {
        let (recorder, provisioner, transport) = fakes();
        let mut session = session(provisioner, transport);

        for _ in 0..3 {
            session.connect(&Interrupt::new()).await.unwrap();
            session.disconnect().await.unwrap();
        }

        assert_eq!(recorder.registrations(), 3);
        assert_eq!(recorder.opens(), 3);
        assert_eq!(recorder.closes(), 3);
    }

    #[tokio::test]
    async fn test_connect_is_rejected_while_connected() {
        let (recorder, provisioner, transport) = fakes();
        let mut session = session(provisioner, transport);

        session.connect(&Interrupt::new()).await.unwrap();
        let res = session.connect(&Interrupt::new()).await;

        assert!(matches!(res, Err(SessionError::AlreadyConnected)));
        assert!(session.is_connected());
        assert_eq!(recorder.registrations(), 1);
        assert_eq!(recorder.opens(), 1);

        session.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_is_rejected_while_disconnected() {
        let (recorder, provisioner, transport) = fakes();
        let mut session = session(provisioner, transport);

        let res = session.disconnect().await;

        assert!(matches!(res, Err(SessionError::NotConnected)));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(recorder.closes(), 0);
    }

    #[tokio::test]
    async fn test_provisioning_failure_leaves_session_disconnected() {
        let (recorder, mut provisioner, transport) = fakes();
        provisioner.fail = true;
        let mut session = session(provisioner, transport);

        let res = session.connect(&Interrupt::new()).await;

        assert!(matches!(res, Err(SessionError::Provisioning(_))));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(recorder.opens(), 0);
    }

    #[tokio::test]
    async fn test_open_failure_leaves_session_disconnected() {
        let (recorder, provisioner, mut transport) = fakes();
        transport.fail_open = true;
        let mut session = session(provisioner, transport);

        let res = session.connect(&Interrupt::new()).await;

        assert!(matches!(res, Err(SessionError::Open(_))));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(recorder.registrations(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_provisioning_leaves_session_disconnected() {
        let (_, provisioner, transport) = fakes();
        let mut session = session(provisioner, transport);
        let interrupt = Interrupt::new();
        interrupt.trigger();

        let res = session.connect(&interrupt).await;

        assert!(matches!(res, Err(SessionError::Provisioning(_))));
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_cancel_after_provisioning_skips_open() {
        let (recorder, mut provisioner, transport) = fakes();
        provisioner.cancel_after_register = true;
        let mut session = session(provisioner, transport);

        let res = session.connect(&Interrupt::new()).await;

        assert!(matches!(res, Err(SessionError::Cancelled)));
        assert!(!session.is_connected());
        assert_eq!(recorder.registrations(), 1);
        assert_eq!(recorder.opens(), 0);
    }

    #[tokio::test]
    async fn test_open_announces_the_session_model() {
        let (recorder, provisioner, transport) = fakes();
        let mut session = Session::new(
            identity(),
            ModelId::from("dtmi:com:example:Freezer;2"),
            provisioner,
            transport,
        );

        session.connect(&Interrupt::new()).await.unwrap();
        session.disconnect().await.unwrap();

        assert_eq!(
            recorder.models(),
            vec![ModelId::from("dtmi:com:example:Freezer;2")]
        );
    }

    #[tokio::test]
    async fn test_invalid_settings_are_rejected_before_provisioning() {
        let (recorder, provisioner, transport) = fakes();
        let mut session = session(provisioner, transport);
        session
            .update_settings(|settings| {
                settings.fixed_temperature = None;
                settings.temperature_low = 0.0;
                settings.temperature_high = -10.0;
            })
            .unwrap();

        let res = session.connect(&Interrupt::new()).await;

        assert!(matches!(
            res,
            Err(SessionError::Settings(SettingsError::InvalidRange { .. }))
        ));
        assert_eq!(recorder.registrations(), 0);
    }

    #[tokio::test]
    async fn test_close_failure_still_disconnects() {
        let (recorder, provisioner, mut transport) = fakes();
        transport.fail_close = true;
        let mut session = session(provisioner, transport);

        session.connect(&Interrupt::new()).await.unwrap();
        let res = session.disconnect().await;

        assert!(matches!(res, Err(SessionError::Close(_))));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(recorder.closes(), 1);

        // the session is usable again
        session.connect(&Interrupt::new()).await.unwrap();
        assert!(session.is_connected());
        assert_eq!(recorder.registrations(), 2);
    }

    #[tokio::test]
    async fn test_settings_are_locked_while_connected() {
        let (_, provisioner, transport) = fakes();
        let mut session = session(provisioner, transport);

        session.connect(&Interrupt::new()).await.unwrap();
        let res = session.update_settings(|settings| settings.interval = Duration::from_secs(1));
        assert!(matches!(res, Err(SessionError::SettingsLocked)));
        assert_eq!(session.settings().interval, Duration::from_secs(5));

        // overheat is not a locked setting
        session.set_overheat(true);
        assert!(session.overheat());

        session.disconnect().await.unwrap();
        session
            .update_settings(|settings| settings.interval = Duration::from_secs(1))
            .unwrap();
        assert_eq!(session.settings().interval, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_while_connected() {
        let (recorder, provisioner, transport) = fakes();
        let mut session = session(provisioner, transport);

        session.connect(&Interrupt::new()).await.unwrap();
        time::sleep(Duration::from_secs(17)).await;
        session.disconnect().await.unwrap();

        assert_eq!(recorder.sends(), 3);
        assert_eq!(recorder.events().last(), Some(&Event::Close));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_publish_after_disconnect_with_send_in_flight() {
        let (recorder, provisioner, mut transport) = fakes();
        // the send started at t=5 completes at t=8
        transport.send_delay = Some(Duration::from_secs(3));
        let mut session = session(provisioner, transport);

        session.connect(&Interrupt::new()).await.unwrap();
        time::sleep(Duration::from_secs(6)).await;
        session.disconnect().await.unwrap();

        assert_eq!(recorder.events(), vec![Event::Send, Event::Close]);

        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(recorder.events(), vec![Event::Send, Event::Close]);
    }

    #[test]
    fn test_controls_follow_state() {
        assert_eq!(
            SessionState::Disconnected.controls(),
            Controls {
                connect: true,
                disconnect: false,
                edit_settings: true,
                toggle_overheat: true,
            }
        );
        assert_eq!(
            SessionState::Connected.controls(),
            Controls {
                connect: false,
                disconnect: true,
                edit_settings: false,
                toggle_overheat: true,
            }
        );
    }
}
