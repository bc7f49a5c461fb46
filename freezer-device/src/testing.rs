//! In-memory collaborators used by the session and schedule tests
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::identity::{AssignedEndpoint, DeviceIdentity};
use crate::remote::{Connection, Provision, Transport};
use crate::telemetry::Message;
use crate::util::http::Uri;
use crate::util::interrupt::Interrupt;
use crate::util::types::ModelId;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct FakeError(pub &'static str);

pub fn identity() -> DeviceIdentity {
    DeviceIdentity {
        device_id: "freezer-01".into(),
        symmetric_key: "c2VjcmV0".into(),
        provisioning_endpoint: Uri::from_static("https://dps.example.com"),
        id_scope: "0ne00000000".to_owned(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Send,
    Close,
}

#[derive(Default)]
pub struct FakeConnection {
    sent: Mutex<Vec<Message>>,
    events: Arc<Mutex<Vec<Event>>>,
    attempts: AtomicUsize,
    fail_sends: bool,
    fail_close: bool,
    send_delay: Option<Duration>,
}

impl FakeConnection {
    pub fn failing_sends() -> Self {
        Self {
            fail_sends: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for FakeConnection {
    type Error = FakeError;

    async fn send(&self, message: Message) -> Result<(), Self::Error> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.send_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_sends {
            return Err(FakeError("send failed"));
        }
        self.events.lock().unwrap().push(Event::Send);
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.events.lock().unwrap().push(Event::Close);
        if self.fail_close {
            return Err(FakeError("close failed"));
        }
        Ok(())
    }
}

/// Counts calls and records every connection event across connect cycles
#[derive(Clone, Default)]
pub struct Recorder {
    pub registrations: Arc<AtomicUsize>,
    pub opens: Arc<AtomicUsize>,
    pub events: Arc<Mutex<Vec<Event>>>,
    pub models: Arc<Mutex<Vec<ModelId>>>,
}

impl Recorder {
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Models announced on every open
    pub fn models(&self) -> Vec<ModelId> {
        self.models.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Close))
            .count()
    }

    pub fn sends(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Send))
            .count()
    }
}

#[derive(Default)]
pub struct FakeProvisioner {
    pub recorder: Recorder,
    pub fail: bool,
    /// Trigger the caller's interrupt once the registration succeeded
    pub cancel_after_register: bool,
}

#[async_trait]
impl Provision for FakeProvisioner {
    type Error = FakeError;

    async fn register(
        &self,
        identity: &DeviceIdentity,
        _model_id: &ModelId,
        interrupt: &Interrupt,
    ) -> Result<AssignedEndpoint, Self::Error> {
        self.recorder.registrations.fetch_add(1, Ordering::SeqCst);
        if interrupt.is_triggered() {
            return Err(FakeError("cancelled"));
        }
        if self.fail {
            return Err(FakeError("registration failed"));
        }
        if self.cancel_after_register {
            interrupt.trigger();
        }
        Ok(AssignedEndpoint {
            assigned_hub: "hub.example.net".to_owned(),
            device_id: identity.device_id.clone(),
        })
    }
}

#[derive(Default)]
pub struct FakeTransport {
    pub recorder: Recorder,
    pub fail_open: bool,
    pub fail_close: bool,
    pub send_delay: Option<Duration>,
}

#[async_trait]
impl Transport for FakeTransport {
    type Connection = FakeConnection;
    type Error = FakeError;

    async fn open(
        &self,
        _endpoint: &AssignedEndpoint,
        _identity: &DeviceIdentity,
        model_id: &ModelId,
    ) -> Result<Self::Connection, Self::Error> {
        self.recorder.opens.fetch_add(1, Ordering::SeqCst);
        self.recorder.models.lock().unwrap().push(model_id.clone());
        if self.fail_open {
            return Err(FakeError("open failed"));
        }
        Ok(FakeConnection {
            events: Arc::clone(&self.recorder.events),
            fail_close: self.fail_close,
            send_delay: self.send_delay,
            ..Default::default()
        })
    }
}
