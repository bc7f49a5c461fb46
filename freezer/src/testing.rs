//! Collaborators for exercising the shells without a network
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use thiserror::Error;

use crate::device::{
    AssignedEndpoint, Connection, DeviceIdentity, Message, Provision, Session, Transport,
};
use crate::util::http::Uri;
use crate::util::interrupt::Interrupt;
use crate::util::types::ModelId;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct FakeError(pub &'static str);

#[derive(Clone, Default)]
pub struct Counters {
    registrations: Arc<AtomicUsize>,
    sends: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl Counters {
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

pub struct FakeProvisioner {
    counters: Counters,
    fail: Arc<AtomicBool>,
}

#[async_trait]
impl Provision for FakeProvisioner {
    type Error = FakeError;

    async fn register(
        &self,
        identity: &DeviceIdentity,
        _: &ModelId,
        interrupt: &Interrupt,
    ) -> Result<AssignedEndpoint, Self::Error> {
        if interrupt.is_triggered() {
            return Err(FakeError("cancelled"));
        }
        self.counters.registrations.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(FakeError("registration refused"));
        }
        Ok(AssignedEndpoint {
            assigned_hub: "hub.example.com".to_owned(),
            device_id: identity.device_id.clone(),
        })
    }
}

pub struct FakeTransport {
    counters: Counters,
}

#[async_trait]
impl Transport for FakeTransport {
    type Connection = FakeConnection;
    type Error = FakeError;

    async fn open(
        &self,
        _: &AssignedEndpoint,
        _: &DeviceIdentity,
        _: &ModelId,
    ) -> Result<Self::Connection, Self::Error> {
        Ok(FakeConnection {
            counters: self.counters.clone(),
        })
    }
}

pub struct FakeConnection {
    counters: Counters,
}

#[async_trait]
impl Connection for FakeConnection {
    type Error = FakeError;

    async fn send(&self, _: Message) -> Result<(), Self::Error> {
        self.counters.sends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub type FakeSession = Session<FakeProvisioner, FakeTransport>;

/// Create a session over fakes. Provisioning fails while the returned
/// flag is set.
pub fn session() -> (FakeSession, Counters, Arc<AtomicBool>) {
    let counters = Counters::default();
    let fail = Arc::new(AtomicBool::new(false));
    let identity = DeviceIdentity {
        device_id: "freezer-01".into(),
        symmetric_key: "c2VjcmV0".into(),
        provisioning_endpoint: Uri::from_static("https://dps.example.com"),
        id_scope: "0ne00000000".to_owned(),
    };
    let session = Session::new(
        identity,
        ModelId::default(),
        FakeProvisioner {
            counters: counters.clone(),
            fail: Arc::clone(&fail),
        },
        FakeTransport {
            counters: counters.clone(),
        },
    );
    (session, counters, fail)
}
