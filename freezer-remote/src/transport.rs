use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ClientError, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet,
    QoS, Transport as MqttTransport,
};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, instrument, warn};

use crate::device::{AssignedEndpoint, Connection, DeviceIdentity, Message, Transport};
use crate::util::crypto::{SasError, expiry_from_now, sas_token};
use crate::util::interrupt::Interrupt;
use crate::util::types::ModelId;

use super::config::HubConfig;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to sign connection credentials: {0}")]
    Credentials(#[from] SasError),

    #[error("Connection failed: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Timed out waiting for the hub to accept the connection")]
    ConnectTimeout,

    #[error("Message not queued, the connection is not keeping up: {0}")]
    Client(#[from] ClientError),
}

/// Messages waiting for the event loop. Sends fail once this fills up,
/// e.g. while the hub is unreachable
const REQUEST_QUEUE_SIZE: usize = 10;

/// MQTT transport to an IoT hub
#[derive(Clone, Debug)]
pub struct HubTransport {
    config: HubConfig,
}

impl HubTransport {
    pub fn new(config: HubConfig) -> Self {
        Self { config }
    }

    fn username(&self, endpoint: &AssignedEndpoint, model_id: &ModelId) -> String {
        format!(
            "{}/{}/?api-version={}&model-id={}",
            endpoint.assigned_hub,
            endpoint.device_id,
            self.config.api_version,
            urlencoding::encode(model_id),
        )
    }

    fn options(
        &self,
        endpoint: &AssignedEndpoint,
        identity: &DeviceIdentity,
        model_id: &ModelId,
    ) -> Result<MqttOptions, SasError> {
        let resource = format!("{}/devices/{}", endpoint.assigned_hub, endpoint.device_id);
        let password = sas_token(
            &resource,
            &identity.symmetric_key,
            None,
            expiry_from_now(self.config.token_ttl),
        )?;

        let mut options = MqttOptions::new(
            endpoint.device_id.as_str(),
            endpoint.assigned_hub.as_str(),
            self.config.port,
        );
        options.set_keep_alive(self.config.keep_alive);
        options.set_credentials(self.username(endpoint, model_id), password);
        if self.config.use_tls {
            options.set_transport(MqttTransport::tls_with_default_config());
        }

        Ok(options)
    }
}

#[async_trait]
impl Transport for HubTransport {
    type Connection = HubConnection;
    type Error = TransportError;

    #[instrument(name = "hub_open", skip_all, fields(hub = %endpoint.assigned_hub), err)]
    async fn open(
        &self,
        endpoint: &AssignedEndpoint,
        identity: &DeviceIdentity,
        model_id: &ModelId,
    ) -> Result<Self::Connection, Self::Error> {
        let options = self.options(endpoint, identity, model_id)?;
        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_QUEUE_SIZE);

        // Wait for the hub to accept the connection so authentication
        // errors are reported to the caller
        time::timeout(self.config.connect_timeout, wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| TransportError::ConnectTimeout)??;

        let closing = Interrupt::new();
        let driver = tokio::spawn(drive(
            eventloop,
            closing.clone(),
            self.config.reconnect_delay,
        ));

        Ok(HubConnection {
            client,
            events_topic: format!("devices/{}/messages/events/", endpoint.device_id),
            closing,
            driver: Mutex::new(Some(driver)),
            close_timeout: self.config.close_timeout,
        })
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), TransportError> {
    loop {
        if let Event::Incoming(Packet::ConnAck(ack)) = eventloop.poll().await? {
            info!(code = ?ack.code, "connection status changed: connected");
            return Ok(());
        }
    }
}

/// Poll the MQTT event loop until the connection is closed, logging
/// connection status changes. Reconnection is left to the event loop.
#[instrument(name = "hub", skip_all)]
async fn drive(mut eventloop: EventLoop, closing: Interrupt, reconnect_delay: Duration) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                info!(code = ?ack.code, "connection status changed: connected");
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                info!("connection status changed: disabled, reason=client close");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                if closing.is_triggered() {
                    break;
                }
                warn!("connection status changed: disconnected, reason={e}");
                tokio::select! {
                    _ = time::sleep(reconnect_delay) => {}
                    _ = closing.wait() => break,
                }
            }
        }
    }
    debug!("event loop stopped");
}

/// An open hub connection
pub struct HubConnection {
    client: AsyncClient,
    events_topic: String,
    closing: Interrupt,
    driver: Mutex<Option<JoinHandle<()>>>,
    close_timeout: Duration,
}

impl HubConnection {
    /// Message properties are passed to the hub as a url-encoded
    /// property bag at the end of the topic
    fn topic(&self, message: &Message) -> String {
        format!(
            "{}$.ct={}&$.ce={}",
            self.events_topic,
            urlencoding::encode(message.content_type),
            urlencoding::encode(message.content_encoding),
        )
    }
}

#[async_trait]
impl Connection for HubConnection {
    type Error = TransportError;

    /// Queue the message for delivery without waiting for room in the
    /// request queue, so a stalled connection never blocks the caller
    async fn send(&self, message: Message) -> Result<(), Self::Error> {
        let topic = self.topic(&message);
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, message.body)?;
        Ok(())
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.closing.trigger();

        // with a full queue the driver is stopped by the closing interrupt
        // and the socket is dropped with it
        if let Err(e) = self.client.try_disconnect() {
            debug!("disconnect not queued: {e}");
        }

        let driver = self
            .driver
            .lock()
            .ok()
            .and_then(|mut driver| driver.take());
        if let Some(mut driver) = driver
            && time::timeout(self.close_timeout, &mut driver).await.is_err()
        {
            warn!("connection did not shut down in time");
            driver.abort();
        }

        Ok(())
    }
}

impl Drop for HubConnection {
    fn drop(&mut self) {
        if let Ok(Some(driver)) = self.driver.get_mut().map(Option::take) {
            driver.abort();
        }
    }
}
