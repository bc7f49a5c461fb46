use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use thiserror::Error;
use tracing::debug;

use crate::remote::{BoxError, Connection};

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_ENCODING_UTF8: &str = "utf-8";

/// A single temperature measurement.
///
/// The offset is a synthetic fault added on top of the sampled value, and
/// is already included in the serialized temperature.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TelemetryReading {
    pub temperature: f64,
    pub offset: Option<f64>,
}

impl TelemetryReading {
    pub fn new(temperature: f64) -> Self {
        Self {
            temperature,
            offset: None,
        }
    }

    pub fn with_offset(self, offset: f64) -> Self {
        Self {
            offset: Some(offset),
            ..self
        }
    }

    /// The value that is reported to the cloud
    pub fn value(&self) -> f64 {
        self.temperature + self.offset.unwrap_or_default()
    }

    pub fn to_message(&self) -> Result<Message, serde_json::Error> {
        let body = serde_json::to_vec(self)?;
        Ok(Message {
            body,
            content_type: CONTENT_TYPE_JSON,
            content_encoding: CONTENT_ENCODING_UTF8,
        })
    }
}

/*
    message {
        temperature: number
    }
*/
impl Serialize for TelemetryReading {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("TelemetryReading", 1)?;
        state.serialize_field("temperature", &Temperature(self.value()))?;
        state.end()
    }
}

// Largest integer an f64 can represent exactly
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Serializes whole numbers without a fractional part, so `10.0`
/// is reported as `10`
struct Temperature(f64);

impl Serialize for Temperature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let value = self.0;
        if value.fract() == 0.0 && value.abs() <= MAX_EXACT_INTEGER {
            serializer.serialize_i64(value as i64)
        } else {
            serializer.serialize_f64(value)
        }
    }
}

/// A telemetry payload ready to be handed to a transport
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub body: Vec<u8>,
    pub content_type: &'static str,
    pub content_encoding: &'static str,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to encode telemetry: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to send telemetry: {0}")]
    Send(#[source] BoxError),
}

/// Serialize the reading and submit it for delivery. Delivery is
/// best-effort, there is no retry.
pub async fn publish<C>(connection: &C, reading: &TelemetryReading) -> Result<(), PublishError>
where
    C: Connection + ?Sized,
{
    let message = reading.to_message()?;
    connection
        .send(message)
        .await
        .map_err(|e| PublishError::Send(e.into()))?;
    debug!(temperature = reading.value(), "telemetry sent");
    Ok(())
}
