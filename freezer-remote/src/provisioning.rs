use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time;
use tracing::{Span, debug, field, instrument};

use crate::device::{AssignedEndpoint, DeviceIdentity, Provision};
use crate::util::crypto::{SasError, expiry_from_now, sas_token};
use crate::util::http::{InvalidUriError, Uri};
use crate::util::interrupt::Interrupt;
use crate::util::types::ModelId;

use super::config::ProvisioningConfig;

#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("Invalid provisioning endpoint URI: {0}")]
    InvalidEndpoint(#[from] InvalidUriError),

    #[error("Failed to sign registration request: {0}")]
    Credentials(#[from] SasError),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Provisioning service returned error: ({0}) {1}")]
    Status(StatusCode, String),

    #[error("Registration {status}: {message}")]
    Failed { status: String, message: String },

    #[error("Registration still pending after {0} status checks")]
    Timeout(u32),

    #[error("Registration response is missing the {0}")]
    Incomplete(&'static str),

    #[error("Provisioning cancelled")]
    Cancelled,
}

/*
    request {
        registrationId
        payload?
    }
*/
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest<'a> {
    registration_id: &'a str,
    payload: RegistrationPayload<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationPayload<'a> {
    model_id: &'a str,
}

/*
    response {
        operationId
        status
        registrationState? {
            assignedHub?
            deviceId?
            errorMessage?
        }
    }
*/
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationOperation {
    operation_id: String,
    status: RegistrationStatus,
    registration_state: Option<RegistrationState>,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum RegistrationStatus {
    Unassigned,
    Assigning,
    Assigned,
    Failed,
    Disabled,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationState {
    assigned_hub: Option<String>,
    device_id: Option<String>,
    error_message: Option<String>,
}

/// Client for the device provisioning service REST API, authenticating
/// with the device symmetric key.
#[derive(Clone, Debug)]
pub struct DpsClient {
    client: Client,
    config: ProvisioningConfig,
}

impl DpsClient {
    pub fn new(config: ProvisioningConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn endpoint(&self, identity: &DeviceIdentity, path: &str) -> Result<Uri, InvalidUriError> {
        let path = format!(
            "/{}/registrations/{}/{path}",
            urlencoding::encode(&identity.id_scope),
            urlencoding::encode(&identity.device_id),
        );
        let query = format!("api-version={}", self.config.api_version);
        Uri::from_parts(identity.provisioning_endpoint.clone(), &path, Some(&query))
    }

    #[instrument(skip_all, fields(registration_id = %identity.device_id, result = field::Empty), err)]
    async fn register_device(
        &self,
        identity: &DeviceIdentity,
        model_id: &ModelId,
        interrupt: &Interrupt,
    ) -> Result<AssignedEndpoint, ProvisioningError> {
        if interrupt.is_triggered() {
            return Err(ProvisioningError::Cancelled);
        }

        let resource = format!("{}/registrations/{}", identity.id_scope, identity.device_id);
        let authorization = sas_token(
            &resource,
            &identity.symmetric_key,
            Some("registration"),
            expiry_from_now(self.config.token_ttl),
        )?;

        let request = RegisterRequest {
            registration_id: identity.device_id.as_str(),
            payload: RegistrationPayload {
                model_id: model_id.as_str(),
            },
        };

        debug!("calling provisioning service");
        let response = self
            .client
            .put(self.endpoint(identity, "register")?.to_string())
            .header(AUTHORIZATION, &authorization)
            .timeout(self.config.timeout)
            .json(&request)
            .send()
            .await?;
        let (mut operation, mut retry_after) = read_operation(response).await?;

        let mut polls = 0;
        loop {
            match operation.status {
                RegistrationStatus::Assigned => {
                    Span::current().record("result", "assigned");
                    return assigned_endpoint(operation);
                }
                RegistrationStatus::Failed | RegistrationStatus::Disabled => {
                    Span::current().record("result", field::debug(&operation.status));
                    return Err(failure(operation));
                }
                RegistrationStatus::Unassigned | RegistrationStatus::Assigning => {}
            }

            if polls >= self.config.max_polls {
                return Err(ProvisioningError::Timeout(polls));
            }
            polls += 1;

            let wait = retry_after.unwrap_or(self.config.poll_interval);
            debug!(operation_id = %operation.operation_id, "registration pending, checking again in {wait:?}");
            tokio::select! {
                _ = time::sleep(wait) => {}
                _ = interrupt.wait() => return Err(ProvisioningError::Cancelled),
            }

            let path = format!("operations/{}", urlencoding::encode(&operation.operation_id));
            let response = self
                .client
                .get(self.endpoint(identity, &path)?.to_string())
                .header(AUTHORIZATION, &authorization)
                .timeout(self.config.timeout)
                .send()
                .await?;
            (operation, retry_after) = read_operation(response).await?;
        }
    }
}

#[async_trait]
impl Provision for DpsClient {
    type Error = ProvisioningError;

    async fn register(
        &self,
        identity: &DeviceIdentity,
        model_id: &ModelId,
        interrupt: &Interrupt,
    ) -> Result<AssignedEndpoint, Self::Error> {
        self.register_device(identity, model_id, interrupt).await
    }
}

async fn read_operation(
    response: Response,
) -> Result<(RegistrationOperation, Option<Duration>), ProvisioningError> {
    let status = response.status();
    if !status.is_success() {
        let msg = response.text().await.unwrap_or_default();
        return Err(ProvisioningError::Status(status, msg));
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs);

    let operation = response.json().await?;
    Ok((operation, retry_after))
}

fn assigned_endpoint(operation: RegistrationOperation) -> Result<AssignedEndpoint, ProvisioningError> {
    let state = operation
        .registration_state
        .ok_or(ProvisioningError::Incomplete("registration state"))?;
    let assigned_hub = state
        .assigned_hub
        .ok_or(ProvisioningError::Incomplete("assigned hub"))?;
    let device_id = state
        .device_id
        .ok_or(ProvisioningError::Incomplete("device id"))?;

    Ok(AssignedEndpoint {
        assigned_hub,
        device_id: device_id.into(),
    })
}

fn failure(operation: RegistrationOperation) -> ProvisioningError {
    let status = format!("{:?}", operation.status).to_lowercase();
    let message = operation
        .registration_state
        .and_then(|state| state.error_message)
        .unwrap_or_else(|| "no reason given".to_owned());
    ProvisioningError::Failed { status, message }
}
