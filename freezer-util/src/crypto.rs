//! Shared access signatures (SAS) used to authenticate against the
//! provisioning service and the IoT hub.
//!
//! A token signs `{url-encoded resource}\n{expiry}` with HMAC-SHA256, using
//! the base64-decoded device key.
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use crate::types::SymmetricKey;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum SasError {
    #[error("symmetric key is not valid base64: {0}")]
    InvalidKey(#[from] base64::DecodeError),

    #[error("symmetric key cannot be used for signing: {0}")]
    InvalidKeyLength(#[from] hmac::digest::InvalidLength),
}

/// Sign `data` with the given key, returning the base64 encoded signature
pub fn sign(key: &SymmetricKey, data: &[u8]) -> Result<String, SasError> {
    let key = BASE64.decode(key.as_bytes())?;
    let mut mac = HmacSha256::new_from_slice(&key)?;
    mac.update(data);
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Return the unix timestamp (seconds) `ttl` from now
pub fn expiry_from_now(ttl: Duration) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (now + ttl).as_secs()
}

/// Build a `SharedAccessSignature` authorization value for `resource`.
///
/// `policy` is the key name (`skn`) and is only needed for group or
/// registration level keys, e.g. the provisioning service expects
/// `registration`.
pub fn sas_token(
    resource: &str,
    key: &SymmetricKey,
    policy: Option<&str>,
    expiry: u64,
) -> Result<String, SasError> {
    let resource = urlencoding::encode(resource);
    let signature = sign(key, format!("{resource}\n{expiry}").as_bytes())?;
    let signature = urlencoding::encode(&signature);

    let mut token = format!("SharedAccessSignature sr={resource}&sig={signature}&se={expiry}");
    if let Some(policy) = policy {
        token.push_str("&skn=");
        token.push_str(policy);
    }
    Ok(token)
}
