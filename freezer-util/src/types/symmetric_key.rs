use std::fmt::{Debug, Display};
use std::ops::Deref;

/// Base64 encoded device key shared with the provisioning service
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SymmetricKey(String);

impl Deref for SymmetricKey {
    type Target = String;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// Keep the key out of logs
impl Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(<redacted>)")
    }
}

impl Display for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<redacted>")
    }
}

impl From<String> for SymmetricKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SymmetricKey {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}
