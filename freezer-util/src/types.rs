mod device_id;
mod model_id;
mod symmetric_key;

pub use device_id::DeviceId;
pub use model_id::ModelId;
pub use symmetric_key::SymmetricKey;

// Just an alias for more descriptive code
pub type IdScope = String;
