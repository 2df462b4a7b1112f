use serde::{Serialize, de::DeserializeOwned};

use crate::error::{Error, Result};

/// Encode a payload to JSON bytes.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(Error::from)
}

/// Decode a JSON payload.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    serde_json::from_slice(data).map_err(Error::from)
}
