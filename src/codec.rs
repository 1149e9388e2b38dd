//! Value codec for typed reads and writes.
//!
//! The store itself only ever holds opaque bytes. Callers that want to store
//! structured values go through `put_value`/`get_value`, which encode and
//! decode with the codec selected in the configuration.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;

use crate::CodecError;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValueCodec {
    /// Human readable, interoperable with other backends
    #[default]
    Json,
    /// Compact binary encoding
    Bincode,
}

impl ValueCodec {
    pub fn encode<T: Serialize + ?Sized>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, CodecError> {
        let bytes = match self {
            ValueCodec::Json => serde_json::to_vec(value)?,
            ValueCodec::Bincode => bincode::serialize(value)?,
        };
        Ok(bytes)
    }

    /// `key` is only used to give the error some context.
    pub fn decode<T: DeserializeOwned>(
        &self,
        key: &str,
        bytes: &[u8],
    ) -> Result<T, CodecError> {
        let decoded = match self {
            ValueCodec::Json => serde_json::from_slice(bytes).map_err(|e| e.to_string()),
            ValueCodec::Bincode => bincode::deserialize(bytes).map_err(|e| e.to_string()),
        };

        decoded.map_err(|reason| CodecError::Decode {
            key: key.to_string(),
            reason,
        })
    }
}
