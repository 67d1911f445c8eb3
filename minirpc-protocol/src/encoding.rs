//! Registry of supported body encodings.
//!
//! The encoding is chosen once per connection during negotiation and then
//! applies to every header and body carried inside a frame.

use crate::error::ProtocolError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Wire encoding negotiated for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CodecType {
    /// Compact structured binary encoding (postcard).
    #[default]
    #[serde(rename = "application/postcard")]
    Postcard,
    /// Self-describing text encoding (JSON).
    #[serde(rename = "application/json")]
    Json,
}

impl CodecType {
    /// All encodings this implementation can negotiate.
    pub const ALL: [CodecType; 2] = [CodecType::Postcard, CodecType::Json];

    /// Returns the identifier exchanged in the negotiation document.
    pub fn as_str(&self) -> &'static str {
        match self {
            CodecType::Postcard => "application/postcard",
            CodecType::Json => "application/json",
        }
    }

    /// Encodes a value with this codec.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        match self {
            CodecType::Postcard => Ok(postcard::to_allocvec(value)?),
            CodecType::Json => Ok(serde_json::to_vec(value)?),
        }
    }

    /// Decodes a value previously produced by [`CodecType::encode`].
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, ProtocolError> {
        match self {
            CodecType::Postcard => Ok(postcard::from_bytes(bytes)?),
            CodecType::Json => Ok(serde_json::from_slice(bytes)?),
        }
    }
}

impl FromStr for CodecType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CodecType::ALL
            .into_iter()
            .find(|codec| codec.as_str() == s)
            .ok_or_else(|| ProtocolError::UnsupportedCodec(s.to_string()))
    }
}

impl fmt::Display for CodecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
