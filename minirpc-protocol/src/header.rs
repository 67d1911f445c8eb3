//! The header that precedes every request and response body.

use serde::{Deserialize, Serialize};

/// Per-message header.
///
/// A request carries the target `"Service.Method"` and the sequence number
/// chosen by the client. The response echoes both back; a non-empty `error`
/// means the server failed and the body carries no meaningful reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Target in `"Service.Method"` form.
    #[serde(rename = "ServiceMethod")]
    pub service_method: String,

    /// Sequence number correlating a response to its request.
    #[serde(rename = "Seq")]
    pub seq: u64,

    /// Server-side failure description, empty on success.
    #[serde(rename = "Error", default)]
    pub error: String,
}

impl Header {
    pub fn new(service_method: impl Into<String>, seq: u64) -> Self {
        Self {
            service_method: service_method.into(),
            seq,
            error: String::new(),
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = error.into();
        self
    }

    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CodecType;

    #[test]
    fn test_header_error_flag() {
        let header = Header::new("Foo.Sum", 7);
        assert!(!header.is_error());

        let header = header.with_error("boom");
        assert!(header.is_error());
        assert_eq!(header.seq, 7);
    }

    #[test]
    fn test_header_json_field_names() {
        let header = Header::new("Foo.Sum", 1);
        let json = String::from_utf8(CodecType::Json.encode(&header).unwrap()).unwrap();
        assert!(json.contains("\"ServiceMethod\":\"Foo.Sum\""));
        assert!(json.contains("\"Seq\":1"));
    }

    #[test]
    fn test_header_missing_error_defaults_empty() {
        let header: Header =
            CodecType::Json.decode(br#"{"ServiceMethod":"Foo.Sum","Seq":3}"#).unwrap();
        assert_eq!(header.seq, 3);
        assert!(header.error.is_empty());
    }
}
