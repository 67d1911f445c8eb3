//! Connection settings.

use minirpc_protocol::{CodecType, Options};
use std::time::Duration;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Negotiation document sent when the connection opens.
    pub options: Options,
    /// Connection timeout.
    pub connect_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            options: Options::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_codec(mut self, codec: CodecType) -> Self {
        self.options.codec_type = codec;
        self
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minirpc_protocol::MAGIC_NUMBER;

    #[test]
    fn test_config_defaults() {
        let config = ConnectionConfig::new();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.options.magic_number, MAGIC_NUMBER);
        assert_eq!(config.options.codec_type, CodecType::Postcard);
    }

    #[test]
    fn test_config_builders() {
        let config = ConnectionConfig::new()
            .with_codec(CodecType::Json)
            .with_connect_timeout(Duration::from_millis(250));
        assert_eq!(config.options.codec_type, CodecType::Json);
        assert_eq!(config.options.magic_number, MAGIC_NUMBER);
        assert_eq!(config.connect_timeout, Duration::from_millis(250));
    }
}
