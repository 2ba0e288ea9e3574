use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Frontend HTTP/2 tuning knobs.
///
/// Window sizes are expressed as bit widths: the advertised initial window is
/// `(1 << bits) - 1`. A connection window wider than the protocol default
/// (16 bits) is announced with an initial connection-level WINDOW_UPDATE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Http2Config {
    pub max_concurrent_streams: u32,
    pub stream_window_bits: u8,
    pub connection_window_bits: u8,
    pub padding: bool,
    pub frame_debug: bool,
    pub dump_request_header: Option<PathBuf>,
    pub dump_response_header: Option<PathBuf>,
}

impl Default for Http2Config {
    fn default() -> Self {
        Self {
            max_concurrent_streams: 100,
            stream_window_bits: 16,
            connection_window_bits: 16,
            padding: false,
            frame_debug: false,
            dump_request_header: None,
            dump_response_header: None,
        }
    }
}

impl Http2Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_streams == 0 {
            return Err(ConfigError::ZeroValue("http2.max_concurrent_streams"));
        }
        if !(6..=30).contains(&self.stream_window_bits) {
            return Err(ConfigError::WindowBitsOutOfRange {
                field: "http2.stream_window_bits",
                bits: self.stream_window_bits,
                min: 6,
                max: 30,
            });
        }
        if !(16..=30).contains(&self.connection_window_bits) {
            return Err(ConfigError::WindowBitsOutOfRange {
                field: "http2.connection_window_bits",
                bits: self.connection_window_bits,
                min: 16,
                max: 30,
            });
        }
        Ok(())
    }

    /// Initial per-stream receive window advertised in SETTINGS.
    pub fn stream_window(&self) -> u32 {
        (1u32 << self.stream_window_bits) - 1
    }

    /// Connection receive window the session maintains.
    pub fn connection_window(&self) -> u32 {
        (1u32 << self.connection_window_bits) - 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyConfig {
    pub server_name: String,
    /// Operate as a forward HTTP/2 proxy: `:authority` becomes mandatory on
    /// every request.
    pub http2_proxy: bool,
    /// Client-side proxy deployment; disables Location rewriting.
    pub client_proxy: bool,
    /// Leave any origin-supplied Via value untouched instead of appending
    /// this proxy's token.
    pub no_via: bool,
    pub accesslog: bool,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub http2: Http2Config,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            server_name: "portico".to_string(),
            http2_proxy: false,
            client_proxy: false,
            no_via: false,
            accesslog: true,
            read_timeout_ms: 180_000,
            write_timeout_ms: 60_000,
            http2: Http2Config::default(),
        }
    }
}

impl ProxyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_name.trim().is_empty() {
            return Err(ConfigError::EmptyServerName);
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::ZeroValue("read_timeout_ms"));
        }
        if self.write_timeout_ms == 0 {
            return Err(ConfigError::ZeroValue("write_timeout_ms"));
        }
        self.http2.validate()
    }
}
