use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("server_name must not be empty")]
    EmptyServerName,
    #[error("{0} must be non-zero")]
    ZeroValue(&'static str),
    #[error("{field} must be within {min}..={max}, got {bits}")]
    WindowBitsOutOfRange {
        field: &'static str,
        bits: u8,
        min: u8,
        max: u8,
    },
}

/// Failure reported by an origin connection while parsing or forwarding.
#[derive(Debug, Error)]
pub enum OriginError {
    #[error("origin response parse failed: {0}")]
    Parse(String),
    #[error("origin write failed: {0}")]
    Write(#[from] std::io::Error),
    #[error("origin connection is detached")]
    Detached,
}
