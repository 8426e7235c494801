//! Error taxonomy for the ingestion path.
//!
//! Only `StreamUnavailable` (at startup) and `ConfigError` are fatal; everything else is
//! absorbed by the polling driver.

use std::io;

/// Why a single frame produced no batch.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("frame is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("frame is empty")]
    EmptyFrame,
    #[error("malformed frame: {0}")]
    MalformedSyntax(#[from] serde_json::Error),
    /// Only produced when the decoder runs with `strict_schema`.
    #[error("frame has no usable `lastMessageTimes` array")]
    SchemaMismatch,
}

/// Failures touching the serial stream itself.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("cannot open serial port {port}: {source}")]
    StreamUnavailable {
        port: String,
        #[source]
        source: serialport::Error,
    },
    #[error("serial read failed: {0}")]
    TransientReadFailure(#[from] io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
    #[error("invalid value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}
