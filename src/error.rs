//! Error taxonomy for the export pipeline.
//!
//! Every stage returns [`ExportError`] so that "unknown device", "data
//! unreachable" and "no rows in range" stay distinguishable all the way to
//! the CLI and HTTP boundaries. The HTTP mapping lives in
//! [`crate::server`].

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExportError>;

#[derive(Debug, Error)]
pub enum ExportError {
    /// Identifier contains characters outside `[A-Za-z0-9_]`.
    #[error("invalid device id: {0:?}")]
    InvalidDeviceId(String),

    /// No backend holds a dataset for this device.
    #[error("device not found: {0}")]
    NotFound(String),

    /// The dataset exists but could not be read or parsed.
    #[error("failed to load {device_id}: {source}")]
    Load {
        device_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// Resolving or loading took longer than the configured bound.
    #[error("source for {device_id} did not respond within {secs}s")]
    SourceUnavailable { device_id: String, secs: u64 },

    /// The dataset loaded but no rows fall in the requested range.
    #[error("no data for {device_id} between {start} and {end}")]
    EmptyResult {
        device_id: String,
        start: String,
        end: String,
    },

    #[error("unsupported export format: {0}")]
    UnsupportedFormat(String),

    #[error("render failed: {0}")]
    Render(String),

    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("invalid date {value:?} for {param}, expected YYYY-MM-DD")]
    InvalidDate { param: &'static str, value: String },

    /// Startup-time fault: the directory or credentials are unusable.
    #[error("configuration fault: {0}")]
    Configuration(String),
}

impl ExportError {
    pub fn load(device_id: &str, source: impl Into<anyhow::Error>) -> Self {
        ExportError::Load {
            device_id: device_id.to_string(),
            source: source.into(),
        }
    }

    pub fn render(err: impl std::fmt::Display) -> Self {
        ExportError::Render(err.to_string())
    }
}
