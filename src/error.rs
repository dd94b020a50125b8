//! Error types for the capture pipeline

use thiserror::Error;

use crate::capture::driver::DriverError;

pub type Result<T> = std::result::Result<T, ScanError>;

/// Errors surfaced to the owner of a [`CameraSession`](crate::session::CameraSession).
///
/// Per-frame problems (recognizer failures, stray buffers) never show up
/// here; they are relayed as [`ScanEvent`](crate::recognition::ScanEvent)s
/// or logged and counted.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("camera device unavailable: {0}")]
    DeviceUnavailable(#[source] DriverError),

    #[error("no preview size shares an aspect ratio with any picture size")]
    NoCompatibleSize,

    #[error("camera driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("invalid lifecycle transition: expected {expected}, found {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("failed to spawn frame worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
