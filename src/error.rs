//! Error types for the botlink library.

use thiserror::Error;

/// The main error type for botlink operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Device path missing, or already exclusively held by another process.
    #[error("device unavailable: {reason}")]
    DeviceUnavailable { reason: String },

    /// Connection parameters rejected by the driver.
    #[error("invalid link configuration: {reason}")]
    Config { reason: String },

    /// No live connection at the time of a write.
    #[error("link down")]
    LinkDown,

    /// Serial port error.
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from a local sensor probe.
#[derive(Debug, Error)]
pub enum SensorError {
    /// The probe failed to produce a reading this attempt.
    ///
    /// Transient by definition: the cached reading is substituted and the
    /// next due sample retries.
    #[error("sensor read failed: {reason}")]
    Transient { reason: String },
}

/// Result type alias for botlink operations.
pub type Result<T> = std::result::Result<T, Error>;
