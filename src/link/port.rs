//! Physical port acquisition.
//!
//! The link task opens ports through the [`PortFactory`] seam so the
//! connection lifecycle can be exercised against in-memory streams; the
//! serial implementation talks to the real device.

use std::io;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use crate::error::{Error, Result};

/// Default baud rate for the board.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default delay after opening before the port is considered usable.
pub const DEFAULT_STABILIZE_DELAY: Duration = Duration::from_millis(200);

/// Opens the physical duplex byte stream the link task owns.
pub trait PortFactory: Send + 'static {
    /// The opened duplex stream.
    type Port: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Attempts to acquire the device.
    ///
    /// # Errors
    ///
    /// [`Error::DeviceUnavailable`] when the path is missing or exclusively
    /// held, [`Error::Config`] when the connection parameters are rejected.
    fn open(&self) -> BoxFuture<'_, Result<Self::Port>>;
}

/// Serial port factory for the real board.
///
/// Scans candidates in order: the preferred path first, then any enumerated
/// USB-serial device, taking the first that opens. A freshly opened port has
/// RTS deasserted, is given a short stabilization delay, and has its stale
/// input discarded.
#[derive(Debug, Clone)]
pub struct SerialPortFactory {
    path: String,
    baud_rate: u32,
    stabilize_delay: Duration,
}

impl SerialPortFactory {
    /// Creates a factory for the given preferred path with default settings.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            stabilize_delay: DEFAULT_STABILIZE_DELAY,
        }
    }

    /// Sets the baud rate.
    #[must_use]
    pub const fn baud_rate(mut self, rate: u32) -> Self {
        self.baud_rate = rate;
        self
    }

    /// Sets the post-open stabilization delay.
    #[must_use]
    pub const fn stabilize_delay(mut self, delay: Duration) -> Self {
        self.stabilize_delay = delay;
        self
    }

    /// Preferred path first, then every other USB-serial candidate.
    fn candidates(&self) -> Vec<String> {
        let mut paths = vec![self.path.clone()];
        let mut discovered = list_ports().unwrap_or_default();
        discovered.sort();
        for candidate in discovered {
            if !paths.contains(&candidate) {
                paths.push(candidate);
            }
        }
        paths
    }

    async fn open_candidate(&self, path: &str) -> Result<SerialStream> {
        let mut stream = tokio_serial::new(path, self.baud_rate)
            .open_native_async()
            .map_err(|e| classify_open_error(path, &e))?;

        // Deassert RTS before talking to the board; some bootloaders reset
        // on an asserted line.
        if let Err(e) = tokio_serial::SerialPort::write_request_to_send(&mut stream, false) {
            tracing::warn!("failed to set RTS on {path}: {e}");
        }

        tokio::time::sleep(self.stabilize_delay).await;

        // Discard whatever accumulated while the port was unattended.
        if let Err(e) = tokio_serial::SerialPort::clear(&stream, tokio_serial::ClearBuffer::Input) {
            tracing::warn!("failed to clear input buffer on {path}: {e}");
        }

        tracing::info!("serial connected on {path} @ {} bps", self.baud_rate);
        Ok(stream)
    }
}

impl PortFactory for SerialPortFactory {
    type Port = SerialStream;

    fn open(&self) -> BoxFuture<'_, Result<Self::Port>> {
        Box::pin(async move {
            let mut last_err = None;
            for path in self.candidates() {
                match self.open_candidate(&path).await {
                    Ok(stream) => return Ok(stream),
                    Err(e) => {
                        tracing::debug!("serial port {path} unavailable: {e}");
                        last_err = Some(e);
                    }
                }
            }
            Err(last_err.unwrap_or_else(|| Error::DeviceUnavailable {
                reason: "no serial devices found".into(),
            }))
        })
    }
}

/// Lists candidate serial device paths.
///
/// # Errors
///
/// Returns an error if the port list cannot be retrieved.
pub fn list_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports().map_err(Error::Serial)?;
    Ok(ports
        .into_iter()
        .map(|p| p.port_name)
        .filter(|name| name.contains("ttyACM") || name.contains("ttyUSB") || name.contains("COM"))
        .collect())
}

/// Sorts driver-level open failures into the retryable/fatal taxonomy.
fn classify_open_error(path: &str, e: &tokio_serial::Error) -> Error {
    match e.kind() {
        tokio_serial::ErrorKind::NoDevice => Error::DeviceUnavailable {
            reason: format!("{path}: {e}"),
        },
        tokio_serial::ErrorKind::Io(io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied) => {
            Error::DeviceUnavailable {
                reason: format!("{path}: {e}"),
            }
        }
        tokio_serial::ErrorKind::InvalidInput => Error::Config {
            reason: e.to_string(),
        },
        _ if e.to_string().to_ascii_lowercase().contains("busy") => Error::DeviceUnavailable {
            reason: format!("{path}: locked by another process"),
        },
        _ => Error::Serial(e.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_builder() {
        let factory = SerialPortFactory::new("/dev/ttyACM0")
            .baud_rate(9600)
            .stabilize_delay(Duration::from_millis(50));
        assert_eq!(factory.baud_rate, 9600);
        assert_eq!(factory.stabilize_delay, Duration::from_millis(50));
    }

    #[test]
    fn test_preferred_path_is_first_candidate() {
        let factory = SerialPortFactory::new("/dev/ttyACM7");
        assert_eq!(factory.candidates()[0], "/dev/ttyACM7");
    }

    #[test]
    fn test_classify_no_device() {
        let e = tokio_serial::Error::new(tokio_serial::ErrorKind::NoDevice, "gone");
        assert!(matches!(
            classify_open_error("/dev/ttyACM0", &e),
            Error::DeviceUnavailable { .. }
        ));
    }

    #[test]
    fn test_classify_bad_settings() {
        let e = tokio_serial::Error::new(tokio_serial::ErrorKind::InvalidInput, "bad baud");
        assert!(matches!(
            classify_open_error("/dev/ttyACM0", &e),
            Error::Config { .. }
        ));
    }

    #[test]
    fn test_classify_busy_port() {
        let e = tokio_serial::Error::new(
            tokio_serial::ErrorKind::Unknown,
            "Device or resource busy",
        );
        assert!(matches!(
            classify_open_error("/dev/ttyACM0", &e),
            Error::DeviceUnavailable { .. }
        ));
    }
}
