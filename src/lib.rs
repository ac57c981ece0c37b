//! # botlink
//!
//! Serial link manager bridging a microcontroller sensor/actuator board to
//! status consumers.
//!
//! The crate owns the single physical connection to the board: it ingests
//! newline-delimited telemetry into a shared state aggregate, throttles a
//! fragile local climate sensor behind a last-known-good cache, and turns
//! externally classified hand gestures into single-byte drive commands —
//! interleaving those writes with the read loop without corrupting either
//! stream, and reconnecting on its own after transient I/O failures.
//!
//! ## Features
//!
//! - Async/await based API using Tokio
//! - One owner task per physical port; writers get a bounded wait, never a hang
//! - Partial-update telemetry parsing tolerant of malformed records
//! - Automatic reconnection with an explicit connection state
//!
//! ## Quick Start
//!
//! ```no_run
//! use botlink::{BotLink, GestureUpdate};
//! # use botlink::{RawSample, SensorError, SensorProbe};
//! # use futures::future::BoxFuture;
//! # struct ClimateSensor;
//! # impl SensorProbe for ClimateSensor {
//! #     fn read(&mut self) -> BoxFuture<'_, Result<RawSample, SensorError>> {
//! #         Box::pin(async { Ok(RawSample { temperature_c: Some(21.0), humidity_pct: None }) })
//! #     }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), botlink::Error> {
//!     let bridge = BotLink::serial("/dev/ttyACM0", ClimateSensor).await?;
//!
//!     // Poll the dashboard payload.
//!     let snapshot = bridge.snapshot().await;
//!     println!("light: {:?}, soil: {:?}", snapshot.light, snapshot.soil_pct);
//!
//!     // Forward a gesture from the classifier.
//!     let ack = bridge
//!         .ingest_gesture(GestureUpdate {
//!             label: Some("fist".into()),
//!             mode: None,
//!         })
//!         .await;
//!     println!("delivered: {}", ack.delivered.is_ok());
//!
//!     bridge.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`protocol`] - Wire-level pieces (line framing, record parsing, command codes)
//! - [`link`] - Serial connection ownership, reconnection, the write path
//! - [`state`] - The shared state aggregate and its snapshot payload
//! - [`sensor`] - Throttled access to the local climate sensor
//! - [`gesture`] - Gesture event ingestion
//! - [`bridge`] - High-level [`BotLink`] composition

pub mod bridge;
pub mod error;
pub mod gesture;
pub mod link;
pub mod protocol;
pub mod sensor;
pub mod state;

// Re-exports for convenience
pub use bridge::{BotLink, BridgeConfig};
pub use error::{Error, Result, SensorError};
pub use gesture::{GestureAck, GestureIngestion, GestureUpdate};
pub use link::{
    ConnectionState, LinkConfig, PortFactory, SerialLink, SerialPortFactory, list_ports,
};
pub use protocol::{GestureMode, LineFramer, TelemetryUpdate, parse_line};
pub use sensor::{RawSample, SensorProbe, ThrottledSensorCache};
pub use state::{BotState, GestureEvent, SensorReading, StateSnapshot};
