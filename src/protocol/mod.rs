//! Protocol layer for board communication.
//!
//! This module contains the wire-level pieces:
//! - Line framing of the inbound telemetry stream
//! - Telemetry record parsing
//! - Outbound drive command codes

pub mod command;
pub mod framer;
pub mod parser;

pub use command::GestureMode;
pub use framer::{LineFramer, MAX_LINE_LEN};
pub use parser::{TelemetryUpdate, looks_corrupt, parse_line};
