//! Gesture event ingestion.
//!
//! An external classifier delivers `{label, mode?}`-shaped events. Each one
//! is recorded in shared state first, so the dashboard always reflects the
//! attempt, and then translated into a drive command byte sent through the
//! link's exclusive write path. A failed send is not retried here: the
//! classifier repeats quickly, and the next event is the next opportunity.

use std::sync::Arc;

use chrono::Utc;

use crate::error::{Error, Result};
use crate::link::SerialLink;
use crate::protocol::GestureMode;
use crate::state::{BotState, GestureEvent};

/// An inbound gesture classification.
#[derive(Debug, Clone, Default)]
pub struct GestureUpdate {
    /// Classifier label (`fist`, `one`, `open`, ...), if a hand was seen.
    pub label: Option<String>,
    /// Explicit mode name, overriding the label mapping when present.
    pub mode: Option<String>,
}

/// Outcome of one ingested gesture.
#[derive(Debug)]
pub struct GestureAck {
    /// The event as recorded in shared state.
    pub event: GestureEvent,
    /// Whether the command byte reached the board.
    pub delivered: Result<()>,
}

/// Accepts gesture events and forwards their commands to the board.
pub struct GestureIngestion {
    state: Arc<BotState>,
    link: Arc<SerialLink>,
}

impl GestureIngestion {
    /// Creates an ingestion front over the shared state and link handles.
    #[must_use]
    pub fn new(state: Arc<BotState>, link: Arc<SerialLink>) -> Self {
        Self { state, link }
    }

    /// Records the gesture and sends its command byte.
    ///
    /// The event is recorded whether or not the write succeeds; only the
    /// delivery result distinguishes the two. Never blocks longer than the
    /// link's bounded write wait.
    pub async fn ingest(&self, update: GestureUpdate) -> GestureAck {
        let mode = resolve_mode(&update);
        let event = build_event(update.label, mode);
        self.state.set_gesture(event.clone()).await;

        let command = mode.command_byte();
        let delivered = match self.link.write(command).await {
            Ok(()) => {
                tracing::debug!(
                    "sent gesture command {:?} (mode: {})",
                    char::from(command),
                    mode.as_str()
                );
                Ok(())
            }
            Err(Error::LinkDown) => {
                tracing::warn!(
                    "gesture {} recorded but not delivered: link down",
                    mode.as_str()
                );
                Err(Error::LinkDown)
            }
            Err(e) => {
                tracing::warn!("gesture {} recorded but not delivered: {e}", mode.as_str());
                Err(e)
            }
        };

        GestureAck { event, delivered }
    }
}

/// Explicit mode name wins; otherwise the label mapping decides.
fn resolve_mode(update: &GestureUpdate) -> GestureMode {
    update
        .mode
        .as_deref()
        .and_then(GestureMode::from_mode_str)
        .unwrap_or_else(|| GestureMode::from_label(update.label.as_deref()))
}

fn build_event(label: Option<String>, mode: GestureMode) -> GestureEvent {
    match label {
        Some(label) => GestureEvent {
            message: format!("Gesture {label} detected -> engaging {}", mode.as_str()),
            label: Some(label),
            mode,
            detected_at: Some(Utc::now()),
        },
        None => GestureEvent {
            mode,
            ..GestureEvent::idle()
        },
    }
}
