//! Process-wide board state.
//!
//! [`BotState`] is the single source of truth read by the HTTP surface.
//! Exactly three producers mutate it: the serial read loop (telemetry), the
//! sensor sampler (climate readings) and gesture ingestion. Each producer
//! funnels through one narrow update method, and every update is atomic with
//! respect to readers, so a snapshot never observes a half-applied record.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::link::ConnectionState;
use crate::protocol::{GestureMode, TelemetryUpdate};

/// One cached climate reading from the local sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    /// Temperature in degrees Celsius.
    pub temperature_c: Option<f64>,
    /// Relative humidity in percent.
    pub humidity_pct: Option<f64>,
    /// When the physical read behind this value succeeded.
    pub sampled_at: DateTime<Utc>,
}

/// The most recent gesture event, superseded by the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GestureEvent {
    /// Classifier label as delivered, if any.
    pub label: Option<String>,
    /// Resolved drive mode.
    pub mode: GestureMode,
    /// Human-readable event description for the dashboard.
    pub message: String,
    /// When the gesture was received; `None` when no gesture is active.
    pub detected_at: Option<DateTime<Utc>>,
}

impl GestureEvent {
    /// Placeholder event shown before any gesture arrives.
    #[must_use]
    pub fn idle() -> Self {
        Self {
            label: None,
            mode: GestureMode::Standby,
            message: "No gesture detected".into(),
            detected_at: None,
        }
    }
}

/// Read-only snapshot served to external pollers.
///
/// Safe to produce at arbitrary frequency; carries no handles and has no
/// side effects.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    /// Light detected flag, `None` until first seen.
    pub light: Option<bool>,
    /// Soil humidity in percent.
    pub soil_pct: Option<f64>,
    /// Obstacle distance in centimeters.
    pub distance_cm: Option<f64>,
    /// Temperature in degrees Celsius.
    pub temperature_c: Option<f64>,
    /// Relative humidity in percent.
    pub humidity_pct: Option<f64>,
    /// Age of the climate reading in seconds, so stale cached values are
    /// distinguishable from fresh ones.
    pub sensor_age_secs: Option<i64>,
    /// Latest gesture label.
    pub gesture_label: Option<String>,
    /// Latest resolved gesture mode.
    pub gesture_mode: GestureMode,
    /// Dashboard copy for the latest gesture event.
    pub gesture_message: String,
    /// When the latest gesture was received.
    pub gesture_detected_at: Option<DateTime<Utc>>,
    /// Current serial link state.
    pub connection_state: ConnectionState,
    /// Most recent successful update from any producer.
    pub last_updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct StateInner {
    light: Option<bool>,
    soil_pct: Option<f64>,
    distance_cm: Option<f64>,
    sensor: Option<SensorReading>,
    gesture: GestureEvent,
    connection: ConnectionState,
    last_updated_at: Option<DateTime<Utc>>,
}

/// Shared aggregate of the latest board state.
#[derive(Debug)]
pub struct BotState {
    inner: RwLock<StateInner>,
}

impl BotState {
    /// Creates a fresh state with everything unknown.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(StateInner {
                light: None,
                soil_pct: None,
                distance_cm: None,
                sensor: None,
                gesture: GestureEvent::idle(),
                connection: ConnectionState::Disconnected,
                last_updated_at: None,
            }),
        })
    }

    /// Applies a parsed telemetry record.
    ///
    /// Partial update semantics: only fields present in the record change,
    /// and an empty record changes nothing, including `last_updated_at`.
    pub async fn apply_telemetry(&self, update: TelemetryUpdate) {
        if update.is_empty() {
            return;
        }
        let mut inner = self.inner.write().await;
        if let Some(light) = update.light {
            inner.light = Some(light);
        }
        if let Some(soil) = update.soil_pct {
            inner.soil_pct = Some(soil);
        }
        if let Some(distance) = update.distance_cm {
            inner.distance_cm = Some(distance);
        }
        inner.touch();
    }

    /// Publishes the latest climate reading from the sensor sampler.
    pub async fn set_sensor_reading(&self, reading: SensorReading) {
        let mut inner = self.inner.write().await;
        inner.sensor = Some(reading);
        inner.touch();
    }

    /// Records a gesture event (whether or not its command reached the board).
    pub async fn set_gesture(&self, event: GestureEvent) {
        let mut inner = self.inner.write().await;
        inner.gesture = event;
        inner.touch();
    }

    /// Mirrors a serial link state transition.
    pub async fn set_connection_state(&self, state: ConnectionState) {
        let mut inner = self.inner.write().await;
        if inner.connection != state {
            tracing::debug!("connection state: {:?} -> {:?}", inner.connection, state);
            inner.connection = state;
            inner.touch();
        }
    }

    /// Current link state.
    pub async fn connection_state(&self) -> ConnectionState {
        self.inner.read().await.connection
    }

    /// Produces a point-in-time copy for external consumers.
    pub async fn snapshot(&self) -> StateSnapshot {
        let inner = self.inner.read().await;
        let now = Utc::now();
        StateSnapshot {
            light: inner.light,
            soil_pct: inner.soil_pct,
            distance_cm: inner.distance_cm,
            temperature_c: inner.sensor.and_then(|s| s.temperature_c),
            humidity_pct: inner.sensor.and_then(|s| s.humidity_pct),
            sensor_age_secs: inner
                .sensor
                .map(|s| (now - s.sampled_at).num_seconds().max(0)),
            gesture_label: inner.gesture.label.clone(),
            gesture_mode: inner.gesture.mode,
            gesture_message: inner.gesture.message.clone(),
            gesture_detected_at: inner.gesture.detected_at,
            connection_state: inner.connection,
            last_updated_at: inner.last_updated_at,
        }
    }
}

impl StateInner {
    /// Advances `last_updated_at`, keeping it monotonic even if the wall
    /// clock steps backwards.
    fn touch(&mut self) {
        let now = Utc::now();
        self.last_updated_at = Some(match self.last_updated_at {
            Some(prev) if prev > now => prev,
            _ => now,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_partial_update_keeps_other_fields() {
        let state = BotState::new();
        state
            .apply_telemetry(TelemetryUpdate {
                light: Some(true),
                soil_pct: Some(42.5),
                distance_cm: Some(33.0),
            })
            .await;

        state
            .apply_telemetry(TelemetryUpdate {
                light: None,
                soil_pct: Some(40.0),
                distance_cm: None,
            })
            .await;

        let snap = state.snapshot().await;
        assert_eq!(snap.light, Some(true));
        assert_eq!(snap.soil_pct, Some(40.0));
        assert_eq!(snap.distance_cm, Some(33.0));
    }

    #[tokio::test]
    async fn test_empty_update_does_not_advance_timestamp() {
        let state = BotState::new();
        state
            .apply_telemetry(TelemetryUpdate {
                light: Some(false),
                ..TelemetryUpdate::default()
            })
            .await;
        let before = state.snapshot().await.last_updated_at;
        assert!(before.is_some());

        state.apply_telemetry(TelemetryUpdate::default()).await;

        let snap = state.snapshot().await;
        assert_eq!(snap.last_updated_at, before);
        assert_eq!(snap.light, Some(false));
    }

    #[tokio::test]
    async fn test_sensor_reading_and_age() {
        let state = BotState::new();
        state
            .set_sensor_reading(SensorReading {
                temperature_c: Some(24.0),
                humidity_pct: Some(61.0),
                sampled_at: Utc::now() - chrono::Duration::seconds(30),
            })
            .await;

        let snap = state.snapshot().await;
        assert_eq!(snap.temperature_c, Some(24.0));
        assert_eq!(snap.humidity_pct, Some(61.0));
        assert!(snap.sensor_age_secs.unwrap() >= 30);
    }

    #[tokio::test]
    async fn test_connection_state_transition_recorded() {
        let state = BotState::new();
        assert_eq!(
            state.connection_state().await,
            ConnectionState::Disconnected
        );

        state
            .set_connection_state(ConnectionState::Connected)
            .await;
        assert_eq!(state.connection_state().await, ConnectionState::Connected);
        assert_eq!(
            state.snapshot().await.connection_state,
            ConnectionState::Connected
        );
    }

    #[tokio::test]
    async fn test_snapshot_serializes() {
        let state = BotState::new();
        let snap = state.snapshot().await;
        let json = serde_json::to_value(&snap).unwrap();

        assert!(json.get("light").is_some());
        assert_eq!(json["gesture_mode"], "standby");
        assert_eq!(json["connection_state"], "disconnected");
    }
}
