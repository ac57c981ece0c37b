//! High-level [`BotLink`] bridge.
//!
//! Composes the pieces into one handle: shared state, the serial link task,
//! the sensor sampler task, and gesture ingestion. The HTTP surface only
//! ever needs `snapshot()` and `ingest_gesture()`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::gesture::{GestureAck, GestureIngestion, GestureUpdate};
use crate::link::{LinkConfig, PortFactory, SerialLink, SerialPortFactory};
use crate::sensor::{MIN_SAMPLE_INTERVAL, SensorProbe, ThrottledSensorCache};
use crate::state::{BotState, StateSnapshot};

/// Default cadence of the sensor sampler task.
pub const DEFAULT_SENSOR_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Bridge-wide configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Serial link tuning.
    pub link: LinkConfig,
    /// How often the sampler task asks the cache for a reading.
    pub sensor_poll_interval: Duration,
    /// Minimum interval between physical sensor reads.
    pub sensor_min_interval: Duration,
}

impl BridgeConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            link: LinkConfig::new(),
            sensor_poll_interval: DEFAULT_SENSOR_POLL_INTERVAL,
            sensor_min_interval: MIN_SAMPLE_INTERVAL,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Bridge between the board, the local sensor and external consumers.
pub struct BotLink {
    state: Arc<BotState>,
    link: Arc<SerialLink>,
    gestures: GestureIngestion,
    sampler: Option<JoinHandle<()>>,
    sampler_shutdown: watch::Sender<bool>,
}

impl BotLink {
    /// Connects to the board on a serial path with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the connection parameters are rejected;
    /// an unavailable device is not an error here, the link keeps retrying
    /// in the background.
    pub async fn serial<P: SensorProbe + 'static>(
        path: impl Into<String>,
        probe: P,
    ) -> Result<Self> {
        Self::connect(SerialPortFactory::new(path), probe, BridgeConfig::new()).await
    }

    /// Connects with explicit factory, probe and configuration.
    ///
    /// One eager open attempt is made so that rejected connection parameters
    /// fail at startup instead of being retried forever; any other open
    /// failure is left to the reconnection policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for rejected connection parameters.
    pub async fn connect<F: PortFactory, P: SensorProbe + 'static>(
        factory: F,
        probe: P,
        config: BridgeConfig,
    ) -> Result<Self> {
        let state = BotState::new();

        let link = match factory.open().await {
            Ok(port) => {
                SerialLink::spawn_with_port(factory, port, config.link.clone(), Arc::clone(&state))
            }
            Err(e @ Error::Config { .. }) => return Err(e),
            Err(e) => {
                tracing::warn!("initial open failed ({e}), retrying in background");
                SerialLink::spawn(factory, config.link.clone(), Arc::clone(&state))
            }
        };
        let link = Arc::new(link);

        let (sampler_shutdown, shutdown_rx) = watch::channel(false);
        let sampler = spawn_sampler(probe, &config, Arc::clone(&state), shutdown_rx);

        let gestures = GestureIngestion::new(Arc::clone(&state), Arc::clone(&link));

        Ok(Self {
            state,
            link,
            gestures,
            sampler: Some(sampler),
            sampler_shutdown,
        })
    }

    /// Point-in-time copy of the shared state.
    pub async fn snapshot(&self) -> StateSnapshot {
        self.state.snapshot().await
    }

    /// Records a gesture event and forwards its command to the board.
    pub async fn ingest_gesture(&self, update: GestureUpdate) -> GestureAck {
        self.gestures.ingest(update).await
    }

    /// The shared state handle, for callers that poll it directly.
    #[must_use]
    pub fn state(&self) -> Arc<BotState> {
        Arc::clone(&self.state)
    }

    /// Stops the sampler and link tasks and waits for them to exit.
    pub async fn shutdown(mut self) {
        let _ = self.sampler_shutdown.send(true);
        if let Some(task) = self.sampler.take() {
            let _ = task.await;
        }

        drop(self.gestures);
        match Arc::into_inner(self.link) {
            Some(link) => link.shutdown().await,
            // A leaked clone keeps the task alive; its Drop aborts it.
            None => tracing::debug!("link handle still shared at shutdown"),
        }
    }
}

/// The independent timer-driven path: cache → shared state.
fn spawn_sampler<P: SensorProbe + 'static>(
    probe: P,
    config: &BridgeConfig,
    state: Arc<BotState>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let poll_interval = config.sensor_poll_interval;
    let min_interval = config.sensor_min_interval;

    tokio::spawn(async move {
        let mut cache = ThrottledSensorCache::with_interval(probe, min_interval);
        let mut published_at: Option<DateTime<Utc>> = None;

        loop {
            tokio::select! {
                biased;
                res = shutdown_rx.changed() => {
                    if res.is_err() || *shutdown_rx.borrow_and_update() {
                        break;
                    }
                }
                () = tokio::time::sleep(poll_interval) => {
                    if let Some(reading) = cache.sample().await {
                        // Re-publishing an unchanged cached reading would
                        // advance last_updated_at without new information.
                        if published_at != Some(reading.sampled_at) {
                            published_at = Some(reading.sampled_at);
                            state.set_sensor_reading(reading).await;
                        }
                    }
                }
            }
        }
        tracing::debug!("sensor sampler exiting");
    })
}
