//! Throttled access to the local climate sensor.
//!
//! DHT-style sensors tolerate at most one read every couple of seconds and
//! fail a read now and then as a matter of course. The cache enforces a
//! minimum re-sample interval, retries a handful of times within one due
//! sample, and otherwise serves the last good reading instead of a hole.

use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use tokio::time::Instant;

use crate::error::SensorError;
use crate::state::SensorReading;

/// Minimum interval between physical read attempts.
pub const MIN_SAMPLE_INTERVAL: Duration = Duration::from_secs(2);

/// Physical-layer attempts per due sample before giving up for the interval.
pub const READ_ATTEMPTS: u32 = 3;

/// One successful physical read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    /// Temperature in degrees Celsius.
    pub temperature_c: Option<f64>,
    /// Relative humidity in percent.
    pub humidity_pct: Option<f64>,
}

/// A physical sensor source yielding a value or a transient failure.
pub trait SensorProbe: Send {
    /// Performs one physical read attempt.
    fn read(&mut self) -> BoxFuture<'_, Result<RawSample, SensorError>>;
}

/// Wraps a [`SensorProbe`] with re-sample throttling and last-known-good
/// caching.
pub struct ThrottledSensorCache<P> {
    probe: P,
    min_interval: Duration,
    last_good: Option<SensorReading>,
    last_attempt_at: Option<Instant>,
    consecutive_failures: u32,
}

impl<P: SensorProbe> ThrottledSensorCache<P> {
    /// Creates a cache with the default throttle interval.
    #[must_use]
    pub fn new(probe: P) -> Self {
        Self::with_interval(probe, MIN_SAMPLE_INTERVAL)
    }

    /// Creates a cache with a custom throttle interval.
    #[must_use]
    pub fn with_interval(probe: P, min_interval: Duration) -> Self {
        Self {
            probe,
            min_interval,
            last_good: None,
            last_attempt_at: None,
            consecutive_failures: 0,
        }
    }

    /// Returns the current reading, physically re-sampling only when the
    /// throttle interval has elapsed.
    ///
    /// A failed physical read never overwrites the cache: the previous good
    /// reading is returned, and the failure is logged once for the interval.
    /// Returns `None` only before the first successful read.
    pub async fn sample(&mut self) -> Option<SensorReading> {
        let now = Instant::now();
        let due = match self.last_attempt_at {
            Some(at) => now.duration_since(at) >= self.min_interval,
            None => true,
        };
        if !due {
            return self.last_good;
        }
        self.last_attempt_at = Some(now);

        for attempt in 1..=READ_ATTEMPTS {
            match self.probe.read().await {
                Ok(raw) => {
                    self.consecutive_failures = 0;
                    let reading = SensorReading {
                        temperature_c: raw.temperature_c,
                        humidity_pct: raw.humidity_pct,
                        sampled_at: Utc::now(),
                    };
                    self.last_good = Some(reading);
                    tracing::trace!(
                        "sensor read ok (attempt {attempt}): {:?} C, {:?} %",
                        raw.temperature_c,
                        raw.humidity_pct
                    );
                    return self.last_good;
                }
                Err(e) => {
                    tracing::trace!("sensor read attempt {attempt} failed: {e}");
                }
            }
        }

        self.consecutive_failures += 1;
        tracing::warn!(
            "sensor read failed after {READ_ATTEMPTS} attempts ({} intervals in a row), serving cached reading",
            self.consecutive_failures
        );
        self.last_good
    }

    /// Number of consecutive throttle intervals whose sample failed.
    #[must_use]
    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scripted probe: pops one result per read attempt, then repeats the
    /// final entry forever.
    struct ScriptedProbe {
        script: Vec<Result<RawSample, ()>>,
        reads: usize,
    }

    impl ScriptedProbe {
        fn new(script: Vec<Result<RawSample, ()>>) -> Self {
            Self { script, reads: 0 }
        }
    }

    impl SensorProbe for ScriptedProbe {
        fn read(&mut self) -> BoxFuture<'_, Result<RawSample, SensorError>> {
            let idx = self.reads.min(self.script.len() - 1);
            self.reads += 1;
            let result = self.script[idx].map_err(|()| SensorError::Transient {
                reason: "checksum mismatch".into(),
            });
            Box::pin(async move { result })
        }
    }

    fn sample_of(temp: f64) -> RawSample {
        RawSample {
            temperature_c: Some(temp),
            humidity_pct: Some(50.0),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_within_interval_returns_cached_without_reading() {
        let probe = ScriptedProbe::new(vec![Ok(sample_of(21.0)), Ok(sample_of(99.0))]);
        let mut cache = ThrottledSensorCache::new(probe);

        let first = cache.sample().await.unwrap();
        assert_eq!(first.temperature_c, Some(21.0));

        // Well inside the throttle window: bit-identical cached reading.
        tokio::time::advance(Duration::from_millis(500)).await;
        let second = cache.sample().await.unwrap();
        assert_eq!(second, first);
        assert_eq!(cache.probe.reads, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resamples_after_interval() {
        let probe = ScriptedProbe::new(vec![Ok(sample_of(21.0)), Ok(sample_of(22.5))]);
        let mut cache = ThrottledSensorCache::new(probe);

        cache.sample().await;
        tokio::time::advance(MIN_SAMPLE_INTERVAL).await;

        let reading = cache.sample().await.unwrap();
        assert_eq!(reading.temperature_c, Some(22.5));
        assert_eq!(cache.probe.reads, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_read_keeps_previous_good_reading() {
        let probe = ScriptedProbe::new(vec![Ok(sample_of(24.0)), Err(())]);
        let mut cache = ThrottledSensorCache::new(probe);

        let good = cache.sample().await.unwrap();
        tokio::time::advance(MIN_SAMPLE_INTERVAL).await;

        let reading = cache.sample().await.unwrap();
        assert_eq!(reading, good);
        assert_eq!(cache.consecutive_failures(), 1);
        // All three attempts were burned on the failing interval.
        assert_eq!(cache.probe.reads, 1 + READ_ATTEMPTS as usize);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_within_one_sample_succeeds() {
        let probe = ScriptedProbe::new(vec![Err(()), Err(()), Ok(sample_of(20.0))]);
        let mut cache = ThrottledSensorCache::new(probe);

        let reading = cache.sample().await.unwrap();
        assert_eq!(reading.temperature_c, Some(20.0));
        assert_eq!(cache.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_reading_before_first_success() {
        let probe = ScriptedProbe::new(vec![Err(())]);
        let mut cache = ThrottledSensorCache::new(probe);

        assert!(cache.sample().await.is_none());
        assert_eq!(cache.consecutive_failures(), 1);

        tokio::time::advance(MIN_SAMPLE_INTERVAL).await;
        assert!(cache.sample().await.is_none());
        assert_eq!(cache.consecutive_failures(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_does_not_shorten_throttle() {
        let probe = ScriptedProbe::new(vec![Err(()), Ok(sample_of(19.0))]);
        let mut cache = ThrottledSensorCache::new(probe);

        cache.sample().await;
        let reads_after_failure = cache.probe.reads;

        // Immediately after the failed interval: still throttled, no reads.
        cache.sample().await;
        assert_eq!(cache.probe.reads, reads_after_failure);
    }
}
