//! Bandwidth estimation shared between renderer builders and the player

use parking_lot::Mutex;
use std::time::Duration;

const FAST_EWMA_HALF_LIFE: f64 = 2.0;
const SLOW_EWMA_HALF_LIFE: f64 = 10.0;
const MINIMUM_SAMPLE_BYTES: u64 = 16_000;
const MINIMUM_TOTAL_BYTES: u64 = 150_000;

/// Exponentially-weighted moving average, weighting recent samples more
#[derive(Debug, Clone)]
struct Ewma {
    alpha: f64,
    last_estimate: f64,
    total_weight: f64,
}

impl Ewma {
    fn new(half_life_secs: f64) -> Self {
        Self {
            alpha: (0.5f64.ln() / half_life_secs).exp(),
            last_estimate: 0.0,
            total_weight: 0.0,
        }
    }

    fn add_sample(&mut self, weight: f64, value: f64) {
        let adj_alpha = self.alpha.powf(weight);
        self.last_estimate = value * (1.0 - adj_alpha) + adj_alpha * self.last_estimate;
        self.total_weight += weight;
    }

    fn estimate(&self) -> f64 {
        if self.total_weight == 0.0 {
            0.0
        } else {
            self.last_estimate / (1.0 - self.alpha.powf(self.total_weight))
        }
    }
}

#[derive(Debug)]
struct MeterState {
    fast: Ewma,
    slow: Ewma,
    bytes_sampled: u64,
}

impl MeterState {
    fn new() -> Self {
        Self {
            fast: Ewma::new(FAST_EWMA_HALF_LIFE),
            slow: Ewma::new(SLOW_EWMA_HALF_LIFE),
            bytes_sampled: 0,
        }
    }
}

/// Bandwidth estimate from a fast and a slow EWMA.
///
/// The minimum of both is reported so a sudden drop has a lasting effect and a
/// rise only shows once it persisted.
#[derive(Debug)]
pub struct BandwidthMeter {
    state: Mutex<MeterState>,
}

impl BandwidthMeter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MeterState::new()),
        }
    }

    /// Record a completed transfer; transfers below 16 kB are ignored
    pub fn add_sample(&self, elapsed: Duration, bytes: u64) {
        if bytes < MINIMUM_SAMPLE_BYTES || elapsed.is_zero() {
            return;
        }
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let bitrate = bytes as f64 * 8000.0 / elapsed_ms;
        let weight = elapsed_ms / 1000.0;

        let mut state = self.state.lock();
        state.bytes_sampled += bytes;
        state.fast.add_sample(weight, bitrate);
        state.slow.add_sample(weight, bitrate);
    }

    /// Current estimate in bits per second, `None` until enough data was sampled
    pub fn bitrate_estimate(&self) -> Option<u64> {
        let state = self.state.lock();
        if state.bytes_sampled < MINIMUM_TOTAL_BYTES {
            None
        } else {
            Some(state.fast.estimate().min(state.slow.estimate()) as u64)
        }
    }

    pub fn reset(&self) {
        *self.state.lock() = MeterState::new();
    }
}

impl Default for BandwidthMeter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_estimate_before_minimum_bytes() {
        let meter = BandwidthMeter::new();
        meter.add_sample(Duration::from_millis(100), 100_000);
        assert_eq!(meter.bitrate_estimate(), None);
    }

    #[test]
    fn test_small_samples_ignored() {
        let meter = BandwidthMeter::new();
        for _ in 0..20 {
            meter.add_sample(Duration::from_millis(10), 1_000);
        }
        assert_eq!(meter.bitrate_estimate(), None);
    }

    #[test]
    fn test_steady_bandwidth() {
        let meter = BandwidthMeter::new();
        // 250 kB per second = 2 Mbit/s
        for _ in 0..5 {
            meter.add_sample(Duration::from_secs(1), 250_000);
        }
        let estimate = meter.bitrate_estimate().unwrap();
        assert!((1_990_000..=2_010_000).contains(&estimate), "estimate {}", estimate);
    }

    #[test]
    fn test_reset() {
        let meter = BandwidthMeter::new();
        meter.add_sample(Duration::from_secs(1), 500_000);
        assert!(meter.bitrate_estimate().is_some());
        meter.reset();
        assert_eq!(meter.bitrate_estimate(), None);
    }
}
