use std::time::Duration;

use crate::types::RawSample;

/// Baseline and swing of the synthetic rail.
const BASE_VOLTAGE_V: f32 = 12.0;
const SWING_VOLTAGE_V: f32 = 0.5;
const BASE_CURRENT_A: f32 = 2.3;
const SWING_CURRENT_A: f32 = 0.3;

/// Deterministic sinusoidal stand-in for the sensor.
///
/// Voltage swings 11.5–12.5 V and current 2.0–2.6 A, so a healthy synthetic
/// rail classifies as `Normal` with the default thresholds. A new sample is
/// produced at most once per `update_every`; in between the previous one repeats.
#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    update_every: Duration,
    last: Option<(Duration, RawSample)>,
}

impl SimulatedSensor {
    pub fn new(update_every: Duration) -> Self {
        Self {
            update_every,
            last: None,
        }
    }

    /// Pure signal value at `t` since start.
    pub fn signal(t: Duration) -> RawSample {
        let ms = t.as_secs_f64() * 1000.0;
        RawSample::new(
            BASE_VOLTAGE_V + (ms * 0.001).sin() as f32 * SWING_VOLTAGE_V,
            BASE_CURRENT_A + (ms * 0.002).sin() as f32 * SWING_CURRENT_A,
        )
    }

    /// Sample for monotonic time `now`.
    pub fn sample(&mut self, now: Duration) -> RawSample {
        match self.last {
            Some((at, sample)) if now.saturating_sub(at) <= self.update_every => sample,
            _ => {
                let sample = Self::signal(now);
                self.last = Some((now, sample));
                sample
            }
        }
    }
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}
