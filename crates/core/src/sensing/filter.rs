use crate::error::MonitorError;
use crate::types::{FilteredReading, RawSample};

/// Accepted raw voltage range (V).
pub const VOLTAGE_MIN_V: f32 = -1.0;
pub const VOLTAGE_MAX_V: f32 = 50.0;
/// Largest accepted raw current magnitude (A).
pub const CURRENT_MAX_A: f32 = 20.0;

/// Moving-average filter over the last `N` accepted samples.
///
/// Until the ring wraps for the first time the output is the latest accepted
/// sample unfiltered; from then on it is the unweighted mean of the whole ring.
/// Implausible or non-finite inputs are replaced by the last filtered value
/// before insertion, so the output is always finite.
#[derive(Debug, Clone)]
pub struct SampleFilter {
    voltages: Vec<f32>,
    currents: Vec<f32>,
    pos: usize,
    full: bool,
    last: FilteredReading,
}

impl SampleFilter {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            voltages: vec![0.0; window],
            currents: vec![0.0; window],
            pos: 0,
            full: false,
            last: FilteredReading::default(),
        }
    }

    /// Feed one raw sample and return the new filtered reading.
    pub fn observe(&mut self, raw: RawSample) -> FilteredReading {
        let accepted = self.accept(raw);

        self.voltages[self.pos] = accepted.voltage;
        self.currents[self.pos] = accepted.current;
        self.pos = (self.pos + 1) % self.capacity();
        if self.pos == 0 {
            self.full = true;
        }

        let reading = if self.full {
            let n = self.capacity() as f32;
            FilteredReading::new(
                self.voltages.iter().sum::<f32>() / n,
                self.currents.iter().sum::<f32>() / n,
            )
        } else {
            FilteredReading::new(accepted.voltage, accepted.current)
        };
        self.last = reading;
        reading
    }

    /// Feed a measured sample whose current must also respect the sensor's
    /// calibrated range; out-of-range current is replaced before validation.
    pub fn observe_measured(&mut self, mut raw: RawSample, current_limit_a: f32) -> FilteredReading {
        if raw.current.abs() > current_limit_a {
            tracing::warn!(
                current = raw.current,
                limit = current_limit_a,
                "current beyond calibrated range, holding last value"
            );
            raw.current = self.last.current;
        }
        self.observe(raw)
    }

    /// Validate a raw sample against the plausibility limits.
    fn accept(&self, raw: RawSample) -> RawSample {
        let mut out = raw;
        if !raw.voltage.is_finite() || !(VOLTAGE_MIN_V..=VOLTAGE_MAX_V).contains(&raw.voltage) {
            out.voltage = self.last.voltage;
            let e = MonitorError::SensorReadingInvalid {
                field: "voltage",
                value: raw.voltage,
                substitute: out.voltage,
            };
            tracing::warn!(error = %e, "invalid voltage reading");
        }
        if !raw.current.is_finite() || raw.current.abs() > CURRENT_MAX_A {
            out.current = self.last.current;
            let e = MonitorError::SensorReadingInvalid {
                field: "current",
                value: raw.current,
                substitute: out.current,
            };
            tracing::warn!(error = %e, "invalid current reading");
        }
        out
    }

    pub fn capacity(&self) -> usize {
        self.voltages.len()
    }

    /// Number of valid slots in the ring.
    pub fn filled(&self) -> usize {
        if self.full { self.capacity() } else { self.pos }
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn last(&self) -> FilteredReading {
        self.last
    }
}

impl Default for SampleFilter {
    fn default() -> Self {
        Self::new(10)
    }
}
