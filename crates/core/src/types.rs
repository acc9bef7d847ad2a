use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Instantaneous rail reading straight from the sensor or the synthetic generator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub voltage: f32,
    pub current: f32,
}

impl RawSample {
    pub fn new(voltage: f32, current: f32) -> Self {
        Self { voltage, current }
    }
}

/// Smoothed rail reading. `power` is always derived from the filtered
/// voltage and current, never averaged on its own.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FilteredReading {
    pub voltage: f32,
    pub current: f32,
    pub power: f32,
}

impl FilteredReading {
    pub fn new(voltage: f32, current: f32) -> Self {
        Self {
            voltage,
            current,
            power: voltage * current,
        }
    }
}

/// Classified state of the monitored rail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CircuitState {
    Off,
    #[default]
    Normal,
    ShortCircuit,
}

impl CircuitState {
    pub fn is_short(self) -> bool {
        self == CircuitState::ShortCircuit
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Off => write!(f, "Off"),
            CircuitState::Normal => write!(f, "Normal"),
            CircuitState::ShortCircuit => write!(f, "ShortCircuit"),
        }
    }
}

/// Where the samples feeding the filter come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataMode {
    Sensor,
    Simulated,
}

impl fmt::Display for DataMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataMode::Sensor => write!(f, "SENSOR"),
            DataMode::Simulated => write!(f, "SIMULATED"),
        }
    }
}

/// Severity tag written with every short-circuit event.
pub const EVENT_SEVERITY: &str = "HIGH";

/// Debounced short-circuit rising edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortCircuitEvent {
    pub id: Uuid,
    pub reading: FilteredReading,
    pub zero_current_run: u32,
    pub at: DateTime<Utc>,
}

impl ShortCircuitEvent {
    pub fn new(reading: FilteredReading, zero_current_run: u32, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            reading,
            zero_current_run,
            at,
        }
    }

    /// Document stored under `/short_circuit_events/{timestamp}`.
    pub fn to_document(&self, timestamp: &str) -> serde_json::Value {
        serde_json::json!({
            "timestamp": timestamp,
            "voltage": self.reading.voltage,
            "current": self.reading.current,
            "power": self.reading.power,
            "zeroCurrentRun": self.zero_current_run,
            "severity": EVENT_SEVERITY,
        })
    }
}

/// Result of one delivery attempt against the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadOutcome {
    pub success: bool,
    pub latency: Duration,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
}

impl UploadOutcome {
    pub fn succeeded(latency: Duration, timestamp: DateTime<Utc>) -> Self {
        Self {
            success: true,
            latency,
            timestamp,
            error: None,
        }
    }

    pub fn failed(latency: Duration, timestamp: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self {
            success: false,
            latency,
            timestamp,
            error: Some(reason.into()),
        }
    }
}

/// Rolling delivery counters, owned by the reliability controller.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeliveryStats {
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_ready_failures: u32,
    pub last_error: Option<String>,
    pub last_latency: Duration,
    pub mean_latency: Duration,
}

impl DeliveryStats {
    pub fn total(&self) -> u64 {
        self.success_count + self.failure_count
    }

    /// Percentage of successful attempts; `None` before the first attempt.
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.total();
        (total > 0).then(|| self.success_count as f64 * 100.0 / total as f64)
    }
}
