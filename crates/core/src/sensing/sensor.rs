use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::synthetic::SimulatedSensor;
use crate::error::MonitorError;
use crate::types::{DataMode, RawSample};

/// Error type for sensor driver operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SensorError {
    #[error("sensor not present: {0}")]
    Unavailable(String),
    #[error("bus error: {0}")]
    Bus(String),
}

impl From<SensorError> for MonitorError {
    fn from(e: SensorError) -> Self {
        MonitorError::SensorUnavailable(e.to_string())
    }
}

/// Measurement range programmed into the current/voltage sensor. Narrower
/// ranges trade headroom for precision; readings beyond the range's current
/// limit are treated as glitches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CalibrationRange {
    /// 32 V, 2 A.
    #[default]
    Range32V2A,
    /// 32 V, 1 A.
    Range32V1A,
    /// 16 V, 400 mA.
    Range16V400mA,
}

impl CalibrationRange {
    /// Largest plausible current magnitude for this range (A).
    pub fn current_limit_a(self) -> f32 {
        match self {
            CalibrationRange::Range32V2A => 3.2,
            CalibrationRange::Range32V1A => 1.3,
            CalibrationRange::Range16V400mA => 0.5,
        }
    }
}

impl fmt::Display for CalibrationRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationRange::Range32V2A => write!(f, "32V_2A"),
            CalibrationRange::Range32V1A => write!(f, "32V_1A"),
            CalibrationRange::Range16V400mA => write!(f, "16V_400mA"),
        }
    }
}

impl FromStr for CalibrationRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "32v_2a" | "1" => Ok(CalibrationRange::Range32V2A),
            "32v_1a" | "2" => Ok(CalibrationRange::Range32V1A),
            "16v_400ma" | "3" => Ok(CalibrationRange::Range16V400mA),
            other => Err(format!("unknown calibration range: {other}")),
        }
    }
}

/// Hardware current/voltage sensor driver.
pub trait Sensor: Send {
    fn name(&self) -> &str;

    /// Detect the device on its bus.
    fn probe(&mut self) -> Result<(), SensorError>;

    fn calibrate(&mut self, range: CalibrationRange) -> Result<(), SensorError>;

    /// Read load voltage (bus + shunt) and current in amperes.
    fn read_raw(&mut self) -> Result<RawSample, SensorError>;
}

/// One sample plus where it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourcedSample {
    pub sample: RawSample,
    pub mode: DataMode,
}

/// Sample source selected at startup.
pub enum SensorSource {
    /// A probed hardware sensor. Falls back to the synthetic signal on any
    /// tick where the read fails.
    Hardware {
        sensor: Box<dyn Sensor>,
        range: CalibrationRange,
        fallback: SimulatedSensor,
        failing: bool,
    },
    /// No sensor: synthetic data only.
    Simulated(SimulatedSensor),
}

impl fmt::Debug for SensorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorSource::Hardware {
                sensor,
                range,
                failing,
                ..
            } => f
                .debug_struct("Hardware")
                .field("sensor", &sensor.name())
                .field("range", range)
                .field("failing", failing)
                .finish(),
            SensorSource::Simulated(sim) => f.debug_tuple("Simulated").field(sim).finish(),
        }
    }
}

impl SensorSource {
    pub fn hardware(sensor: Box<dyn Sensor>, range: CalibrationRange, sim_update: Duration) -> Self {
        SensorSource::Hardware {
            sensor,
            range,
            fallback: SimulatedSensor::new(sim_update),
            failing: false,
        }
    }

    pub fn simulated(sim_update: Duration) -> Self {
        SensorSource::Simulated(SimulatedSensor::new(sim_update))
    }

    /// Mode the source is configured for (not the mode of the last sample).
    pub fn mode(&self) -> DataMode {
        match self {
            SensorSource::Hardware { .. } => DataMode::Sensor,
            SensorSource::Simulated(_) => DataMode::Simulated,
        }
    }

    /// Current limit to enforce on measured samples, if any.
    pub fn current_limit_a(&self) -> Option<f32> {
        match self {
            SensorSource::Hardware { range, .. } => Some(range.current_limit_a()),
            SensorSource::Simulated(_) => None,
        }
    }

    pub fn read(&mut self, now: Duration) -> SourcedSample {
        match self {
            SensorSource::Hardware {
                sensor,
                fallback,
                failing,
                ..
            } => match sensor.read_raw() {
                Ok(sample) => {
                    if *failing {
                        tracing::info!(sensor = sensor.name(), "sensor readings restored");
                        *failing = false;
                    }
                    SourcedSample {
                        sample,
                        mode: DataMode::Sensor,
                    }
                }
                Err(e) => {
                    if !*failing {
                        let err = MonitorError::from(e);
                        tracing::warn!(error = %err, "sensor read failed, using synthetic data");
                        *failing = true;
                    }
                    SourcedSample {
                        sample: fallback.sample(now),
                        mode: DataMode::Simulated,
                    }
                }
            },
            SensorSource::Simulated(sim) => SourcedSample {
                sample: sim.sample(now),
                mode: DataMode::Simulated,
            },
        }
    }
}

/// Sensor test double replaying a fixed script. When the script runs out the
/// last entry repeats; an empty script reports the sensor as absent.
#[derive(Debug, Clone)]
pub struct ScriptedSensor {
    script: VecDeque<Result<RawSample, SensorError>>,
    last: Option<Result<RawSample, SensorError>>,
    present: bool,
}

impl ScriptedSensor {
    pub fn new(script: impl IntoIterator<Item = RawSample>) -> Self {
        Self {
            script: script.into_iter().map(Ok).collect(),
            last: None,
            present: true,
        }
    }

    /// A sensor that never answers on the bus.
    pub fn absent() -> Self {
        Self {
            script: VecDeque::new(),
            last: None,
            present: false,
        }
    }

    pub fn push(&mut self, entry: Result<RawSample, SensorError>) {
        self.script.push_back(entry);
    }
}

impl Sensor for ScriptedSensor {
    fn name(&self) -> &str {
        "scripted"
    }

    fn probe(&mut self) -> Result<(), SensorError> {
        if self.present {
            Ok(())
        } else {
            Err(SensorError::Unavailable("no device at bus address".into()))
        }
    }

    fn calibrate(&mut self, _range: CalibrationRange) -> Result<(), SensorError> {
        self.probe()
    }

    fn read_raw(&mut self) -> Result<RawSample, SensorError> {
        if !self.present {
            return Err(SensorError::Unavailable("no device at bus address".into()));
        }
        if let Some(next) = self.script.pop_front() {
            self.last = Some(next.clone());
            return next;
        }
        self.last
            .clone()
            .unwrap_or_else(|| Err(SensorError::Bus("script exhausted".into())))
    }
}
