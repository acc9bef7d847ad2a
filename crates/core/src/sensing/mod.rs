mod filter;
mod sensor;
mod synthetic;

pub use filter::{CURRENT_MAX_A, SampleFilter, VOLTAGE_MAX_V, VOLTAGE_MIN_V};
pub use sensor::{CalibrationRange, ScriptedSensor, Sensor, SensorError, SensorSource, SourcedSample};
pub use synthetic::SimulatedSensor;
