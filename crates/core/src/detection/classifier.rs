use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::config::MonitorCfg;
use crate::types::{CircuitState, FilteredReading, ShortCircuitEvent};

/// Below this voltage (with near-zero current and power) the rail is off.
pub const OFF_VOLTAGE_V: f32 = 0.5;
/// Current magnitude treated as zero (A).
pub const ZERO_CURRENT_A: f32 = 0.001;
/// Below this power (with the other off conditions) the rail is off.
pub const OFF_POWER_W: f32 = 0.1;
/// Minimum voltage for a zero-current reading to count towards the run.
pub const ZERO_RUN_VOLTAGE_V: f32 = 1.0;
/// Consecutive zero-current ticks that classify as a fault.
pub const ZERO_RUN_TICKS: u32 = 3;

/// Fault thresholds. Tunable per installation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub current_a: f32,
    pub voltage_drop_v: f32,
    pub power_w: f32,
}

impl Thresholds {
    pub fn from_cfg(cfg: &MonitorCfg) -> Self {
        Self {
            current_a: cfg.current_threshold_a,
            voltage_drop_v: cfg.voltage_drop_threshold_v,
            power_w: cfg.power_threshold_w,
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from_cfg(&MonitorCfg::default())
    }
}

/// Individual conditions evaluated for one reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FaultFlags {
    pub circuit_off: bool,
    pub current_overload: bool,
    pub voltage_drop: bool,
    pub power_spike: bool,
    pub zero_current_short: bool,
}

impl FaultFlags {
    pub fn any_fault(&self) -> bool {
        self.current_overload || self.voltage_drop || self.power_spike || self.zero_current_short
    }

    /// Off dominates every fault flag.
    pub fn state(&self) -> CircuitState {
        if self.circuit_off {
            CircuitState::Off
        } else if self.any_fault() {
            CircuitState::ShortCircuit
        } else {
            CircuitState::Normal
        }
    }
}

/// Next value of the zero-current run counter.
pub fn next_zero_run(reading: &FilteredReading, run: u32) -> u32 {
    if reading.current.abs() < ZERO_CURRENT_A && reading.voltage > ZERO_RUN_VOLTAGE_V {
        run.saturating_add(1)
    } else {
        0
    }
}

/// Evaluate every condition for a reading given the already-updated run counter.
pub fn evaluate(reading: &FilteredReading, zero_run: u32, t: &Thresholds) -> FaultFlags {
    let v = reading.voltage;
    let i = reading.current.abs();
    FaultFlags {
        circuit_off: v < OFF_VOLTAGE_V && i < ZERO_CURRENT_A && reading.power < OFF_POWER_W,
        current_overload: i > t.current_a,
        voltage_drop: v < t.voltage_drop_v && v > OFF_VOLTAGE_V,
        power_spike: reading.power > t.power_w,
        zero_current_short: zero_run >= ZERO_RUN_TICKS && v > ZERO_RUN_VOLTAGE_V,
    }
}

/// Outcome of classifying one reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub state: CircuitState,
    pub flags: FaultFlags,
    pub zero_current_run: u32,
    /// Set only on a debounced rising edge into `ShortCircuit`.
    pub event: Option<ShortCircuitEvent>,
}

/// Short-circuit classifier with zero-current run tracking and event cooldown.
pub struct AnomalyClassifier {
    thresholds: Thresholds,
    cooldown: Duration,
    clock: Arc<dyn Clock>,
    zero_current_run: u32,
    last_event_at: Option<Duration>,
    was_off: bool,
}

impl AnomalyClassifier {
    pub fn new(thresholds: Thresholds, cooldown: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            thresholds,
            cooldown,
            clock,
            zero_current_run: 0,
            last_event_at: None,
            was_off: false,
        }
    }

    pub fn from_cfg(cfg: &MonitorCfg, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            Thresholds::from_cfg(cfg),
            Duration::from_millis(cfg.alert_cooldown_ms),
            clock,
        )
    }

    /// Classify `reading` given the state reported for the previous tick.
    pub fn classify(&mut self, reading: FilteredReading, prev: CircuitState) -> Classification {
        self.zero_current_run = next_zero_run(&reading, self.zero_current_run);
        let flags = evaluate(&reading, self.zero_current_run, &self.thresholds);
        let state = flags.state();

        if flags.circuit_off != self.was_off {
            if flags.circuit_off {
                tracing::info!(voltage = reading.voltage, "circuit off, no power detected");
            } else {
                tracing::info!(voltage = reading.voltage, "circuit on, power detected");
            }
            self.was_off = flags.circuit_off;
        }

        let event = if state.is_short() && !prev.is_short() && self.cooldown_elapsed() {
            let now = self.clock.monotonic();
            self.last_event_at = Some(now);
            tracing::warn!(
                voltage = reading.voltage,
                current = reading.current,
                power = reading.power,
                zero_current_run = self.zero_current_run,
                ?flags,
                "short circuit detected"
            );
            Some(ShortCircuitEvent::new(reading, self.zero_current_run, self.clock.wall()))
        } else {
            None
        };

        Classification {
            state,
            flags,
            zero_current_run: self.zero_current_run,
            event,
        }
    }

    fn cooldown_elapsed(&self) -> bool {
        match self.last_event_at {
            Some(at) => self.clock.monotonic().saturating_sub(at) >= self.cooldown,
            None => true,
        }
    }

    pub fn zero_current_run(&self) -> u32 {
        self.zero_current_run
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn reading(v: f32, i: f32) -> FilteredReading {
        FilteredReading::new(v, i)
    }

    fn exact(v: f32, i: f32, p: f32) -> FilteredReading {
        FilteredReading {
            voltage: v,
            current: i,
            power: p,
        }
    }

    fn classifier() -> (AnomalyClassifier, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_at(1_700_000_000));
        let c = AnomalyClassifier::new(Thresholds::default(), Duration::from_millis(2000), clock.clone());
        (c, clock)
    }

    #[test]
    fn healthy_rail_is_normal() {
        let (mut c, _) = classifier();
        let out = c.classify(reading(12.0, 2.3), CircuitState::Normal);
        assert_eq!(out.state, CircuitState::Normal);
        assert!(out.event.is_none());
    }

    #[test]
    fn off_takes_precedence() {
        let (mut c, _) = classifier();
        let out = c.classify(exact(0.2, 0.0002, 0.02), CircuitState::Normal);
        assert_eq!(out.state, CircuitState::Off);
        assert!(out.event.is_none());
    }

    #[test]
    fn off_boundaries_are_exclusive() {
        let t = Thresholds::default();
        // each condition exactly at its edge breaks the off check
        assert!(!evaluate(&exact(0.5, 0.0, 0.0), 0, &t).circuit_off);
        assert!(!evaluate(&exact(0.2, 0.001, 0.0), 0, &t).circuit_off);
        assert!(!evaluate(&exact(0.2, 0.0, 0.1), 0, &t).circuit_off);
        assert!(evaluate(&exact(0.499, 0.0009, 0.099), 0, &t).circuit_off);
        assert!(evaluate(&exact(0.2, -0.0009, 0.0), 0, &t).circuit_off);
    }

    #[test]
    fn exactly_half_volt_is_not_off_and_not_a_drop() {
        let t = Thresholds::default();
        let flags = evaluate(&exact(0.5, 0.0, 0.0), 0, &t);
        assert!(!flags.circuit_off);
        assert!(!flags.voltage_drop);
        assert_eq!(flags.state(), CircuitState::Normal);
    }

    #[test]
    fn low_voltage_under_load_is_short() {
        // between the off floor and the drop threshold
        let (mut c, _) = classifier();
        let out = c.classify(reading(5.0, 0.5), CircuitState::Normal);
        assert!(out.flags.voltage_drop);
        assert_eq!(out.state, CircuitState::ShortCircuit);
    }

    #[test]
    fn overload_is_short() {
        let (mut c, _) = classifier();
        let out = c.classify(reading(12.0, 3.5), CircuitState::Normal);
        assert!(out.flags.current_overload);
        assert_eq!(out.state, CircuitState::ShortCircuit);
        assert!(out.event.is_some());
    }

    #[test]
    fn negative_overload_is_short() {
        let (mut c, _) = classifier();
        let out = c.classify(reading(12.0, -3.5), CircuitState::Normal);
        assert!(out.flags.current_overload);
    }

    #[test]
    fn current_at_threshold_is_not_overload() {
        let t = Thresholds::default();
        assert!(!evaluate(&reading(12.0, 3.0), 0, &t).current_overload);
    }

    #[test]
    fn power_spike_is_short() {
        let t = Thresholds::default();
        let flags = evaluate(&reading(25.0, 2.5), 0, &t);
        assert!(flags.power_spike);
        assert!(!flags.current_overload);
        assert_eq!(flags.state(), CircuitState::ShortCircuit);
    }

    #[test]
    fn zero_current_run_trips_on_third_tick() {
        // 5 V rail: drop threshold configured below the nominal voltage
        let clock = Arc::new(ManualClock::new());
        let thresholds = Thresholds {
            voltage_drop_v: 4.0,
            ..Thresholds::default()
        };
        let mut c = AnomalyClassifier::new(thresholds, Duration::from_millis(2000), clock);
        let mut prev = CircuitState::Normal;
        let states: Vec<_> = (0..3)
            .map(|_| {
                let out = c.classify(reading(5.0, 0.0), prev);
                prev = out.state;
                (out.state, out.zero_current_run, out.event.is_some())
            })
            .collect();
        assert_eq!(
            states,
            vec![
                (CircuitState::Normal, 1, false),
                (CircuitState::Normal, 2, false),
                (CircuitState::ShortCircuit, 3, true),
            ]
        );
    }

    #[test]
    fn zero_current_flag_progression_with_default_thresholds() {
        let (mut c, _) = classifier();
        let flags: Vec<_> = (0..3)
            .map(|_| c.classify(reading(5.0, 0.0), CircuitState::Normal).flags.zero_current_short)
            .collect();
        assert_eq!(flags, vec![false, false, true]);
    }

    #[test]
    fn zero_current_run_resets_when_current_returns() {
        let (mut c, _) = classifier();
        c.classify(reading(12.0, 0.0), CircuitState::Normal);
        c.classify(reading(12.0, 0.0), CircuitState::Normal);
        let out = c.classify(reading(12.0, 1.0), CircuitState::Normal);
        assert_eq!(out.zero_current_run, 0);
        let out = c.classify(reading(12.0, 0.0), CircuitState::Normal);
        assert_eq!(out.zero_current_run, 1);
        assert!(!out.flags.zero_current_short);
    }

    #[test]
    fn zero_current_at_low_voltage_does_not_count() {
        let (mut c, _) = classifier();
        for _ in 0..5 {
            c.classify(reading(0.8, 0.0), CircuitState::Normal);
        }
        assert_eq!(c.zero_current_run(), 0);
    }

    #[test]
    fn zero_current_short_on_healthy_voltage() {
        let (mut c, _) = classifier();
        let mut last = None;
        for _ in 0..3 {
            last = Some(c.classify(reading(12.0, 0.0), CircuitState::Normal));
        }
        let out = last.unwrap();
        assert!(out.flags.zero_current_short);
        assert!(!out.flags.voltage_drop);
        assert_eq!(out.state, CircuitState::ShortCircuit);
    }

    #[test]
    fn event_only_on_rising_edge() {
        let (mut c, clock) = classifier();
        let first = c.classify(reading(12.0, 3.5), CircuitState::Normal);
        assert!(first.event.is_some());
        clock.advance_ms(5000);
        // sustained fault, previous state already short
        let again = c.classify(reading(12.0, 3.5), CircuitState::ShortCircuit);
        assert_eq!(again.state, CircuitState::ShortCircuit);
        assert!(again.event.is_none());
    }

    #[test]
    fn rising_edge_from_off_emits() {
        let (mut c, _) = classifier();
        let out = c.classify(reading(12.0, 3.5), CircuitState::Off);
        assert!(out.event.is_some());
    }

    #[test]
    fn debounce_suppresses_edges_within_cooldown() {
        let (mut c, clock) = classifier();
        assert!(c.classify(reading(12.0, 3.5), CircuitState::Normal).event.is_some());
        clock.advance_ms(500);
        assert!(c.classify(reading(12.0, 2.0), CircuitState::ShortCircuit).event.is_none());
        clock.advance_ms(500);
        // second rising edge 1000 ms after the first event
        let out = c.classify(reading(12.0, 3.5), CircuitState::Normal);
        assert_eq!(out.state, CircuitState::ShortCircuit);
        assert!(out.event.is_none());
        clock.advance_ms(1000);
        // third edge exactly at the cooldown
        let out = c.classify(reading(12.0, 3.5), CircuitState::Normal);
        assert!(out.event.is_some());
    }

    #[test]
    fn event_carries_reading_and_run_snapshot() {
        let (mut c, clock) = classifier();
        for _ in 0..2 {
            c.classify(reading(9.0, 0.0), CircuitState::Normal);
        }
        let out = c.classify(reading(9.0, 0.0), CircuitState::Normal);
        let evt = out.event.expect("rising edge");
        assert_eq!(evt.reading, reading(9.0, 0.0));
        assert_eq!(evt.zero_current_run, 3);
        assert_eq!(evt.at, clock.wall());
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let (mut a, _) = classifier();
        let (mut b, _) = classifier();
        let inputs = [
            (reading(12.0, 2.0), CircuitState::Normal),
            (reading(12.0, 0.0), CircuitState::Normal),
            (reading(0.1, 0.0), CircuitState::Normal),
            (reading(6.0, 1.0), CircuitState::Off),
            (reading(12.0, 4.0), CircuitState::ShortCircuit),
        ];
        for (r, prev) in inputs {
            let x = a.classify(r, prev);
            let y = b.classify(r, prev);
            assert_eq!(x.state, y.state);
            assert_eq!(x.flags, y.flags);
            assert_eq!(x.zero_current_run, y.zero_current_run);
            assert_eq!(x.event.is_some(), y.event.is_some());
        }
    }
}
