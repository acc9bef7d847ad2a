//! Filter → classifier pipeline tests, driven by a manual clock.

use std::sync::Arc;
use std::time::Duration;

use circuitwatch_core::clock::ManualClock;
use circuitwatch_core::detection::{AnomalyClassifier, Thresholds};
use circuitwatch_core::sensing::SampleFilter;
use circuitwatch_core::types::{CircuitState, FilteredReading, RawSample};

struct Pipeline {
    clock: Arc<ManualClock>,
    filter: SampleFilter,
    classifier: AnomalyClassifier,
    state: CircuitState,
}

impl Pipeline {
    fn new(window: usize) -> Self {
        let clock = Arc::new(ManualClock::starting_at(1_700_000_000));
        Self {
            classifier: AnomalyClassifier::new(
                Thresholds::default(),
                Duration::from_millis(2000),
                clock.clone(),
            ),
            clock,
            filter: SampleFilter::new(window),
            state: CircuitState::Normal,
        }
    }

    /// One 50 ms tick. Returns the state and whether an event fired.
    fn step(&mut self, v: f32, i: f32) -> (CircuitState, bool) {
        let reading = self.filter.observe(RawSample::new(v, i));
        let c = self.classifier.classify(reading, self.state);
        self.state = c.state;
        self.clock.advance_ms(50);
        (c.state, c.event.is_some())
    }
}

#[test]
fn healthy_rail_stays_normal() {
    let mut p = Pipeline::new(10);
    for _ in 0..50 {
        assert_eq!(p.step(12.0, 2.5), (CircuitState::Normal, false));
    }
    assert_eq!(p.filter.last(), FilteredReading::new(12.0, 2.5));
}

#[test]
fn filter_smooths_single_spike() {
    let mut p = Pipeline::new(10);
    for _ in 0..10 {
        p.step(12.0, 1.0);
    }
    // One 12 A sample in a full window of 1 A raises the mean to 2.1 A.
    let (state, event) = p.step(12.0, 12.0);
    assert_eq!(state, CircuitState::Normal);
    assert!(!event);
    assert!((p.filter.last().current - 2.1).abs() < 1e-4);
}

#[test]
fn sustained_overload_trips_once_window_shifts() {
    let mut p = Pipeline::new(10);
    for _ in 0..10 {
        p.step(12.0, 1.0);
    }
    let mut events = 0;
    let mut first_short = None;
    for k in 1..=10 {
        let (state, event) = p.step(12.0, 4.0);
        if event {
            events += 1;
        }
        if state == CircuitState::ShortCircuit && first_short.is_none() {
            first_short = Some(k);
        }
    }
    // Mean exceeds 3 A once seven of ten slots hold 4 A (3.1 A).
    assert_eq!(first_short, Some(7));
    assert_eq!(events, 1);
}

#[test]
fn unpowered_rail_is_off_not_short() {
    let mut p = Pipeline::new(1);
    assert_eq!(p.step(12.0, 1.0).0, CircuitState::Normal);
    for _ in 0..5 {
        assert_eq!(p.step(0.0, 0.0), (CircuitState::Off, false));
    }
    assert_eq!(p.step(12.0, 1.0).0, CircuitState::Normal);
}

#[test]
fn flapping_fault_is_debounced() {
    let mut p = Pipeline::new(1);
    let mut events = Vec::new();
    // Fault toggles every tick (50 ms) for 4.5 s.
    for k in 0..90 {
        let current = if k % 2 == 0 { 1.0 } else { 5.0 };
        let (_, event) = p.step(12.0, current);
        if event {
            events.push(k);
        }
    }
    // First rising edge at tick 1 (t = 50 ms); the cooldown allows the next
    // edge at or after t = 2050 ms (tick 41) and then t = 4050 ms (tick 81).
    assert_eq!(events, vec![1, 41, 81]);
}

#[test]
fn invalid_samples_do_not_reach_classifier() {
    let mut p = Pipeline::new(1);
    p.step(12.0, 1.0);
    // Out-of-range voltage and NaN current are replaced with the last good values.
    assert_eq!(p.step(80.0, f32::NAN), (CircuitState::Normal, false));
    assert_eq!(p.filter.last(), FilteredReading::new(12.0, 1.0));
}
