use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::loop_control::IntervalGate;
use super::shutdown::ShutdownGuard;
use crate::clock::Clock;
use crate::config::MonitorCfg;
use crate::delivery::{SuccessRateReport, TelemetryUploader, UploadReliabilityController};
use crate::detection::AnomalyClassifier;
use crate::display::{DisplayMetrics, StatusFrame, StatusSink, StoreLink};
use crate::lifecycle::{LifecyclePhase, RetryPolicy};
use crate::network::{Network, NetworkCredentials};
use crate::sensing::{SampleFilter, SensorSource};
use crate::types::{
    CircuitState, DataMode, DeliveryStats, FilteredReading, ShortCircuitEvent, UploadOutcome,
};

/// Collaborators handed to the monitor once startup has finished.
pub struct MonitorParts {
    pub source: SensorSource,
    pub uploader: TelemetryUploader,
    pub network: Arc<dyn Network>,
    pub credentials: NetworkCredentials,
    pub display: Box<dyn StatusSink>,
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub mode: DataMode,
    pub reading: FilteredReading,
    pub state: CircuitState,
    pub event: Option<ShortCircuitEvent>,
    pub event_upload: Option<UploadOutcome>,
    pub telemetry: Option<UploadOutcome>,
    pub stats_report: Option<SuccessRateReport>,
    /// Set when the store session was rebuilt this tick; the value is
    /// whether the rebuild succeeded.
    pub reinitialized: Option<bool>,
    pub displayed: bool,
    /// Set when the link was down this tick; the value is whether it came back.
    pub reconnected: Option<bool>,
}

/// Fixed-period monitoring loop: sample, filter, classify, deliver.
pub struct Monitor {
    cfg: Arc<MonitorCfg>,
    clock: Arc<dyn Clock>,
    shutdown: ShutdownGuard,

    source: SensorSource,
    filter: SampleFilter,
    classifier: AnomalyClassifier,
    state: CircuitState,

    uploader: TelemetryUploader,
    reliability: UploadReliabilityController,
    last_upload_ok: Option<bool>,

    network: Arc<dyn Network>,
    credentials: NetworkCredentials,
    reconnect: RetryPolicy,

    display: Box<dyn StatusSink>,
    telemetry_gate: IntervalGate,
    display_gate: IntervalGate,
    debug_gate: IntervalGate,
    link_gate: IntervalGate,

    tick_count: u64,
}

impl Monitor {
    pub fn new(cfg: Arc<MonitorCfg>, clock: Arc<dyn Clock>, parts: MonitorParts) -> Self {
        let now = clock.monotonic();
        let MonitorParts {
            source,
            uploader,
            network,
            credentials,
            display,
        } = parts;
        Self {
            filter: SampleFilter::new(cfg.filter_window),
            classifier: AnomalyClassifier::from_cfg(&cfg, clock.clone()),
            state: CircuitState::default(),
            reliability: UploadReliabilityController::from_cfg(&cfg),
            last_upload_ok: None,
            reconnect: RetryPolicy::from_cfg(&cfg),
            telemetry_gate: IntervalGate::from_millis(cfg.telemetry_interval_ms, now),
            display_gate: IntervalGate::from_millis(cfg.display_interval_ms, now),
            debug_gate: IntervalGate::from_millis(cfg.debug_interval_ms, now),
            link_gate: IntervalGate::from_millis(cfg.link_check_ms, now),
            tick_count: 0,
            shutdown: ShutdownGuard::new(),
            source,
            uploader,
            network,
            credentials,
            display,
            cfg,
            clock,
        }
    }

    /// Share cancellation with an outside token instead of owning one.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = ShutdownGuard::with_token(token);
        self
    }

    pub fn token(&self) -> CancellationToken {
        self.shutdown.token()
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn reading(&self) -> FilteredReading {
        self.filter.last()
    }

    pub fn delivery_stats(&self) -> DeliveryStats {
        self.reliability.report()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Tick until cancelled. Cancellation is checked between ticks; a tick in
    /// progress always completes.
    pub async fn run(&mut self) {
        self.shutdown.spawn_signal_listener();
        let token = self.shutdown.token();
        let pause = self.cfg.tick_pause();
        tracing::info!(
            pause_ms = pause.as_millis() as u64,
            telemetry_ms = self.telemetry_gate.every().as_millis() as u64,
            mode = %self.source.mode(),
            "monitor loop started"
        );

        loop {
            if token.is_cancelled() {
                break;
            }
            self.tick().await;
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(pause) => {},
            }
        }

        let stats = self.reliability.report();
        tracing::info!(
            tick_count = self.tick_count,
            delivered = stats.success_count,
            failed = stats.failure_count,
            "shutdown signal received, monitor loop stopped"
        );
    }

    pub async fn tick(&mut self) -> TickReport {
        self.tick_count += 1;
        let span = tracing::info_span!("tick", n = self.tick_count);
        self.tick_inner().instrument(span).await
    }

    async fn tick_inner(&mut self) -> TickReport {
        let now = self.clock.monotonic();

        // Sample and filter
        let sourced = self.source.read(now);
        let reading = match (sourced.mode, self.source.current_limit_a()) {
            (DataMode::Sensor, Some(limit)) => self.filter.observe_measured(sourced.sample, limit),
            _ => self.filter.observe(sourced.sample),
        };

        // Classify
        let classification = self.classifier.classify(reading, self.state);
        self.state = classification.state;

        let mut report = TickReport {
            tick: self.tick_count,
            mode: sourced.mode,
            reading,
            state: self.state,
            event: classification.event,
            event_upload: None,
            telemetry: None,
            stats_report: None,
            reinitialized: None,
            displayed: false,
            reconnected: None,
        };

        // Event delivery
        if let Some(event) = report.event.clone() {
            let outcome = self.uploader.upload_event(&event).await;
            self.deliver(&outcome, &mut report).await;
            report.event_upload = Some(outcome);
        }

        // Periodic telemetry
        if self.telemetry_gate.due(now) {
            let outcome = self.uploader.upload_cycle(reading, self.state).await;
            self.last_upload_ok = Some(outcome.success);
            self.deliver(&outcome, &mut report).await;
            report.telemetry = Some(outcome);
        }

        if self.display_gate.due(now) {
            let frame = StatusFrame::monitoring(self.metrics(reading, sourced.mode));
            self.display.render(&frame);
            report.displayed = true;
        }

        if self.debug_gate.due(now) {
            tracing::info!(
                mode = %sourced.mode,
                voltage = reading.voltage,
                current = reading.current,
                power = reading.power,
                state = %self.state,
                "sensor status"
            );
        }

        // Link state: cached every tick, re-observed on the link check interval.
        let link_up = if self.link_gate.due(now) {
            self.network.check_link().await
        } else {
            self.network.is_connected()
        };
        if !link_up {
            report.reconnected = Some(self.reconnect_network().await);
        }

        report
    }

    /// Feed one outcome to the reliability controller and rebuild the store
    /// session when it asks for it.
    async fn deliver(&mut self, outcome: &UploadOutcome, report: &mut TickReport) {
        if let Some(stats) = self.reliability.record_attempt(outcome) {
            report.stats_report = Some(stats);
        }
        if self.reliability.should_reinitialize() {
            let ok = match self.uploader.reinitialize().await {
                Ok(()) => {
                    tracing::info!(store = self.uploader.store().name(), "store session rebuilt");
                    true
                }
                Err(e) => {
                    tracing::warn!(store = self.uploader.store().name(), error = %e, "store session rebuild failed");
                    false
                }
            };
            report.reinitialized = Some(ok);
        }
    }

    async fn reconnect_network(&mut self) -> bool {
        tracing::warn!(network = %self.credentials.name, "network link lost, reconnecting");
        self.display.render(&StatusFrame::lifecycle(
            LifecyclePhase::Monitoring,
            "Network reconnecting...",
        ));
        let network = self.network.as_ref();
        let credentials = &self.credentials;
        match self
            .reconnect
            .run(move |_| network.connect(credentials))
            .await
        {
            Ok(((), attempts)) => {
                tracing::info!(attempts, "network link restored");
                true
            }
            Err((e, attempts)) => {
                tracing::error!(attempts, error = %e, "network reconnection failed, retrying next tick");
                false
            }
        }
    }

    fn metrics(&self, reading: FilteredReading, mode: DataMode) -> DisplayMetrics {
        let store = if !self.uploader.is_ready() {
            StoreLink::Disconnected
        } else if self.last_upload_ok == Some(false) {
            StoreLink::Error
        } else {
            StoreLink::Ok {
                uploads: self.reliability.report().success_count,
            }
        };
        DisplayMetrics {
            reading,
            mode,
            store,
            short_circuit: self.state.is_short(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use circuitwatch_store::MemoryStore;

    use super::*;
    use crate::clock::ManualClock;
    use crate::display::RecordingDisplay;
    use crate::network::ScriptedNetwork;
    use crate::sensing::{CalibrationRange, ScriptedSensor};
    use crate::types::RawSample;

    struct Rig {
        clock: Arc<ManualClock>,
        store: Arc<MemoryStore>,
        network: Arc<ScriptedNetwork>,
        display: RecordingDisplay,
    }

    fn monitor(cfg: MonitorCfg, samples: Vec<RawSample>) -> (Monitor, Rig) {
        let clock = Arc::new(ManualClock::starting_at(1_700_000_000));
        let store = Arc::new(MemoryStore::ready());
        let network = Arc::new(ScriptedNetwork::new());
        let display = RecordingDisplay::new();
        let uploader = TelemetryUploader::new(store.clone(), clock.clone(), cfg.store_timeout());
        let parts = MonitorParts {
            source: SensorSource::hardware(
                Box::new(ScriptedSensor::new(samples)),
                CalibrationRange::Range32V2A,
                Duration::from_millis(100),
            ),
            uploader,
            network: network.clone(),
            credentials: NetworkCredentials::default(),
            display: Box::new(display.clone()),
        };
        let m = Monitor::new(Arc::new(cfg), clock.clone(), parts);
        (
            m,
            Rig {
                clock,
                store,
                network,
                display,
            },
        )
    }

    async fn connect(rig: &Rig) {
        rig.network
            .connect(&NetworkCredentials::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn first_tick_classifies_without_uploading() {
        let (mut m, rig) = monitor(MonitorCfg::default(), vec![RawSample::new(12.0, 1.0)]);
        connect(&rig).await;
        let r = m.tick().await;
        assert_eq!(r.tick, 1);
        assert_eq!(r.mode, DataMode::Sensor);
        assert_eq!(r.state, CircuitState::Normal);
        assert_eq!(r.reading, FilteredReading::new(12.0, 1.0));
        assert!(r.telemetry.is_none());
        assert!(!r.displayed);
        assert_eq!(r.reconnected, None);
        assert_eq!(rig.store.write_count(), 0);
    }

    #[tokio::test]
    async fn telemetry_and_display_follow_their_intervals() {
        let (mut m, rig) = monitor(MonitorCfg::default(), vec![RawSample::new(12.0, 1.0)]);
        connect(&rig).await;
        let mut telemetry_ticks = Vec::new();
        let mut display_ticks = 0;
        for _ in 0..201 {
            let r = m.tick().await;
            if r.telemetry.is_some() {
                telemetry_ticks.push(r.tick);
            }
            if r.displayed {
                display_ticks += 1;
            }
            rig.clock.advance_ms(50);
        }
        // 50 ms ticks: telemetry at 5 s and 10 s, display every second.
        assert_eq!(telemetry_ticks, vec![101, 201]);
        assert_eq!(display_ticks, 10);
        assert_eq!(rig.store.paths_under("/sensor_data").len(), 2);
        assert_eq!(m.delivery_stats().success_count, 2);
        let last = rig.display.frames().pop().unwrap();
        assert_eq!(
            last.metrics.unwrap().store,
            StoreLink::Ok { uploads: 2 }
        );
    }

    #[tokio::test]
    async fn out_of_range_current_is_held() {
        let samples = vec![RawSample::new(12.0, 1.0), RawSample::new(12.0, 5.0)];
        let cfg = MonitorCfg {
            filter_window: 1,
            ..MonitorCfg::default()
        };
        let (mut m, rig) = monitor(cfg, samples);
        connect(&rig).await;
        assert_eq!(m.tick().await.state, CircuitState::Normal);
        rig.clock.advance_ms(50);
        // 5 A is beyond the 3.2 A range limit, so current is held at 1 A.
        let r = m.tick().await;
        assert_eq!(r.state, CircuitState::Normal);
        assert!(r.event.is_none());
        assert_eq!(rig.store.paths_under("/short_circuit_events").len(), 0);
    }

    #[tokio::test]
    async fn overload_within_range_emits_event() {
        let samples = vec![RawSample::new(12.0, 1.0), RawSample::new(12.0, 3.1)];
        let cfg = MonitorCfg {
            filter_window: 1,
            ..MonitorCfg::default()
        };
        let (mut m, rig) = monitor(cfg, samples);
        connect(&rig).await;
        m.tick().await;
        rig.clock.advance_ms(50);
        let r = m.tick().await;
        assert_eq!(r.state, CircuitState::ShortCircuit);
        assert!(r.event.is_some());
        assert!(r.event_upload.as_ref().unwrap().success);
        assert_eq!(rig.store.paths_under("/short_circuit_events").len(), 1);
        // Sustained fault: no second event.
        rig.clock.advance_ms(3000);
        let r = m.tick().await;
        assert_eq!(r.state, CircuitState::ShortCircuit);
        assert!(r.event.is_none());
        assert_eq!(m.delivery_stats().success_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn lost_link_is_reconnected_in_tick() {
        let (mut m, rig) = monitor(MonitorCfg::default(), vec![RawSample::new(12.0, 1.0)]);
        connect(&rig).await;
        rig.network.drop_link();
        rig.network.push(Err(crate::network::NetworkError::LinkDown("down".into())));
        let r = m.tick().await;
        assert_eq!(r.reconnected, Some(true));
        assert!(rig.network.is_connected());
        assert!(
            rig.display
                .frames()
                .iter()
                .any(|f| f.message.as_deref() == Some("Network reconnecting..."))
        );
        assert_eq!(m.tick().await.reconnected, None);
    }

    #[tokio::test(start_paused = true)]
    async fn link_check_detects_lost_link() {
        let (mut m, rig) = monitor(MonitorCfg::default(), vec![RawSample::new(12.0, 1.0)]);
        connect(&rig).await;
        rig.network.lose_link_on_next_check();

        // Between checks the cached state still says connected.
        assert_eq!(m.tick().await.reconnected, None);
        assert_eq!(rig.network.checks(), 0);

        rig.clock.advance_ms(5000);
        let r = m.tick().await;
        assert_eq!(r.reconnected, Some(true));
        assert_eq!(rig.network.checks(), 1);
        assert_eq!(rig.network.attempts(), 2);
        assert!(rig.network.is_connected());
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let token = CancellationToken::new();
        let (m, rig) = monitor(MonitorCfg::default(), vec![RawSample::new(12.0, 1.0)]);
        connect(&rig).await;
        let mut m = m.with_shutdown(token.clone());
        token.cancel();
        m.run().await;
        assert_eq!(m.tick_count(), 0);
    }
}
