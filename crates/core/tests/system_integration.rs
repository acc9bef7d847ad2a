//! Startup through monitoring with in-memory collaborators and paused time.

use std::sync::Arc;
use std::time::Duration;

use circuitwatch_core::clock::{Clock, SystemClock};
use circuitwatch_core::config::MonitorCfg;
use circuitwatch_core::delivery::TelemetryUploader;
use circuitwatch_core::display::{RecordingDisplay, StatusSink};
use circuitwatch_core::error::StartupError;
use circuitwatch_core::lifecycle::{LifecyclePhase, StartupDeps, boot};
use circuitwatch_core::network::{NetworkCredentials, ScriptedNetwork};
use circuitwatch_core::runtime::{Monitor, MonitorParts};
use circuitwatch_core::sensing::ScriptedSensor;
use circuitwatch_core::types::{CircuitState, DataMode, RawSample};
use circuitwatch_store::MemoryStore;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn boot_then_monitor_delivers_telemetry() {
    let cfg = Arc::new(MonitorCfg::default());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let store = Arc::new(MemoryStore::new());
    let network = Arc::new(ScriptedNetwork::failing_first(2));
    let credentials = NetworkCredentials::new("bench", None);
    let uploader = TelemetryUploader::new(store.clone(), clock.clone(), cfg.store_timeout());
    let recorder = RecordingDisplay::new();
    let mut display: Box<dyn StatusSink> = Box::new(recorder.clone());

    let report = boot(
        &cfg,
        clock.as_ref(),
        StartupDeps {
            network: network.as_ref(),
            credentials: &credentials,
            sensor: Some(Box::new(ScriptedSensor::new([RawSample::new(12.0, 1.5)]))),
            uploader: &uploader,
            display: display.as_mut(),
        },
    )
    .await
    .unwrap();
    assert_eq!(report.network_attempts, 3);
    assert!(report.machine.is_monitoring());
    assert!(report.probe.passed());

    let token = CancellationToken::new();
    let mut monitor = Monitor::new(
        cfg.clone(),
        clock,
        MonitorParts {
            source: report.source,
            uploader,
            network,
            credentials,
            display,
        },
    )
    .with_shutdown(token.clone());

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        token.cancel();
    });
    monitor.run().await;
    stopper.await.unwrap();

    let stats = monitor.delivery_stats();
    assert_eq!(stats.success_count, 2);
    assert_eq!(stats.failure_count, 0);
    assert_eq!(monitor.state(), CircuitState::Normal);
    assert_eq!(store.get("/latest/voltage"), Some(serde_json::json!(12.0)));
    assert_eq!(store.get("/latest/current"), Some(serde_json::json!(1.5)));

    let frames = recorder.frames();
    let monitoring: Vec<_> = frames.iter().filter_map(|f| f.metrics).collect();
    assert!(monitoring.len() >= 9);
    assert!(monitoring.iter().all(|m| m.mode == DataMode::Sensor && !m.short_circuit));
}

#[tokio::test(start_paused = true)]
async fn unreachable_network_halts_before_monitoring() {
    let cfg = MonitorCfg {
        network_max_attempts: 5,
        ..MonitorCfg::default()
    };
    let clock = SystemClock::new();
    let store = Arc::new(MemoryStore::new());
    let network = ScriptedNetwork::unreachable();
    let uploader = TelemetryUploader::new(store.clone(), Arc::new(SystemClock::new()), cfg.store_timeout());
    let recorder = RecordingDisplay::new();
    let mut display = recorder.clone();

    let err = boot(
        &cfg,
        &clock,
        StartupDeps {
            network: &network,
            credentials: &NetworkCredentials::default(),
            sensor: None,
            uploader: &uploader,
            display: &mut display,
        },
    )
    .await
    .unwrap_err();

    assert_eq!(err, StartupError::NetworkFailed { attempts: 5 });
    assert_eq!(recorder.phases().last(), Some(&LifecyclePhase::NetworkFailed));
    assert!(!recorder.phases().contains(&LifecyclePhase::CheckingSensor));
    assert_eq!(store.session_count(), 0);
}
