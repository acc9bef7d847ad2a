use std::time::Duration;

use super::phase::LifecycleMachine;
use super::retry::RetryPolicy;
use crate::clock::{self, Clock};
use crate::config::MonitorCfg;
use crate::delivery::{ProbeReport, TelemetryUploader, self_test};
use crate::display::{StatusFrame, StatusSink};
use crate::error::{MonitorError, StartupError};
use crate::network::{Network, NetworkCredentials};
use crate::sensing::{CalibrationRange, Sensor, SensorError, SensorSource, VOLTAGE_MAX_V};

/// Collaborators the startup sequence drives.
pub struct StartupDeps<'a> {
    pub network: &'a dyn Network,
    pub credentials: &'a NetworkCredentials,
    /// Hardware sensor driver, if the build has one.
    pub sensor: Option<Box<dyn Sensor>>,
    pub uploader: &'a TelemetryUploader,
    pub display: &'a mut dyn StatusSink,
}

/// Everything the monitoring loop needs from startup.
#[derive(Debug)]
pub struct BootReport {
    pub source: SensorSource,
    pub machine: LifecycleMachine,
    pub probe: ProbeReport,
    pub network_attempts: u32,
}

impl BootReport {
    pub fn synthetic_data(&self) -> bool {
        self.machine.synthetic_data()
    }

    pub fn delivery_degraded(&self) -> bool {
        self.machine.delivery_degraded()
    }
}

/// Run the lifecycle from Starting to Monitoring. The only fatal outcome is
/// the network link never coming up; sensor and store problems degrade the
/// run instead of stopping it.
pub async fn boot(
    cfg: &MonitorCfg,
    clock: &dyn Clock,
    deps: StartupDeps<'_>,
) -> Result<BootReport, StartupError> {
    let StartupDeps {
        network,
        credentials,
        sensor,
        uploader,
        display,
    } = deps;
    let mut machine = LifecycleMachine::new();
    display.render(&StatusFrame::lifecycle(machine.phase(), "Initializing..."));

    // Network
    let phase = machine.advance();
    let policy = RetryPolicy::from_cfg(cfg);
    let max = policy.max_attempts;
    let frames = &mut *display;
    let linked = policy
        .run(move |attempt| {
            frames.render(&StatusFrame::lifecycle(phase, format!("Attempt {attempt}/{max}")));
            network.connect(credentials)
        })
        .await;
    let network_attempts = match linked {
        Ok(((), attempts)) => attempts,
        Err((e, attempts)) => {
            machine.fail_network();
            display.render(&StatusFrame::lifecycle(machine.phase(), "Network connection failed"));
            let err = MonitorError::from(e);
            tracing::error!(network = %credentials.name, attempts, error = %err, "network link failed");
            return Err(StartupError::NetworkFailed { attempts });
        }
    };
    let phase = machine.advance();
    tracing::info!(network = %credentials.name, link = network.name(), attempts = network_attempts, "network link up");
    display.render(&StatusFrame::lifecycle(phase, "Connected"));
    let now = clock.wall();
    if !clock::wall_synced(now) {
        tracing::warn!(wall = %now, "wall clock not synchronized, timestamps will be relative to boot");
    }

    // Sensor
    let phase = machine.advance();
    display.render(&StatusFrame::lifecycle(phase, "Checking sensor..."));
    let sim_update = Duration::from_millis(cfg.sim_update_ms);
    let source = match sensor {
        Some(mut hw) => match check_sensor(hw.as_mut(), cfg.calibration) {
            Ok(()) => {
                tracing::info!(sensor = hw.name(), range = %cfg.calibration, "sensor ready");
                SensorSource::hardware(hw, cfg.calibration, sim_update)
            }
            Err(e) => {
                let err = MonitorError::from(e);
                tracing::warn!(error = %err, "sensor check failed, using simulated data");
                SensorSource::simulated(sim_update)
            }
        },
        None => {
            tracing::info!("no sensor driver, using simulated data");
            SensorSource::simulated(sim_update)
        }
    };
    if source.current_limit_a().is_none() {
        machine.mark_synthetic();
    }
    display.render(&StatusFrame::lifecycle(
        phase,
        if machine.synthetic_data() { "Using simulated data" } else { "Sensor OK" },
    ));

    // Remote store
    let phase = machine.advance();
    display.render(&StatusFrame::lifecycle(phase, "Connecting..."));
    match uploader.reinitialize().await {
        Ok(()) => tracing::info!(store = uploader.store().name(), "store session established"),
        Err(e) => {
            tracing::warn!(store = uploader.store().name(), error = %e, "store session failed, continuing without delivery");
            machine.mark_delivery_degraded();
        }
    }
    let probe = self_test(uploader, &cfg.device_id).await;
    if !probe.passed() {
        machine.mark_delivery_degraded();
    }
    display.render(&StatusFrame::lifecycle(
        phase,
        if machine.delivery_degraded() { "Store degraded" } else { "Store OK" },
    ));

    let phase = machine.advance();
    display.render(&StatusFrame::lifecycle(phase, "System operational"));
    machine.advance();
    tracing::info!(
        device = %cfg.device_id,
        mode = %source.mode(),
        synthetic = machine.synthetic_data(),
        delivery_degraded = machine.delivery_degraded(),
        "monitoring started"
    );

    Ok(BootReport {
        source,
        machine,
        probe,
        network_attempts,
    })
}

/// Probe, calibrate and take one test reading. A suspicious reading is only
/// logged; a bus failure rejects the sensor.
fn check_sensor(sensor: &mut dyn Sensor, range: CalibrationRange) -> Result<(), SensorError> {
    sensor.probe()?;
    sensor.calibrate(range)?;
    match sensor.read_raw() {
        Ok(s) if (0.0..VOLTAGE_MAX_V).contains(&s.voltage) => {
            tracing::debug!(voltage = s.voltage, current = s.current, "sensor test reading");
        }
        Ok(s) => {
            tracing::warn!(voltage = s.voltage, "sensor test reading out of range, check wiring");
        }
        Err(e) => {
            tracing::warn!(error = %e, "sensor test reading failed");
        }
    }
    Ok(())
}
