use serde::Serialize;
use serde_json::json;

use super::uploader::TelemetryUploader;

pub const PROBE_PATH: &str = "/test_connection";
pub const PROBE_DOC_PATH: &str = "/test_sensor_data";

/// Outcome of the startup store self-test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub ready: bool,
    pub read_ok: bool,
    pub write_ok: bool,
    pub structure_ok: bool,
    pub errors: Vec<String>,
}

impl ProbeReport {
    /// A read or structure failure is tolerated; the store must be ready and
    /// accept a plain write.
    pub fn passed(&self) -> bool {
        self.ready && self.write_ok
    }
}

/// Exercise the store once: readiness, a read, a field write and a document
/// write. Never fails; everything lands in the report.
pub async fn self_test(uploader: &TelemetryUploader, device: &str) -> ProbeReport {
    let mut report = ProbeReport {
        ready: uploader.is_ready(),
        ..ProbeReport::default()
    };
    if !report.ready {
        report.errors.push("store not ready".into());
        tracing::warn!(store = uploader.store().name(), "self-test: store not ready");
        return report;
    }

    match uploader.read(PROBE_PATH).await {
        Ok(_) => report.read_ok = true,
        Err(e) => report.errors.push(format!("read {PROBE_PATH}: {e}")),
    }
    match uploader.write(PROBE_PATH, json!(format!("{device}_Connected"))).await {
        Ok(()) => report.write_ok = true,
        Err(e) => report.errors.push(format!("write {PROBE_PATH}: {e}")),
    }
    let sample = json!({
        "voltage": 12.34,
        "current": 1.23,
        "power": 15.18,
        "timestamp": "test_timestamp",
    });
    match uploader.write_doc(PROBE_DOC_PATH, sample).await {
        Ok(()) => report.structure_ok = true,
        Err(e) => report.errors.push(format!("write {PROBE_DOC_PATH}: {e}")),
    }

    if report.passed() {
        tracing::info!(
            store = uploader.store().name(),
            read = report.read_ok,
            structure = report.structure_ok,
            "store self-test passed"
        );
    } else {
        tracing::warn!(store = uploader.store().name(), errors = ?report.errors, "store self-test failed");
    }
    report
}
