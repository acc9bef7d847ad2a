use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use circuitwatch_store::{RemoteStore, StoreError};
use serde_json::{Value, json};

use crate::clock::{self, Clock};
use crate::error::MonitorError;
use crate::types::{CircuitState, FilteredReading, ShortCircuitEvent, UploadOutcome};

pub const LATEST_PREFIX: &str = "/latest";
pub const SENSOR_DATA_PREFIX: &str = "/sensor_data";
pub const EVENTS_PREFIX: &str = "/short_circuit_events";

const NOT_READY: &str = "remote store not ready";

/// Writes telemetry and events to the remote store. Every store call is
/// bounded by `timeout`; a call that overruns counts as failed.
pub struct TelemetryUploader {
    store: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl TelemetryUploader {
    pub fn new(store: Arc<dyn RemoteStore>, clock: Arc<dyn Clock>, timeout: Duration) -> Self {
        Self {
            store,
            clock,
            timeout,
        }
    }

    pub fn store(&self) -> &dyn RemoteStore {
        self.store.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.store.is_ready()
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, MonitorError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(MonitorError::from),
            Err(_) => Err(MonitorError::RemoteStoreTimeout),
        }
    }

    /// One telemetry cycle: the five `/latest` fields, then the
    /// `/sensor_data/{ts}` snapshot. Every write is issued even after a
    /// failure; the cycle succeeds only if all of them do. Nothing is rolled
    /// back.
    pub async fn upload_cycle(&self, reading: FilteredReading, state: CircuitState) -> UploadOutcome {
        let started = self.clock.monotonic();
        let at = self.clock.wall();
        if !self.store.is_ready() {
            tracing::warn!("{NOT_READY}, skipping telemetry cycle");
            return UploadOutcome::failed(Duration::ZERO, at, NOT_READY);
        }

        let ts = clock::timestamp_key(at);
        let short = state.is_short();
        let fields: [(&str, Value); 5] = [
            ("voltage", json!(reading.voltage)),
            ("current", json!(reading.current)),
            ("power", json!(reading.power)),
            ("shortCircuit", json!(short)),
            ("timestamp", json!(ts)),
        ];

        let mut first_error: Option<MonitorError> = None;
        for (field, value) in fields {
            let path = format!("{LATEST_PREFIX}/{field}");
            if let Err(e) = self.bounded(self.store.write_field(&path, value)).await {
                tracing::warn!(path = %path, error = %e, "telemetry field write failed");
                first_error.get_or_insert(e);
            }
        }

        let path = format!("{SENSOR_DATA_PREFIX}/{ts}");
        let doc = json!({
            "timestamp": ts,
            "voltage": reading.voltage,
            "current": reading.current,
            "power": reading.power,
            "shortCircuit": short,
        });
        if let Err(e) = self.bounded(self.store.write_document(&path, doc)).await {
            tracing::warn!(path = %path, error = %e, "telemetry snapshot write failed");
            first_error.get_or_insert(e);
        }

        let latency = self.clock.monotonic().saturating_sub(started);
        match first_error {
            None => {
                tracing::debug!(latency_ms = latency.as_millis() as u64, "telemetry cycle delivered");
                UploadOutcome::succeeded(latency, at)
            }
            Some(e) => UploadOutcome::failed(latency, at, e.to_string()),
        }
    }

    /// Write one short-circuit event under `/short_circuit_events/{ts}`.
    pub async fn upload_event(&self, event: &ShortCircuitEvent) -> UploadOutcome {
        let started = self.clock.monotonic();
        let at = self.clock.wall();
        if !self.store.is_ready() {
            tracing::warn!(event = %event.id, "{NOT_READY}, short-circuit event not logged");
            return UploadOutcome::failed(Duration::ZERO, at, NOT_READY);
        }
        let ts = clock::timestamp_key(event.at);
        let path = format!("{EVENTS_PREFIX}/{ts}");
        let result = self
            .bounded(self.store.write_document(&path, event.to_document(&ts)))
            .await;
        let latency = self.clock.monotonic().saturating_sub(started);
        match result {
            Ok(()) => {
                tracing::info!(event = %event.id, path = %path, "short-circuit event logged");
                UploadOutcome::succeeded(latency, at)
            }
            Err(e) => {
                tracing::warn!(event = %event.id, error = %e, "short-circuit event not logged");
                UploadOutcome::failed(latency, at, e.to_string())
            }
        }
    }

    /// Tear down and recreate the store session.
    pub async fn reinitialize(&self) -> Result<(), MonitorError> {
        self.bounded(self.store.begin_session()).await
    }

    /// Read one path, bounded like every other call.
    pub async fn read(&self, path: &str) -> Result<Value, MonitorError> {
        self.bounded(self.store.read_field(path)).await
    }

    /// Write one field, bounded like every other call.
    pub async fn write(&self, path: &str, value: Value) -> Result<(), MonitorError> {
        self.bounded(self.store.write_field(path, value)).await
    }

    pub async fn write_doc(&self, path: &str, doc: Value) -> Result<(), MonitorError> {
        self.bounded(self.store.write_document(path, doc)).await
    }
}
