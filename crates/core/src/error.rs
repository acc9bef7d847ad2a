use circuitwatch_store::StoreError;

/// Failure taxonomy of the monitoring engine. None of these stop the tick
/// loop; each call site turns them into data (a substituted value, a failed
/// upload outcome, a degraded flag).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MonitorError {
    #[error("sensor unavailable: {0}")]
    SensorUnavailable(String),
    #[error("invalid {field} reading {value}, substituted {substitute}")]
    SensorReadingInvalid {
        field: &'static str,
        value: f32,
        substitute: f32,
    },
    #[error("network link failure: {0}")]
    NetworkLinkFailure(String),
    #[error("remote store call timed out")]
    RemoteStoreTimeout,
    #[error("remote store write failed: {0}")]
    RemoteStoreWriteFailure(String),
    #[error("remote store rejected credentials: {0}")]
    RemoteStoreAuthFailure(String),
}

impl From<StoreError> for MonitorError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Timeout => MonitorError::RemoteStoreTimeout,
            StoreError::Auth(reason) => MonitorError::RemoteStoreAuthFailure(reason),
            other => MonitorError::RemoteStoreWriteFailure(other.to_string()),
        }
    }
}

/// The one fatal path: the network link never came up during startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StartupError {
    #[error("network link not established after {attempts} attempts")]
    NetworkFailed { attempts: u32 },
}
