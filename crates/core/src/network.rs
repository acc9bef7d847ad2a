use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::error::MonitorError;

/// Error type for network link operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    #[error("link down: {0}")]
    LinkDown(String),
}

impl From<NetworkError> for MonitorError {
    fn from(e: NetworkError) -> Self {
        MonitorError::NetworkLinkFailure(e.to_string())
    }
}

/// Credentials handed to the link layer.
#[derive(Clone, Default)]
pub struct NetworkCredentials {
    pub name: String,
    pub secret: Option<String>,
}

impl NetworkCredentials {
    pub fn new(name: impl Into<String>, secret: Option<String>) -> Self {
        Self {
            name: name.into(),
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    /// Reads `CIRCUITWATCH_NETWORK_NAME` and `CIRCUITWATCH_NETWORK_SECRET`.
    pub fn from_env() -> Self {
        Self::new(
            std::env::var("CIRCUITWATCH_NETWORK_NAME").unwrap_or_default(),
            std::env::var("CIRCUITWATCH_NETWORK_SECRET").ok(),
        )
    }
}

impl std::fmt::Debug for NetworkCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkCredentials")
            .field("name", &self.name)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Link layer between the device and the remote store.
#[async_trait::async_trait]
pub trait Network: Send + Sync {
    fn name(&self) -> &str;

    /// One link-up attempt.
    async fn connect(&self, credentials: &NetworkCredentials) -> Result<(), NetworkError>;

    /// Last known link state; cheap, called every tick.
    fn is_connected(&self) -> bool;

    /// Re-observe the link and refresh `is_connected`.
    async fn check_link(&self) -> bool {
        self.is_connected()
    }
}

/// Link managed by the host OS. A connect attempt succeeds when the store
/// host resolves; there is no radio to drive.
#[derive(Debug)]
pub struct HostNetwork {
    probe_host: String,
    connected: AtomicBool,
}

impl HostNetwork {
    /// `probe_host` is a `host:port` pair resolved on every connect attempt.
    pub fn new(probe_host: impl Into<String>) -> Self {
        Self {
            probe_host: probe_host.into(),
            connected: AtomicBool::new(false),
        }
    }

    /// Derive the probe target from a store base URL such as
    /// `https://db.example.com/`.
    pub fn for_url(url: &str) -> Self {
        let without_scheme = url.split("://").nth(1).unwrap_or(url);
        let host = without_scheme.split('/').next().unwrap_or(without_scheme);
        let target = if host.contains(':') {
            host.to_owned()
        } else if url.starts_with("http://") {
            format!("{host}:80")
        } else {
            format!("{host}:443")
        };
        Self::new(target)
    }

    pub fn probe_host(&self) -> &str {
        &self.probe_host
    }

    async fn resolve(&self) -> Result<(), NetworkError> {
        let resolved = tokio::net::lookup_host(self.probe_host.as_str())
            .await
            .map(|addrs| addrs.count());
        let result = match resolved {
            Ok(n) if n > 0 => Ok(()),
            Ok(_) => Err(NetworkError::LinkDown(format!("{} did not resolve", self.probe_host))),
            Err(e) => Err(NetworkError::LinkDown(e.to_string())),
        };
        self.connected.store(result.is_ok(), Ordering::SeqCst);
        result
    }
}

#[async_trait::async_trait]
impl Network for HostNetwork {
    fn name(&self) -> &str {
        "host"
    }

    async fn connect(&self, credentials: &NetworkCredentials) -> Result<(), NetworkError> {
        tracing::debug!(network = %credentials.name, target = %self.probe_host, "probing link");
        self.resolve().await
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn check_link(&self) -> bool {
        match self.resolve().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(host = %self.probe_host, error = %e, "link check failed");
                false
            }
        }
    }
}

/// Network test double. Connect attempts consume a script of results; once
/// the script is empty every attempt succeeds. Tests can drop the link,
/// either at once or at the next link check.
#[derive(Debug, Default)]
pub struct ScriptedNetwork {
    script: Mutex<VecDeque<Result<(), NetworkError>>>,
    connected: AtomicBool,
    lose_on_check: AtomicBool,
    attempts: AtomicU32,
    checks: AtomicU32,
}

impl ScriptedNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// First `n` attempts fail.
    pub fn failing_first(n: u32) -> Self {
        let net = Self::default();
        for k in 0..n {
            net.push(Err(NetworkError::LinkDown(format!("scripted failure {}", k + 1))));
        }
        net
    }

    /// Every attempt fails.
    pub fn unreachable() -> Self {
        Self::failing_first(u32::from(u16::MAX))
    }

    pub fn push(&self, result: Result<(), NetworkError>) {
        lock(&self.script).push_back(result);
    }

    pub fn drop_link(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// The next `check_link` observes the link as down.
    pub fn lose_link_on_next_check(&self) {
        self.lose_on_check.store(true, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn checks(&self) -> u32 {
        self.checks.load(Ordering::SeqCst)
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait::async_trait]
impl Network for ScriptedNetwork {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn connect(&self, _credentials: &NetworkCredentials) -> Result<(), NetworkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let next = lock(&self.script).pop_front().unwrap_or(Ok(()));
        self.connected.store(next.is_ok(), Ordering::SeqCst);
        next
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn check_link(&self) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        if self.lose_on_check.swap(false, Ordering::SeqCst) {
            self.connected.store(false, Ordering::SeqCst);
        }
        self.is_connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_target_from_url() {
        assert_eq!(HostNetwork::for_url("https://db.example.com/").probe_host(), "db.example.com:443");
        assert_eq!(HostNetwork::for_url("http://10.0.0.2:9000/x").probe_host(), "10.0.0.2:9000");
        assert_eq!(HostNetwork::for_url("http://localhost").probe_host(), "localhost:80");
    }

    #[test]
    fn credentials_debug_redacts_secret() {
        let c = NetworkCredentials::new("plant-floor", Some("hunter2".into()));
        let dbg = format!("{c:?}");
        assert!(dbg.contains("plant-floor"));
        assert!(!dbg.contains("hunter2"));
        assert!(NetworkCredentials::new("open", Some(String::new())).secret.is_none());
    }

    #[tokio::test]
    async fn scripted_network_follows_script() {
        let net = ScriptedNetwork::failing_first(2);
        let creds = NetworkCredentials::default();
        assert!(net.connect(&creds).await.is_err());
        assert!(!net.is_connected());
        assert!(net.connect(&creds).await.is_err());
        assert!(net.connect(&creds).await.is_ok());
        assert!(net.is_connected());
        assert_eq!(net.attempts(), 3);

        net.drop_link();
        assert!(!net.is_connected());
    }

    #[tokio::test]
    async fn scripted_link_lost_at_check() {
        let net = ScriptedNetwork::new();
        net.connect(&NetworkCredentials::default()).await.unwrap();
        assert!(net.check_link().await);
        net.lose_link_on_next_check();
        assert!(net.is_connected());
        assert!(!net.check_link().await);
        assert!(!net.is_connected());
        assert_eq!(net.checks(), 2);
    }

    #[tokio::test]
    async fn host_network_resolves_ip_literal() {
        let net = HostNetwork::new("127.0.0.1:80");
        net.connect(&NetworkCredentials::default()).await.unwrap();
        assert!(net.is_connected());
        assert!(net.check_link().await);
    }

    #[tokio::test]
    async fn host_link_check_clears_stale_state() {
        // No port, so resolution fails without touching DNS.
        let net = HostNetwork::new("plant-gateway");
        net.connected.store(true, Ordering::SeqCst);
        assert!(net.is_connected());
        assert!(!net.check_link().await);
        assert!(!net.is_connected());
        assert!(net.connect(&NetworkCredentials::default()).await.is_err());
    }
}
