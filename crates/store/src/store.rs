use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use serde_json::Value;

/// Boxed future returned by every store operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Error type for remote store operations. Every variant carries a
/// human-readable reason that ends up in the delivery statistics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store call timed out")]
    Timeout,
    #[error("authentication rejected: {0}")]
    Auth(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Remote key/value document store (realtime-database style paths).
///
/// Implementations: [`crate::http::HttpStore`] for a real backend,
/// [`NullStore`] when delivery is not configured, [`MemoryStore`] for tests.
pub trait RemoteStore: Send + Sync {
    fn name(&self) -> &str;

    /// (Re)create the session and verify it with a read. Marks the store ready on success.
    fn begin_session(&self) -> StoreFuture<'_, ()>;

    /// True once a session has been established and not torn down since.
    fn is_ready(&self) -> bool;

    fn write_field<'a>(&'a self, path: &'a str, value: Value) -> StoreFuture<'a, ()>;

    fn write_document<'a>(&'a self, path: &'a str, doc: Value) -> StoreFuture<'a, ()>;

    fn read_field<'a>(&'a self, path: &'a str) -> StoreFuture<'a, Value>;
}

/// Store used when no remote backend is configured. Accepts and discards all writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

impl RemoteStore for NullStore {
    fn name(&self) -> &str {
        "null"
    }

    fn begin_session(&self) -> StoreFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn write_field<'a>(&'a self, path: &'a str, _value: Value) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            tracing::trace!(path, "null store discarded field");
            Ok(())
        })
    }

    fn write_document<'a>(&'a self, path: &'a str, _doc: Value) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            tracing::trace!(path, "null store discarded document");
            Ok(())
        })
    }

    fn read_field<'a>(&'a self, _path: &'a str) -> StoreFuture<'a, Value> {
        Box::pin(async { Ok(Value::Null) })
    }
}

/// In-memory store for testing. Records every write and lets tests inject
/// failures or hangs on path prefixes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<BTreeMap<String, Value>>,
    failing: Mutex<HashSet<String>>,
    hanging: Mutex<HashSet<String>>,
    reject_sessions: AtomicBool,
    ready: AtomicBool,
    sessions: AtomicU32,
    writes: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose session is already established.
    pub fn ready() -> Self {
        let store = Self::default();
        store.ready.store(true, Ordering::SeqCst);
        store
    }

    /// Every call on a path starting with `prefix` fails with `RequestFailed`.
    pub fn fail_path(&self, prefix: impl Into<String>) {
        lock(&self.failing).insert(prefix.into());
    }

    /// Every call on a path starting with `prefix` never completes.
    pub fn hang_path(&self, prefix: impl Into<String>) {
        lock(&self.hanging).insert(prefix.into());
    }

    pub fn clear_failures(&self) {
        lock(&self.failing).clear();
        lock(&self.hanging).clear();
    }

    /// Make `begin_session` fail (auth rejected) until switched off.
    pub fn reject_sessions(&self, reject: bool) {
        self.reject_sessions.store(reject, Ordering::SeqCst);
    }

    /// Drop the current session without recreating it.
    pub fn drop_session(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    pub fn get(&self, path: &str) -> Option<Value> {
        lock(&self.data).get(path).cloned()
    }

    /// All stored paths under `prefix`, sorted.
    pub fn paths_under(&self, prefix: &str) -> Vec<String> {
        lock(&self.data)
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn session_count(&self) -> u32 {
        self.sessions.load(Ordering::SeqCst)
    }

    /// Number of write calls issued, successful or not.
    pub fn write_count(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    fn matches(set: &Mutex<HashSet<String>>, path: &str) -> bool {
        lock(set).iter().any(|p| path.starts_with(p.as_str()))
    }

    async fn call(&self, path: &str) -> Result<(), StoreError> {
        if Self::matches(&self.hanging, path) {
            std::future::pending::<()>().await;
        }
        if Self::matches(&self.failing, path) {
            return Err(StoreError::RequestFailed(format!("injected failure at {path}")));
        }
        Ok(())
    }

    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.call(path).await?;
        lock(&self.data).insert(path.to_owned(), value);
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RemoteStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn begin_session(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.sessions.fetch_add(1, Ordering::SeqCst);
            if self.reject_sessions.load(Ordering::SeqCst) {
                self.ready.store(false, Ordering::SeqCst);
                return Err(StoreError::Auth("session rejected".into()));
            }
            self.ready.store(true, Ordering::SeqCst);
            Ok(())
        })
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn write_field<'a>(&'a self, path: &'a str, value: Value) -> StoreFuture<'a, ()> {
        Box::pin(self.write(path, value))
    }

    fn write_document<'a>(&'a self, path: &'a str, doc: Value) -> StoreFuture<'a, ()> {
        Box::pin(self.write(path, doc))
    }

    fn read_field<'a>(&'a self, path: &'a str) -> StoreFuture<'a, Value> {
        Box::pin(async move {
            self.call(path).await?;
            Ok(self.get(path).unwrap_or(Value::Null))
        })
    }
}
