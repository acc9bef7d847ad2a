//! HTTP realtime-database client.
//!
//! Paths map onto `{base_url}{path}.json`; writes are `PUT` with a JSON body,
//! reads are `GET`. A legacy database secret, when configured, travels as the
//! `auth` query parameter.

use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::Value;

use crate::store::{RemoteStore, StoreError, StoreFuture};

/// Path read by `begin_session` to verify the session.
const SESSION_PROBE_PATH: &str = "/test";

/// HTTP-backed remote store.
pub struct HttpStore {
    base_url: String,
    auth: Option<String>,
    request_timeout: Duration,
    client: RwLock<reqwest::Client>,
    ready: AtomicBool,
}

impl HttpStore {
    /// Build from base URL + optional database secret. The session is not
    /// established until [`RemoteStore::begin_session`] succeeds.
    pub fn new(base_url: impl Into<String>, auth: Option<String>, request_timeout: Duration) -> Self {
        let base: String = base_url.into();
        Self {
            base_url: base.trim_end_matches('/').to_owned(),
            auth: auth.filter(|a| !a.is_empty()),
            request_timeout,
            client: RwLock::new(build_client(request_timeout)),
            ready: AtomicBool::new(false),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Length of the configured secret, for startup diagnostics. Never logs the secret itself.
    pub fn auth_len(&self) -> usize {
        self.auth.as_ref().map_or(0, String::len)
    }

    fn endpoint(&self, path: &str) -> String {
        let path = path.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}.json", self.base_url, path)
        } else {
            format!("{}/{}.json", self.base_url, path)
        }
    }

    fn client(&self) -> reqwest::Client {
        match self.client.read() {
            Ok(c) => c.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn with_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Some(secret) => req.query(&[("auth", secret.as_str())]),
            None => req,
        }
    }

    async fn put(&self, path: &str, body: Value) -> Result<(), StoreError> {
        let req = self.with_auth(self.client().put(self.endpoint(path))).json(&body);
        let resp = req.send().await.map_err(transport_error)?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(check_error(status, text));
        }
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Value, StoreError> {
        let req = self.with_auth(self.client().get(self.endpoint(path)));
        let resp = req.send().await.map_err(transport_error)?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(check_error(status, text));
        }
        resp.json()
            .await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))
    }

    async fn start_session(&self) -> Result<(), StoreError> {
        // Fresh client: drops pooled connections from the failed session.
        let fresh = build_client(self.request_timeout);
        match self.client.write() {
            Ok(mut c) => *c = fresh,
            Err(poisoned) => *poisoned.into_inner() = fresh,
        }
        tracing::debug!(
            base_url = %self.base_url,
            auth_len = self.auth_len(),
            "starting store session"
        );
        match self.get(SESSION_PROBE_PATH).await {
            Ok(_) => {
                self.ready.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                self.ready.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }
}

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to build tuned HTTP client, using defaults");
            reqwest::Client::new()
        })
}

fn transport_error(e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
        StoreError::Timeout
    } else if e.is_connect() {
        StoreError::Unavailable(e.to_string())
    } else {
        StoreError::RequestFailed(e.to_string())
    }
}

/// Map an error status: 401/403 are auth failures, everything else a failed request.
fn check_error(status: reqwest::StatusCode, body: String) -> StoreError {
    match status.as_u16() {
        401 | 403 => StoreError::Auth(format!("{status}: {body}")),
        _ => StoreError::RequestFailed(format!("{status}: {body}")),
    }
}

impl RemoteStore for HttpStore {
    fn name(&self) -> &str {
        "http"
    }

    fn begin_session(&self) -> StoreFuture<'_, ()> {
        Box::pin(self.start_session())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn write_field<'a>(&'a self, path: &'a str, value: Value) -> StoreFuture<'a, ()> {
        Box::pin(self.put(path, value))
    }

    fn write_document<'a>(&'a self, path: &'a str, doc: Value) -> StoreFuture<'a, ()> {
        Box::pin(self.put(path, doc))
    }

    fn read_field<'a>(&'a self, path: &'a str) -> StoreFuture<'a, Value> {
        Box::pin(self.get(path))
    }
}

/// Build an HttpStore from environment variables.
/// Reads `CIRCUITWATCH_STORE_URL`, optionally `CIRCUITWATCH_STORE_AUTH`.
/// Returns `None` if the URL is not set.
pub fn from_env(request_timeout: Duration) -> Option<HttpStore> {
    let url = std::env::var("CIRCUITWATCH_STORE_URL").ok()?;
    if url.trim().is_empty() {
        return None;
    }
    let auth = std::env::var("CIRCUITWATCH_STORE_AUTH").ok();
    Some(HttpStore::new(url, auth, request_timeout))
}
