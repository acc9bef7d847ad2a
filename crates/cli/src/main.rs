mod status;

use std::sync::Arc;
use std::time::Duration;

use circuitwatch_core::clock::{Clock, SystemClock};
use circuitwatch_core::config::MonitorCfg;
use circuitwatch_core::delivery::TelemetryUploader;
use circuitwatch_core::display::{LogDisplay, StatusSink, WatchDisplay};
use circuitwatch_core::lifecycle::{StartupDeps, boot};
use circuitwatch_core::network::{HostNetwork, Network, NetworkCredentials};
use circuitwatch_core::runtime::{Monitor, MonitorParts};
use circuitwatch_store::{NullStore, RemoteStore};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let cfg = Arc::new(MonitorCfg::from_env());
    for (key, value, description) in cfg.to_entries() {
        tracing::debug!(key, value = %value, description, "config");
    }
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());

    // CIRCUITWATCH_STORE_URL (optional; no store = telemetry is discarded)
    let (store, network): (Arc<dyn RemoteStore>, Arc<dyn Network>) =
        match circuitwatch_store::http::from_env(cfg.store_timeout()) {
            Some(http) => {
                tracing::info!(url = http.base_url(), auth_chars = http.auth_len(), "remote store configured");
                let network: Arc<dyn Network> = Arc::new(HostNetwork::for_url(http.base_url()));
                let store: Arc<dyn RemoteStore> = Arc::new(http);
                (store, network)
            }
            None => {
                tracing::warn!("CIRCUITWATCH_STORE_URL not set, telemetry will be discarded");
                let network: Arc<dyn Network> = Arc::new(HostNetwork::new("localhost:0"));
                let store: Arc<dyn RemoteStore> = Arc::new(NullStore);
                (store, network)
            }
        };
    let credentials = NetworkCredentials::from_env();
    let uploader = TelemetryUploader::new(store, clock.clone(), cfg.store_timeout());

    let token = CancellationToken::new();
    // CIRCUITWATCH_STATUS_STDOUT=0 sends frames to the log instead of stdout
    let (mut display, printer): (Box<dyn StatusSink>, _) =
        if status::stdout_enabled(std::env::var("CIRCUITWATCH_STATUS_STDOUT").ok().as_deref()) {
            let (watch_display, status_rx) = WatchDisplay::channel();
            let printer = tokio::spawn(status::print_frames(status_rx, token.clone()));
            let display: Box<dyn StatusSink> = Box::new(watch_display);
            (display, Some(printer))
        } else {
            let display: Box<dyn StatusSink> = Box::new(LogDisplay);
            (display, None)
        };

    // No sensor driver is linked into the host build; startup falls back to
    // the synthetic signal.
    let report = boot(
        &cfg,
        clock.as_ref(),
        StartupDeps {
            network: network.as_ref(),
            credentials: &credentials,
            sensor: None,
            uploader: &uploader,
            display: display.as_mut(),
        },
    )
    .await;
    let report = match report {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "startup failed, restart required");
            token.cancel();
            status::join(printer).await;
            return Err(e.into());
        }
    };

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

    // The tick in progress is allowed to finish, bounded by the shutdown timeout.
    let grace = Duration::from_secs(cfg.shutdown_timeout_secs);
    let run = monitor.run();
    tokio::pin!(run);
    tokio::select! {
        _ = &mut run => {}
        _ = token.cancelled() => {
            if tokio::time::timeout(grace, &mut run).await.is_err() {
                tracing::warn!(timeout_secs = cfg.shutdown_timeout_secs, "tick did not finish before shutdown timeout");
            }
        }
    }
    token.cancel();
    status::join(printer).await;
    Ok(())
}

/// stderr by default; `CIRCUITWATCH_LOG_FILE` redirects to a file and
/// `CIRCUITWATCH_LOG_JSON=1` switches to JSON lines.
fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("CIRCUITWATCH_LOG_JSON")
        .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
        .unwrap_or(false);
    let file = match std::env::var("CIRCUITWATCH_LOG_FILE") {
        Ok(path) => Some(std::fs::File::create(path)?),
        Err(_) => None,
    };

    let registry = tracing_subscriber::registry().with(filter);
    match (json, file) {
        (true, Some(file)) => registry
            .with(fmt::layer().json().with_target(true).with_writer(std::sync::Mutex::new(file)))
            .init(),
        (true, None) => registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .init(),
        (false, Some(file)) => registry
            .with(fmt::layer().with_ansi(false).with_writer(std::sync::Mutex::new(file)))
            .init(),
        (false, None) => registry.with(fmt::layer().with_writer(std::io::stderr)).init(),
    }
    Ok(())
}
