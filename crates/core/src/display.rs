use std::fmt;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::watch;

use crate::lifecycle::LifecyclePhase;
use crate::types::{DataMode, FilteredReading};

/// Remote store link as shown on the status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StoreLink {
    /// Last upload succeeded; carries the running success count.
    Ok { uploads: u64 },
    Disconnected,
    Error,
}

impl fmt::Display for StoreLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreLink::Ok { uploads } => write!(f, "OK #{uploads}"),
            StoreLink::Disconnected => write!(f, "DISC"),
            StoreLink::Error => write!(f, "ERR"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DisplayMetrics {
    pub reading: FilteredReading,
    pub mode: DataMode,
    pub store: StoreLink,
    pub short_circuit: bool,
}

/// One status display refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusFrame {
    pub phase: LifecyclePhase,
    pub label: String,
    pub message: Option<String>,
    pub metrics: Option<DisplayMetrics>,
}

impl StatusFrame {
    /// Lifecycle frame: phase label plus an optional message line.
    pub fn lifecycle(phase: LifecyclePhase, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            phase,
            label: phase.label().to_owned(),
            message: (!message.is_empty()).then_some(message),
            metrics: None,
        }
    }

    /// Monitoring frame with live metrics.
    pub fn monitoring(metrics: DisplayMetrics) -> Self {
        Self {
            phase: LifecyclePhase::Monitoring,
            label: LifecyclePhase::Monitoring.label().to_owned(),
            message: None,
            metrics: Some(metrics),
        }
    }

    /// Rendered text lines, top to bottom.
    pub fn lines(&self) -> Vec<String> {
        let Some(m) = &self.metrics else {
            let mut lines = vec![self.label.clone()];
            lines.extend(self.message.clone());
            return lines;
        };
        let mut lines = vec![
            format!("Status: {}", if m.short_circuit { "SHORT!" } else { "OK" }),
            format!("V: {:.2}V  I: {:.3}A", m.reading.voltage, m.reading.current),
            format!("P: {:.2}W", m.reading.power),
            format!("Store: {}", m.store),
        ];
        if m.mode == DataMode::Simulated {
            lines.push("SIM MODE".to_owned());
        }
        lines
    }
}

impl Default for StatusFrame {
    fn default() -> Self {
        StatusFrame::lifecycle(LifecyclePhase::Starting, "")
    }
}

impl fmt::Display for StatusFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.lines().join(" | "))
    }
}

/// Output surface for status frames.
pub trait StatusSink: Send {
    fn render(&mut self, frame: &StatusFrame);
}

/// Writes frames to the tracing log.
#[derive(Debug, Default)]
pub struct LogDisplay;

impl StatusSink for LogDisplay {
    fn render(&mut self, frame: &StatusFrame) {
        if frame.metrics.is_some() {
            tracing::debug!(target: "circuitwatch::display", "{frame}");
        } else {
            tracing::info!(target: "circuitwatch::display", phase = %frame.phase, "{frame}");
        }
    }
}

/// Publishes the latest frame on a watch channel.
#[derive(Debug)]
pub struct WatchDisplay {
    tx: watch::Sender<StatusFrame>,
}

impl WatchDisplay {
    pub fn channel() -> (Self, watch::Receiver<StatusFrame>) {
        let (tx, rx) = watch::channel(StatusFrame::default());
        (Self { tx }, rx)
    }
}

impl StatusSink for WatchDisplay {
    fn render(&mut self, frame: &StatusFrame) {
        // No receivers left is not an error: the display is optional.
        self.tx.send_replace(frame.clone());
    }
}

/// Keeps every frame; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingDisplay {
    frames: Arc<Mutex<Vec<StatusFrame>>>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<StatusFrame> {
        self.frames
            .lock()
            .map(|f| f.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn phases(&self) -> Vec<LifecyclePhase> {
        self.frames().iter().map(|f| f.phase).collect()
    }
}

impl StatusSink for RecordingDisplay {
    fn render(&mut self, frame: &StatusFrame) {
        match self.frames.lock() {
            Ok(mut frames) => frames.push(frame.clone()),
            Err(poisoned) => poisoned.into_inner().push(frame.clone()),
        }
    }
}
