use std::fmt;

use serde::{Deserialize, Serialize};

/// Device lifecycle:
/// Starting → ConnectingNetwork → NetworkReady → CheckingSensor →
/// ConnectingCloud → Ready → Monitoring, with NetworkFailed as the only
/// terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecyclePhase {
    Starting,
    ConnectingNetwork,
    NetworkReady,
    CheckingSensor,
    ConnectingCloud,
    Ready,
    Monitoring,
    NetworkFailed,
}

impl LifecyclePhase {
    /// Short upper-case label shown on the status display.
    pub fn label(self) -> &'static str {
        match self {
            LifecyclePhase::Starting => "STARTING",
            LifecyclePhase::ConnectingNetwork => "NETWORK",
            LifecyclePhase::NetworkReady => "NETWORK OK",
            LifecyclePhase::CheckingSensor => "SENSOR",
            LifecyclePhase::ConnectingCloud => "CLOUD",
            LifecyclePhase::Ready => "READY",
            LifecyclePhase::Monitoring => "MONITORING",
            LifecyclePhase::NetworkFailed => "ERROR",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LifecyclePhase::NetworkFailed)
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecyclePhase::Starting => write!(f, "Starting"),
            LifecyclePhase::ConnectingNetwork => write!(f, "ConnectingNetwork"),
            LifecyclePhase::NetworkReady => write!(f, "NetworkReady"),
            LifecyclePhase::CheckingSensor => write!(f, "CheckingSensor"),
            LifecyclePhase::ConnectingCloud => write!(f, "ConnectingCloud"),
            LifecyclePhase::Ready => write!(f, "Ready"),
            LifecyclePhase::Monitoring => write!(f, "Monitoring"),
            LifecyclePhase::NetworkFailed => write!(f, "NetworkFailed"),
        }
    }
}

/// Tracks the lifecycle phase and the degradations recorded on the way to
/// Monitoring. Monitoring and NetworkFailed are both absorbing.
#[derive(Debug, Clone)]
pub struct LifecycleMachine {
    phase: LifecyclePhase,
    synthetic_data: bool,
    delivery_degraded: bool,
}

impl LifecycleMachine {
    pub fn new() -> Self {
        Self {
            phase: LifecyclePhase::Starting,
            synthetic_data: false,
            delivery_degraded: false,
        }
    }

    /// Advance to the next phase. Returns the new phase.
    pub fn advance(&mut self) -> LifecyclePhase {
        let next = match self.phase {
            LifecyclePhase::Starting => LifecyclePhase::ConnectingNetwork,
            LifecyclePhase::ConnectingNetwork => LifecyclePhase::NetworkReady,
            LifecyclePhase::NetworkReady => LifecyclePhase::CheckingSensor,
            LifecyclePhase::CheckingSensor => LifecyclePhase::ConnectingCloud,
            LifecyclePhase::ConnectingCloud => LifecyclePhase::Ready,
            LifecyclePhase::Ready => LifecyclePhase::Monitoring,
            LifecyclePhase::Monitoring => LifecyclePhase::Monitoring,
            LifecyclePhase::NetworkFailed => LifecyclePhase::NetworkFailed,
        };
        if next != self.phase {
            tracing::info!(from = %self.phase, to = %next, "lifecycle transition");
        }
        self.phase = next;
        self.phase
    }

    /// Network attempts exhausted. Only meaningful while connecting; from any
    /// other phase this is ignored.
    pub fn fail_network(&mut self) -> LifecyclePhase {
        if self.phase == LifecyclePhase::ConnectingNetwork {
            tracing::error!(from = %self.phase, "lifecycle halted");
            self.phase = LifecyclePhase::NetworkFailed;
        }
        self.phase
    }

    pub fn mark_synthetic(&mut self) {
        self.synthetic_data = true;
    }

    pub fn mark_delivery_degraded(&mut self) {
        self.delivery_degraded = true;
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    pub fn synthetic_data(&self) -> bool {
        self.synthetic_data
    }

    pub fn delivery_degraded(&self) -> bool {
        self.delivery_degraded
    }

    pub fn is_monitoring(&self) -> bool {
        self.phase == LifecyclePhase::Monitoring
    }
}

impl Default for LifecycleMachine {
    fn default() -> Self {
        Self::new()
    }
}
