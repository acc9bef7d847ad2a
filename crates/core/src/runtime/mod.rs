mod loop_control;
mod monitor;
mod shutdown;

pub use loop_control::IntervalGate;
pub use monitor::{Monitor, MonitorParts, TickReport};
pub use shutdown::ShutdownGuard;
