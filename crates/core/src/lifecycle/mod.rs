mod phase;
mod retry;
pub mod startup;

pub use phase::{LifecycleMachine, LifecyclePhase};
pub use retry::RetryPolicy;
pub use startup::{BootReport, StartupDeps, boot};
