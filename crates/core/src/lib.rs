pub mod clock;
pub mod config;
pub mod delivery;
pub mod detection;
pub mod display;
pub mod error;
pub mod lifecycle;
pub mod network;
pub mod runtime;
pub mod sensing;
pub mod types;
