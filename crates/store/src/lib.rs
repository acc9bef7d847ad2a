//! Remote store capability for circuitwatch telemetry delivery.

pub mod http;
pub mod store;

pub use store::{MemoryStore, NullStore, RemoteStore, StoreError, StoreFuture};
