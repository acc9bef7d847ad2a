pub mod classifier;

pub use classifier::{AnomalyClassifier, Classification, FaultFlags, Thresholds};
