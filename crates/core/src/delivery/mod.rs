pub mod probe;
pub mod reliability;
pub mod uploader;

pub use probe::{ProbeReport, self_test};
pub use reliability::{SuccessRateReport, UploadReliabilityController};
pub use uploader::TelemetryUploader;
