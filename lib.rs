pub mod anonymize;
pub mod config;
pub mod detection;
pub mod error;
pub mod geometry;
pub mod jobs;
pub mod models;
pub mod onnx;
pub mod pipeline;
pub mod postprocess;
pub mod preprocess;
pub mod raster;
pub mod remote;
pub mod storage;
pub mod watermark;

pub use config::{DetectionMethod, PipelineConfig};
pub use error::{Error, Result};
pub use models::{BatchReport, DetectionRegion, ProcessedPhoto};
pub use pipeline::Pipeline;
