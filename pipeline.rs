use crate::anonymize::anonymize;
use crate::config::{DetectionMethod, PipelineConfig};
use crate::detection::{DetectionInput, DetectionStrategy};
use crate::error::Result;
use crate::models::{DownscaleTransform, ProcessedPhoto};
use crate::onnx::SessionManager;
use crate::raster;
use crate::watermark::Watermark;
use std::sync::Arc;
use std::time::Instant;

/// The only entry point for turning an upload into the image that gets
/// published: resize to bounds, detect plates, blur them, watermark, encode.
pub struct Pipeline {
    config: PipelineConfig,
    detector: DetectionStrategy,
    watermark: Watermark,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let sessions = Arc::new(SessionManager::from_config(&config));
        Self::with_sessions(config, sessions)
    }

    pub fn with_sessions(config: PipelineConfig, sessions: Arc<SessionManager>) -> Result<Self> {
        let detector = DetectionStrategy::from_config(&config, sessions);
        Self::with_detector(config, detector)
    }

    pub fn with_detector(config: PipelineConfig, detector: DetectionStrategy) -> Result<Self> {
        let watermark = Watermark::new(config.watermark.clone())?;
        Ok(Self {
            config,
            detector,
            watermark,
        })
    }

    pub fn detection_method(&self) -> DetectionMethod {
        self.detector.method()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn process(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(self.process_with_report(bytes)?.bytes)
    }

    pub fn process_with_report(&self, bytes: &[u8]) -> Result<ProcessedPhoto> {
        let start = Instant::now();
        let original = raster::decode(bytes)?;
        let (width, height) = original.dimensions();
        let transform = DownscaleTransform::fit_within(
            width,
            height,
            self.config.max_output_width,
            self.config.max_output_height,
        );
        let working = raster::downscale(&original, &transform);

        // Detection sees the full-resolution upload; its regions are mapped
        // onto the working raster exactly once, here.
        let detected = self.detector.detect(&DetectionInput {
            original: &original,
            bytes,
        });
        drop(original);
        let regions: Vec<_> = detected
            .iter()
            .filter_map(|region| transform.apply(region))
            .collect();

        let anonymized = anonymize(&working, &regions, &self.config.anonymize);
        let stamped = self.watermark.stamp(&anonymized, self.watermark.text())?;
        let encoded = raster::encode_jpeg(&stamped, self.config.jpeg_quality)?;

        log::info!(
            "Processed {width}x{height} -> {}x{}: {} plate regions blurred in {:?}",
            transform.target_width,
            transform.target_height,
            regions.len(),
            start.elapsed()
        );
        Ok(ProcessedPhoto {
            bytes: encoded,
            width: transform.target_width,
            height: transform.target_height,
            regions,
        })
    }
}
