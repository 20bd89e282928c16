use crate::config::{DetectionMethod, PipelineConfig};
use crate::error::{Error, Result};
use crate::models::DetectionRegion;
use crate::onnx::SessionManager;
use crate::postprocess::{self, DecodeParams};
use crate::preprocess;
use crate::remote::RemoteDetector;
use image::RgbImage;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// What a detector gets to look at: the decoded upload at full resolution and
/// the raw upload bytes. Regions come back in pixels of `original`.
pub struct DetectionInput<'a> {
    pub original: &'a RgbImage,
    pub bytes: &'a [u8],
}

/// Letterbox, run the shared session, decode.
pub struct LocalModelDetector {
    sessions: Arc<SessionManager>,
    params: DecodeParams,
    input_size: u32,
}

impl LocalModelDetector {
    pub fn new(sessions: Arc<SessionManager>, config: &PipelineConfig) -> Self {
        Self {
            sessions,
            params: DecodeParams::from_config(config),
            input_size: config.model_input_size,
        }
    }

    pub fn detect(&self, image: &RgbImage) -> Result<Vec<DetectionRegion>> {
        let session = self.sessions.session()?;
        let (tensor, transform) = preprocess::prepare(image, self.input_size)?;
        let raw = session.run(tensor)?;
        postprocess::decode(&raw, &transform, &self.params)
    }
}

pub enum DetectionStrategy {
    None,
    RemoteApi(RemoteDetector),
    LocalModel(LocalModelDetector),
}

impl DetectionStrategy {
    /// Resolved once at startup. `sessions` is only used by the local model.
    pub fn from_config(config: &PipelineConfig, sessions: Arc<SessionManager>) -> Self {
        let method = config.resolved_method();
        let strategy = match method {
            DetectionMethod::None => Self::None,
            DetectionMethod::LocalModel => {
                Self::LocalModel(LocalModelDetector::new(sessions, config))
            }
            DetectionMethod::RemoteApi => {
                match RemoteDetector::new(&config.remote, &config.anonymize) {
                    Ok(detector) => Self::RemoteApi(detector),
                    Err(err) => {
                        log::warn!("Remote plate detection disabled: {err}");
                        Self::None
                    }
                }
            }
        };
        log::info!("Plate detection method: {}", strategy.method());
        strategy
    }

    pub fn method(&self) -> DetectionMethod {
        match self {
            Self::None => DetectionMethod::None,
            Self::RemoteApi(_) => DetectionMethod::RemoteApi,
            Self::LocalModel(_) => DetectionMethod::LocalModel,
        }
    }

    /// Never fails. Any detector error or panic is logged and reported as
    /// "no plates found", so the photo still publishes (unblurred).
    pub fn detect(&self, input: &DetectionInput<'_>) -> Vec<DetectionRegion> {
        let result = match catch_unwind(AssertUnwindSafe(|| self.try_detect(input))) {
            Ok(res) => res,
            Err(_) => Err(Error::Inference("Detector panicked".into())),
        };
        match result {
            Ok(regions) => regions,
            Err(err) => {
                match err {
                    Error::ModelUnavailable(_) => {
                        log::debug!("Skipping plate detection: {err}")
                    }
                    _ if err.is_detection_failure() => {
                        log::warn!("Plate detection failed ({}): {err}", self.method())
                    }
                    _ => log::error!("Unexpected plate detection error ({}): {err}", self.method()),
                }
                Vec::new()
            }
        }
    }

    pub fn try_detect(&self, input: &DetectionInput<'_>) -> Result<Vec<DetectionRegion>> {
        match self {
            Self::None => Ok(Vec::new()),
            Self::RemoteApi(remote) => {
                let (width, height) = input.original.dimensions();
                remote.detect(input.bytes, width, height)
            }
            Self::LocalModel(local) => local.detect(input.original),
        }
    }
}
