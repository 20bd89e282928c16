use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const ENV_DETECTION_METHOD: &str = "PLATE_BLUR_DETECTION_METHOD";
pub const ENV_MODEL_PATH: &str = "PLATE_BLUR_MODEL_PATH";
pub const ENV_CONFIDENCE_THRESHOLD: &str = "PLATE_BLUR_CONFIDENCE_THRESHOLD";
pub const ENV_IOU_THRESHOLD: &str = "PLATE_BLUR_IOU_THRESHOLD";
pub const ENV_WATERMARK_TEXT: &str = "PLATE_BLUR_WATERMARK_TEXT";
pub const ENV_REMOTE_TOKEN: &str = "PLATE_RECOGNIZER_TOKEN";
pub const ENV_REMOTE_URL: &str = "PLATE_RECOGNIZER_URL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    None,
    RemoteApi,
    LocalModel,
}

impl DetectionMethod {
    /// An explicit setting always wins. Without one, a configured remote token
    /// selects the remote API and everything else runs the local model.
    pub fn resolve(configured: Option<Self>, remote_token: Option<&str>) -> Self {
        if let Some(method) = configured {
            return method;
        }
        match remote_token.map(str::trim) {
            Some(token) if !token.is_empty() => Self::RemoteApi,
            _ => Self::LocalModel,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::RemoteApi => "remote_api",
            Self::LocalModel => "local_model",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DetectionMethod {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "none" | "off" | "disabled" => Ok(Self::None),
            "remote" | "remote_api" | "api" => Ok(Self::RemoteApi),
            "local" | "local_model" | "onnx" => Ok(Self::LocalModel),
            other => Err(Error::Config(format!("Unknown detection method: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteApiConfig {
    #[serde(default = "default_remote_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_remote_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RemoteApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_remote_endpoint(),
            token: None,
            timeout_secs: default_remote_timeout_secs(),
        }
    }
}

impl RemoteApiConfig {
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

/// How aggressively detected plates are blurred. Larger margins and sigma
/// trade a bigger smudge for fewer readable plate fragments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnonymizeConfig {
    #[serde(default = "default_blur_sigma")]
    pub blur_sigma: f32,
    #[serde(default = "default_margin_ratio")]
    pub margin_ratio: f32,
    #[serde(default = "default_min_margin_px")]
    pub min_margin_px: f32,
    #[serde(default = "default_min_region_px")]
    pub min_region_px: f32,
}

impl Default for AnonymizeConfig {
    fn default() -> Self {
        Self {
            blur_sigma: default_blur_sigma(),
            margin_ratio: default_margin_ratio(),
            min_margin_px: default_min_margin_px(),
            min_region_px: default_min_region_px(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatermarkConfig {
    #[serde(default = "default_watermark_text")]
    pub text: String,
    #[serde(default = "default_font_ratio")]
    pub font_ratio: f32,
    #[serde(default = "default_min_font_px")]
    pub min_font_px: f32,
    #[serde(default = "default_padding_px")]
    pub padding_px: u32,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            text: default_watermark_text(),
            font_ratio: default_font_ratio(),
            min_font_px: default_min_font_px(),
            padding_px: default_padding_px(),
            opacity: default_opacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub detection_method: Option<DetectionMethod>,
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,
    #[serde(default = "default_model_input_size")]
    pub model_input_size: u32,
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,
    #[serde(default = "default_max_output_width")]
    pub max_output_width: u32,
    #[serde(default = "default_max_output_height")]
    pub max_output_height: u32,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default)]
    pub remote: RemoteApiConfig,
    #[serde(default)]
    pub anonymize: AnonymizeConfig,
    #[serde(default)]
    pub watermark: WatermarkConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detection_method: None,
            model_path: default_model_path(),
            model_input_size: default_model_input_size(),
            intra_threads: default_intra_threads(),
            confidence_threshold: default_confidence_threshold(),
            iou_threshold: default_iou_threshold(),
            max_output_width: default_max_output_width(),
            max_output_height: default_max_output_height(),
            jpeg_quality: default_jpeg_quality(),
            remote: RemoteApiConfig::default(),
            anonymize: AnonymizeConfig::default(),
            watermark: WatermarkConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Reads the optional JSON file, applies environment overrides and
    /// validates the result. Called once at startup.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)?;
                let parsed: Self = serde_json::from_str(&contents)?;
                log::info!("Loaded pipeline config from {}", path.display());
                parsed
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_DETECTION_METHOD) {
            self.detection_method = Some(value.parse()?);
        }
        if let Some(value) = lookup(ENV_MODEL_PATH) {
            self.model_path = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_CONFIDENCE_THRESHOLD) {
            self.confidence_threshold = parse_f32(ENV_CONFIDENCE_THRESHOLD, &value)?;
        }
        if let Some(value) = lookup(ENV_IOU_THRESHOLD) {
            self.iou_threshold = parse_f32(ENV_IOU_THRESHOLD, &value)?;
        }
        if let Some(value) = lookup(ENV_WATERMARK_TEXT) {
            self.watermark.text = value;
        }
        if let Some(value) = lookup(ENV_REMOTE_TOKEN) {
            self.remote.token = Some(value);
        }
        if let Some(value) = lookup(ENV_REMOTE_URL) {
            self.remote.endpoint = value;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("confidence_threshold", self.confidence_threshold),
            ("iou_threshold", self.iou_threshold),
            ("watermark.opacity", self.watermark.opacity),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!("{name} must be within [0, 1], got {value}")));
            }
        }
        if self.max_output_width == 0 || self.max_output_height == 0 {
            return Err(Error::Config("Output bounds must be positive".into()));
        }
        if self.model_input_size == 0 {
            return Err(Error::Config("model_input_size must be positive".into()));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(Error::Config(format!(
                "jpeg_quality must be within 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        if !(self.anonymize.blur_sigma > 0.0) {
            return Err(Error::Config("anonymize.blur_sigma must be positive".into()));
        }
        if self.anonymize.margin_ratio < 0.0 || self.anonymize.min_margin_px < 0.0 {
            return Err(Error::Config("Blur margins cannot be negative".into()));
        }
        Ok(())
    }

    pub fn resolved_method(&self) -> DetectionMethod {
        DetectionMethod::resolve(self.detection_method, self.remote.token())
    }
}

fn parse_f32(key: &str, value: &str) -> Result<f32> {
    value
        .trim()
        .parse::<f32>()
        .map_err(|e| Error::Config(format!("{key}={value}: {e}")))
}

fn default_model_path() -> PathBuf {
    PathBuf::from("models").join("license_plate_detector.onnx")
}

fn default_model_input_size() -> u32 {
    640
}

fn default_intra_threads() -> usize {
    1
}

fn default_confidence_threshold() -> f32 {
    0.25
}

fn default_iou_threshold() -> f32 {
    0.45
}

fn default_max_output_width() -> u32 {
    1920
}

fn default_max_output_height() -> u32 {
    1080
}

fn default_jpeg_quality() -> u8 {
    85
}

fn default_remote_endpoint() -> String {
    "https://api.platerecognizer.com/v1/plate-reader/".to_string()
}

fn default_remote_timeout_secs() -> u64 {
    10
}

fn default_blur_sigma() -> f32 {
    24.0
}

fn default_margin_ratio() -> f32 {
    0.10
}

fn default_min_margin_px() -> f32 {
    5.0
}

fn default_min_region_px() -> f32 {
    5.0
}

fn default_watermark_text() -> String {
    "Marketplace".to_string()
}

fn default_font_ratio() -> f32 {
    0.035
}

fn default_min_font_px() -> f32 {
    14.0
}

fn default_padding_px() -> u32 {
    16
}

fn default_opacity() -> f32 {
    0.6
}
