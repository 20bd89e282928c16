use crate::geometry::BoundingBox;
use serde::{Deserialize, Serialize};

/// A rectangle to blur. Detectors report these in original-upload pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionRegion {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl DetectionRegion {
    pub fn width(&self) -> f32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f32 {
        self.ymax - self.ymin
    }
}

impl From<BoundingBox> for DetectionRegion {
    fn from(b: BoundingBox) -> Self {
        Self {
            xmin: b.x_min,
            ymin: b.y_min,
            xmax: b.x_max,
            ymax: b.y_max,
        }
    }
}

/// One decoded model output column, in model input space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawCandidateBox {
    pub center_x: f32,
    pub center_y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl RawCandidateBox {
    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::from_center(self.center_x, self.center_y, self.width, self.height)
    }
}

/// Record of the letterbox resize, used to map model-space boxes back onto
/// the image that was fed to the detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxTransform {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub original_width: u32,
    pub original_height: u32,
}

impl LetterboxTransform {
    /// Model space to original pixels. The result is not clamped.
    pub fn invert(&self, candidate: &RawCandidateBox) -> BoundingBox {
        let x = (candidate.center_x - self.pad_x) / self.scale;
        let y = (candidate.center_y - self.pad_y) / self.scale;
        let w = candidate.width / self.scale;
        let h = candidate.height / self.scale;
        BoundingBox::from_center(x, y, w, h)
    }

    pub fn clamp(&self, b: &BoundingBox) -> BoundingBox {
        b.clamp(self.original_width as f32, self.original_height as f32)
    }
}

/// The pipeline's own resize-to-bounds. Maps regions from original-upload
/// pixels onto the working raster. Never confuse with `LetterboxTransform`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownscaleTransform {
    pub scale_x: f32,
    pub scale_y: f32,
    pub source_width: u32,
    pub source_height: u32,
    pub target_width: u32,
    pub target_height: u32,
}

impl DownscaleTransform {
    /// Fits `width x height` inside `max_width x max_height`, keeping the aspect
    /// ratio. Images already within bounds are never upscaled.
    pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> Self {
        let ratio = (max_width as f64 / width.max(1) as f64)
            .min(max_height as f64 / height.max(1) as f64)
            .min(1.0);
        let (target_width, target_height) = if ratio >= 1.0 {
            (width, height)
        } else {
            (
                ((width as f64 * ratio).round() as u32).max(1),
                ((height as f64 * ratio).round() as u32).max(1),
            )
        };
        Self {
            scale_x: target_width as f32 / width.max(1) as f32,
            scale_y: target_height as f32 / height.max(1) as f32,
            source_width: width,
            source_height: height,
            target_width,
            target_height,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.source_width == self.target_width && self.source_height == self.target_height
    }

    /// Maps a region onto the working raster; `None` if nothing is left of it.
    pub fn apply(&self, region: &DetectionRegion) -> Option<DetectionRegion> {
        let scaled = BoundingBox::new(
            region.xmin * self.scale_x,
            region.ymin * self.scale_y,
            region.xmax * self.scale_x,
            region.ymax * self.scale_y,
        )
        .clamp(self.target_width as f32, self.target_height as f32);
        if scaled.width() <= 0.0 || scaled.height() <= 0.0 {
            return None;
        }
        Some(scaled.into())
    }
}

/// Output of one pipeline run. Regions are in working-raster pixels.
#[derive(Debug, Clone)]
pub struct ProcessedPhoto {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub regions: Vec<DetectionRegion>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PhotoOutcome {
    pub input: String,
    pub url: Option<String>,
    pub regions: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BatchReport {
    pub processed: usize,
    pub failed: usize,
    pub outcomes: Vec<PhotoOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downscale_never_upscales() {
        let t = DownscaleTransform::fit_within(800, 600, 1920, 1080);
        assert!(t.is_identity());
        assert_eq!(t.scale_x, 1.0);
    }

    #[test]
    fn downscale_fits_the_tighter_bound() {
        let t = DownscaleTransform::fit_within(4000, 3000, 1920, 1080);
        assert_eq!((t.target_width, t.target_height), (1440, 1080));
        let region = DetectionRegion {
            xmin: 1000.0,
            ymin: 2000.0,
            xmax: 1400.0,
            ymax: 2100.0,
        };
        let mapped = t.apply(&region).unwrap();
        assert!((mapped.xmin - 360.0).abs() < 1e-3);
        assert!((mapped.ymin - 720.0).abs() < 1e-3);
        assert!((mapped.xmax - 504.0).abs() < 1e-3);
        assert!((mapped.ymax - 756.0).abs() < 1e-3);
    }

    #[test]
    fn downscale_drops_regions_outside_target() {
        let t = DownscaleTransform::fit_within(200, 100, 100, 50);
        let region = DetectionRegion {
            xmin: 250.0,
            ymin: 10.0,
            xmax: 300.0,
            ymax: 20.0,
        };
        assert_eq!(t.apply(&region), None);
    }

    #[test]
    fn letterbox_invert_is_unclamped() {
        let t = LetterboxTransform {
            scale: 0.5,
            pad_x: 0.0,
            pad_y: 140.0,
            original_width: 1280,
            original_height: 720,
        };
        let full = RawCandidateBox {
            center_x: 320.0,
            center_y: 320.0,
            width: 640.0,
            height: 640.0,
            confidence: 0.9,
        };
        let raw = t.invert(&full);
        assert_eq!(raw.y_min, -280.0);
        let clamped = t.clamp(&raw);
        assert_eq!(clamped, BoundingBox::new(0.0, 0.0, 1280.0, 720.0));
    }
}
