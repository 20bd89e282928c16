use crate::config::{AnonymizeConfig, PipelineConfig};
use crate::error::{Error, Result};
use crate::geometry::{nms, BoundingBox};
use crate::models::{DetectionRegion, LetterboxTransform, RawCandidateBox};
use crate::onnx::RawOutput;

/// Values per candidate column: center-x, center-y, width, height, confidence.
pub const VALUES_PER_CANDIDATE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeParams {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub margin_ratio: f32,
    pub min_margin_px: f32,
    pub min_region_px: f32,
}

impl DecodeParams {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            confidence_threshold: config.confidence_threshold,
            iou_threshold: config.iou_threshold,
            margin_ratio: config.anonymize.margin_ratio,
            min_margin_px: config.anonymize.min_margin_px,
            min_region_px: config.anonymize.min_region_px,
        }
    }
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

/// Turns a `1x5xN` detector output into regions in original-image pixels.
pub fn decode(
    raw: &RawOutput,
    transform: &LetterboxTransform,
    params: &DecodeParams,
) -> Result<Vec<DetectionRegion>> {
    let candidates = candidates_above(raw, params.confidence_threshold)?;
    let total = candidates.len();
    let kept = nms(candidates, params.iou_threshold);

    let margins = Margins::from(params);
    let regions: Vec<DetectionRegion> = kept
        .iter()
        .filter_map(|candidate| {
            let clamped = transform.clamp(&transform.invert(candidate));
            finalize_box(
                &clamped,
                transform.original_width,
                transform.original_height,
                &margins,
            )
        })
        .collect();

    log::debug!(
        "Plate candidates: {total} above threshold, {} after NMS, {} regions",
        kept.len(),
        regions.len()
    );
    Ok(regions)
}

/// Reads candidates out of the channel-major output, keeping those whose
/// confidence is strictly above `threshold`.
pub fn candidates_above(raw: &RawOutput, threshold: f32) -> Result<Vec<RawCandidateBox>> {
    let count = match raw.shape.as_slice() {
        [1, VALUES_PER_CANDIDATE, n] => *n,
        other => {
            return Err(Error::Inference(format!(
                "Unexpected detector output shape {other:?}; expected [1, 5, N]"
            )))
        }
    };
    if raw.data.len() < VALUES_PER_CANDIDATE * count {
        return Err(Error::Inference(format!(
            "Detector output holds {} values, shape requires {}",
            raw.data.len(),
            VALUES_PER_CANDIDATE * count
        )));
    }

    let at = |k: usize, i: usize| raw.data[k * count + i];
    let mut candidates = Vec::new();
    for i in 0..count {
        let confidence = at(4, i);
        if !confidence.is_finite() || confidence <= threshold {
            continue;
        }
        let candidate = RawCandidateBox {
            center_x: at(0, i),
            center_y: at(1, i),
            width: at(2, i),
            height: at(3, i),
            confidence,
        };
        if [candidate.center_x, candidate.center_y, candidate.width, candidate.height]
            .iter()
            .all(|v| v.is_finite())
        {
            candidates.push(candidate);
        }
    }
    Ok(candidates)
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Margins {
    pub ratio: f32,
    pub min_px: f32,
    pub min_region_px: f32,
}

impl From<&DecodeParams> for Margins {
    fn from(params: &DecodeParams) -> Self {
        Self {
            ratio: params.margin_ratio,
            min_px: params.min_margin_px,
            min_region_px: params.min_region_px,
        }
    }
}

impl From<&AnonymizeConfig> for Margins {
    fn from(config: &AnonymizeConfig) -> Self {
        Self {
            ratio: config.margin_ratio,
            min_px: config.min_margin_px,
            min_region_px: config.min_region_px,
        }
    }
}

/// Drops boxes under the minimum extent, pads the rest outward by a margin
/// proportional to their width and clamps to the image again.
pub(crate) fn finalize_box(
    clamped: &BoundingBox,
    width: u32,
    height: u32,
    margins: &Margins,
) -> Option<DetectionRegion> {
    if clamped.width() < margins.min_region_px || clamped.height() < margins.min_region_px {
        return None;
    }
    let margin = (clamped.width() * margins.ratio).max(margins.min_px);
    let padded = clamped.expand(margin).clamp(width as f32, height as f32);
    if padded.width() < margins.min_region_px || padded.height() < margins.min_region_px {
        return None;
    }
    Some(padded.into())
}
