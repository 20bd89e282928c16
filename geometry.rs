//! Axis-aligned boxes, Intersection-over-Union and non-maximum suppression.

use crate::models::RawCandidateBox;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BoundingBox {
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    pub fn from_center(center_x: f32, center_y: f32, width: f32, height: f32) -> Self {
        Self {
            x_min: center_x - width / 2.0,
            y_min: center_y - height / 2.0,
            x_max: center_x + width / 2.0,
            y_max: center_y + height / 2.0,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x_max - self.x_min).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y_max - self.y_min).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn clamp(&self, width: f32, height: f32) -> Self {
        Self {
            x_min: self.x_min.clamp(0.0, width),
            y_min: self.y_min.clamp(0.0, height),
            x_max: self.x_max.clamp(0.0, width),
            y_max: self.y_max.clamp(0.0, height),
        }
    }

    /// Grows the box by `margin` on every side.
    pub fn expand(&self, margin: f32) -> Self {
        Self {
            x_min: self.x_min - margin,
            y_min: self.y_min - margin,
            x_max: self.x_max + margin,
            y_max: self.y_max + margin,
        }
    }

    pub fn intersection(&self, other: &Self) -> f32 {
        let x1 = self.x_min.max(other.x_min);
        let y1 = self.y_min.max(other.y_min);
        let x2 = self.x_max.min(other.x_max);
        let y2 = self.y_max.min(other.y_max);
        (x2 - x1).max(0.0) * (y2 - y1).max(0.0)
    }
}

/// Returns 0.0 when the union is empty.
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let intersection = a.intersection(b);
    let union = a.area() + b.area() - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Greedy NMS. Candidates are ordered by confidence with a stable sort, so
/// equal-confidence duplicates keep the one that came first in the input.
/// A candidate is dropped when its IoU with a kept box exceeds `iou_threshold`.
pub fn nms(mut pending: Vec<RawCandidateBox>, iou_threshold: f32) -> Vec<RawCandidateBox> {
    pending.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<RawCandidateBox> = Vec::new();
    while !pending.is_empty() {
        let best = pending.remove(0);
        let best_box = best.bounds();
        pending.retain(|candidate| iou(&best_box, &candidate.bounds()) <= iou_threshold);
        kept.push(best);
    }
    kept
}
