use crate::config::WatermarkConfig;
use crate::error::{Error, Result};
use ab_glyph::{FontArc, PxScale};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};
use lazy_static::lazy_static;

lazy_static! {
    static ref WATERMARK_FONT: Option<FontArc> =
        FontArc::try_from_slice(include_bytes!("assets/DejaVuSans-Bold.ttf")).ok();
}

const TEXT_COLOR: [f32; 3] = [255.0, 255.0, 255.0];
const SHADOW_COLOR: [f32; 3] = [0.0, 0.0, 0.0];
const SHADOW_OPACITY: f32 = 0.45;

/// Semi-transparent text mark in the bottom-right corner, sized relative to
/// the image width.
pub struct Watermark {
    font: FontArc,
    config: WatermarkConfig,
}

impl Watermark {
    pub fn new(config: WatermarkConfig) -> Result<Self> {
        let font = WATERMARK_FONT
            .clone()
            .ok_or_else(|| Error::Watermark("Embedded watermark font failed to load".into()))?;
        Ok(Self { font, config })
    }

    pub fn text(&self) -> &str {
        &self.config.text
    }

    pub fn font_px(&self, image_width: u32) -> f32 {
        (image_width as f32 * self.config.font_ratio).max(self.config.min_font_px)
    }

    /// Stamps `text` over a copy of `image`. A drop shadow sits under the
    /// white fill so the mark reads on light and dark backgrounds alike.
    pub fn stamp(&self, image: &RgbImage, text: &str) -> Result<RgbImage> {
        let mut output = image.clone();
        let text = text.trim();
        if text.is_empty() {
            return Ok(output);
        }

        let (width, height) = image.dimensions();
        let font_px = self.font_px(width);
        let scale = PxScale::from(font_px);
        let (text_w, text_h) = text_size(scale, &self.font, text);
        if text_w == 0 || text_h == 0 {
            return Err(Error::Watermark(format!("Watermark text {text:?} has no glyphs")));
        }
        let shadow = ((font_px / 16.0).round() as i64).max(1);

        // Coverage mask with a little slack for glyph overhang.
        let slack = (font_px / 4.0).ceil() as u32;
        let mut mask = GrayImage::new(text_w + slack * 2, text_h + slack * 2);
        draw_text_mut(&mut mask, Luma([255]), slack as i32, slack as i32, scale, &self.font, text);

        let padding = self.config.padding_px as i64;
        let origin_x = width as i64 - padding - shadow - text_w as i64 - slack as i64;
        let origin_y = height as i64 - padding - shadow - text_h as i64 - slack as i64;

        let opacity = self.config.opacity.clamp(0.0, 1.0);
        blend_mask(
            &mut output,
            &mask,
            origin_x + shadow,
            origin_y + shadow,
            SHADOW_COLOR,
            opacity * SHADOW_OPACITY,
        );
        blend_mask(&mut output, &mask, origin_x, origin_y, TEXT_COLOR, opacity);

        log::trace!("Watermarked {width}x{height} at {font_px:.1}px");
        Ok(output)
    }
}

fn blend_mask(
    image: &mut RgbImage,
    mask: &GrayImage,
    origin_x: i64,
    origin_y: i64,
    color: [f32; 3],
    opacity: f32,
) {
    let (width, height) = image.dimensions();
    for (mx, my, coverage) in mask.enumerate_pixels() {
        if coverage[0] == 0 {
            continue;
        }
        let x = origin_x + mx as i64;
        let y = origin_y + my as i64;
        if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
            continue;
        }
        let alpha = coverage[0] as f32 / 255.0 * opacity;
        let pixel = image.get_pixel_mut(x as u32, y as u32);
        let Rgb(channels) = *pixel;
        *pixel = Rgb(std::array::from_fn(|c| {
            let value = channels[c] as f32 * (1.0 - alpha) + color[c] * alpha;
            value.round().clamp(0.0, 255.0) as u8
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changed_pixels(a: &RgbImage, b: &RgbImage) -> Vec<(u32, u32)> {
        a.enumerate_pixels()
            .filter(|(x, y, p)| *p != b.get_pixel(*x, *y))
            .map(|(x, y, _)| (x, y))
            .collect()
    }

    #[test]
    fn font_scales_with_width() {
        let mark = Watermark::new(WatermarkConfig::default()).unwrap();
        assert!((mark.font_px(2000) - 70.0).abs() < 1e-3);
        assert_eq!(mark.font_px(100), 14.0);
    }

    #[test]
    fn mark_lands_in_bottom_right_corner() {
        let image = RgbImage::from_pixel(800, 600, Rgb([20, 20, 20]));
        let mark = Watermark::new(WatermarkConfig::default()).unwrap();
        let out = mark.stamp(&image, "Marketplace").unwrap();
        let changed = changed_pixels(&image, &out);
        assert!(!changed.is_empty());
        assert!(changed.iter().all(|&(x, y)| x >= 400 && y >= 500));
        assert!(changed.iter().all(|&(x, y)| x < 800 - 8 && y < 600 - 8));
        // White fill brightens the dark background.
        assert!(changed.iter().any(|&(x, y)| out.get_pixel(x, y)[0] > 100));
        assert_eq!(out.get_pixel(0, 0), image.get_pixel(0, 0));
    }

    #[test]
    fn shadow_shows_on_white_background() {
        let image = RgbImage::from_pixel(640, 480, Rgb([255, 255, 255]));
        let mark = Watermark::new(WatermarkConfig::default()).unwrap();
        let out = mark.stamp(&image, "Marketplace").unwrap();
        assert!(out.pixels().any(|p| p[0] < 240));
    }

    #[test]
    fn empty_text_leaves_image_unchanged() {
        let image = RgbImage::from_pixel(64, 64, Rgb([1, 2, 3]));
        let mark = Watermark::new(WatermarkConfig::default()).unwrap();
        assert_eq!(mark.stamp(&image, "   ").unwrap(), image);
    }

    #[test]
    fn tiny_images_do_not_panic() {
        let image = RgbImage::from_pixel(8, 8, Rgb([0, 0, 0]));
        let mark = Watermark::new(WatermarkConfig::default()).unwrap();
        let out = mark.stamp(&image, "Marketplace").unwrap();
        assert_eq!(out.dimensions(), (8, 8));
    }
}
