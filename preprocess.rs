use crate::error::{Error, Result};
use crate::models::LetterboxTransform;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ndarray::{Array, Array4};

/// Fill for the letterbox border. The detector was trained on YOLO-style
/// letterboxing, which pads with RGB (114, 114, 114).
pub const LETTERBOX_FILL: [u8; 3] = [114, 114, 114];

/// Letterboxes `image` into a `target x target` square and packs it as a
/// `1x3xTxT` tensor of `[0, 1]` floats in channel-major order.
///
/// Padding is split with integer floor division, so when the leftover is odd
/// the extra pixel lands on the right or bottom edge.
pub fn prepare(image: &RgbImage, target: u32) -> Result<(Array4<f32>, LetterboxTransform)> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || target == 0 {
        return Err(Error::Preprocess(format!(
            "Cannot letterbox {width}x{height} image into {target}x{target}"
        )));
    }

    let scale = (target as f32 / width as f32).min(target as f32 / height as f32);
    let scaled_width = ((width as f32 * scale).round() as u32).clamp(1, target);
    let scaled_height = ((height as f32 * scale).round() as u32).clamp(1, target);
    let pad_x = (target - scaled_width) / 2;
    let pad_y = (target - scaled_height) / 2;

    let resized = imageops::resize(image, scaled_width, scaled_height, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(target, target, Rgb(LETTERBOX_FILL));
    imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    let input = rgb8_to_nchw(&canvas, target, target);
    let tensor = Array::from_shape_vec((1, 3, target as usize, target as usize), input)
        .map_err(|e| Error::Preprocess(format!("Invalid detection tensor shape: {e}")))?;

    log::debug!(
        "Letterboxed {width}x{height} -> {scaled_width}x{scaled_height} (scale {scale:.4}, pad {pad_x},{pad_y})"
    );

    Ok((
        tensor,
        LetterboxTransform {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
            original_width: width,
            original_height: height,
        },
    ))
}

fn rgb8_to_nchw(img: &RgbImage, w: u32, h: u32) -> Vec<f32> {
    let plane = (w * h) as usize;
    let mut input = vec![0.0; plane * 3];
    for (x, y, pixel) in img.enumerate_pixels() {
        let idx = (y * w + x) as usize;
        input[idx] = pixel[0] as f32 / 255.0;
        input[idx + plane] = pixel[1] as f32 / 255.0;
        input[idx + plane * 2] = pixel[2] as f32 / 255.0;
    }
    input
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landscape_image_is_padded_vertically() {
        let img = RgbImage::from_pixel(1280, 720, Rgb([255, 0, 0]));
        let (tensor, transform) = prepare(&img, 640).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert_eq!(transform.scale, 0.5);
        assert_eq!(transform.pad_x, 0.0);
        assert_eq!(transform.pad_y, 140.0);
        assert_eq!((transform.original_width, transform.original_height), (1280, 720));

        let fill = LETTERBOX_FILL[0] as f32 / 255.0;
        assert!((tensor[[0, 0, 10, 320]] - fill).abs() < 1e-6);
        assert!((tensor[[0, 0, 320, 320]] - 1.0).abs() < 0.01);
        assert!(tensor[[0, 1, 320, 320]].abs() < 0.01);
        assert!(tensor[[0, 2, 320, 320]].abs() < 0.01);
    }

    #[test]
    fn odd_padding_puts_extra_row_at_bottom() {
        // 640x427 scales to 640x427 exactly, leaving 213 rows: 106 on top, 107 below.
        let img = RgbImage::from_pixel(640, 427, Rgb([0, 0, 0]));
        let (tensor, transform) = prepare(&img, 640).unwrap();
        assert_eq!(transform.pad_y, 106.0);
        let fill = LETTERBOX_FILL[0] as f32 / 255.0;
        assert!((tensor[[0, 0, 105, 0]] - fill).abs() < 1e-6);
        assert!(tensor[[0, 0, 106, 0]].abs() < 0.01);
        assert!(tensor[[0, 0, 532, 0]].abs() < 0.01);
        assert!((tensor[[0, 0, 533, 0]] - fill).abs() < 1e-6);
    }

    #[test]
    fn portrait_image_is_padded_horizontally() {
        let img = RgbImage::from_pixel(960, 1280, Rgb([10, 20, 30]));
        let (_, transform) = prepare(&img, 640).unwrap();
        assert_eq!(transform.scale, 0.5);
        assert_eq!(transform.pad_x, 80.0);
        assert_eq!(transform.pad_y, 0.0);
    }

    #[test]
    fn values_are_normalized() {
        let img = RgbImage::from_pixel(64, 64, Rgb([255, 128, 0]));
        let (tensor, _) = prepare(&img, 640).unwrap();
        assert!(tensor.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn empty_image_is_rejected() {
        let img = RgbImage::new(0, 0);
        assert!(matches!(prepare(&img, 640), Err(Error::Preprocess(_))));
    }
}
