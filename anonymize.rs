use crate::config::AnonymizeConfig;
use crate::models::DetectionRegion;
use image::{imageops, RgbImage};
use imageproc::filter::gaussian_blur_f32;

/// Returns a copy of `image` with every region blurred. Regions are in pixels of
/// `image`. A region that cannot be cut out is skipped on its own.
pub fn anonymize(image: &RgbImage, regions: &[DetectionRegion], config: &AnonymizeConfig) -> RgbImage {
    let mut output = image.clone();
    let mut blurred = 0;
    for region in regions {
        let Some((x, y, w, h)) = pixel_rect(region, image.width(), image.height()) else {
            log::debug!("Skipping degenerate region {region:?}");
            continue;
        };
        let patch = imageops::crop_imm(&output, x, y, w, h).to_image();
        let patch = gaussian_blur_f32(&patch, config.blur_sigma);
        imageops::replace(&mut output, &patch, x as i64, y as i64);
        blurred += 1;
    }
    log::debug!("Blurred {blurred} of {} regions", regions.len());
    output
}

/// Snaps a region outward to whole pixels and clips it to the image.
fn pixel_rect(region: &DetectionRegion, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let coords = [region.xmin, region.ymin, region.xmax, region.ymax];
    if !coords.iter().all(|v| v.is_finite()) {
        return None;
    }
    let x0 = region.xmin.floor().clamp(0.0, width as f32) as u32;
    let y0 = region.ymin.floor().clamp(0.0, height as f32) as u32;
    let x1 = region.xmax.ceil().clamp(0.0, width as f32) as u32;
    let y1 = region.ymax.ceil().clamp(0.0, height as f32) as u32;
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some((x0, y0, x1 - x0, y1 - y0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn checkerboard(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    fn variance(image: &RgbImage, x0: u32, y0: u32, x1: u32, y1: u32) -> f64 {
        let values: Vec<f64> = (y0..y1)
            .flat_map(|y| (x0..x1).map(move |x| (x, y)))
            .map(|(x, y)| image.get_pixel(x, y)[0] as f64)
            .collect();
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
    }

    fn region(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> DetectionRegion {
        DetectionRegion {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    #[test]
    fn blur_destroys_high_frequency_detail() {
        let image = checkerboard(100, 80);
        let out = anonymize(&image, &[region(20.0, 20.0, 70.0, 50.0)], &AnonymizeConfig::default());
        let before = variance(&image, 20, 20, 70, 50);
        let after = variance(&out, 20, 20, 70, 50);
        assert!(after < before * 0.1, "variance {before} -> {after}");
    }

    #[test]
    fn pixels_outside_regions_are_untouched() {
        let image = checkerboard(100, 80);
        let out = anonymize(&image, &[region(20.0, 20.0, 70.0, 50.0)], &AnonymizeConfig::default());
        for (x, y, pixel) in out.enumerate_pixels() {
            let inside = (20..70).contains(&x) && (20..50).contains(&y);
            if !inside {
                assert_eq!(pixel, image.get_pixel(x, y), "pixel ({x}, {y}) changed");
            }
        }
    }

    #[test]
    fn bad_region_does_not_stop_the_others() {
        let image = checkerboard(100, 80);
        let regions = [
            region(200.0, 200.0, 260.0, 240.0),
            region(f32::NAN, 0.0, 10.0, 10.0),
            region(30.0, 30.0, 30.0, 60.0),
            region(10.0, 10.0, 40.0, 40.0),
        ];
        let out = anonymize(&image, &regions, &AnonymizeConfig::default());
        assert!(variance(&out, 10, 10, 40, 40) < variance(&image, 10, 10, 40, 40) * 0.1);
        assert_eq!(out.get_pixel(80, 70), image.get_pixel(80, 70));
    }

    #[test]
    fn regions_past_the_edge_are_clipped() {
        let image = checkerboard(64, 64);
        let out = anonymize(&image, &[region(-10.0, 40.0, 30.0, 90.0)], &AnonymizeConfig::default());
        assert_eq!(out.dimensions(), (64, 64));
        assert!(variance(&out, 0, 40, 30, 64) < variance(&image, 0, 40, 30, 64) * 0.1);
    }

    #[test]
    fn fractional_bounds_snap_outward() {
        assert_eq!(
            pixel_rect(&region(10.4, 5.6, 20.2, 9.1), 100, 100),
            Some((10, 5, 11, 5))
        );
    }

    #[test]
    fn no_regions_returns_identical_copy() {
        let image = checkerboard(16, 16);
        assert_eq!(anonymize(&image, &[], &AnonymizeConfig::default()), image);
    }
}
