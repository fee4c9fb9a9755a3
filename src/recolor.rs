// Recolorer: shift hue/saturation/value inside a mask, leave the rest alone.
// Visual expectation: the car body changes paint color, background and any
// pixel outside the mask stay byte-identical.

use tracing::debug;

use crate::error::{Error, Result};
use crate::hsv::{HUE_RANGE, HsvTables, hsv_to_rgb};
use crate::types::{ColorImage, MaskImage};

/// Apply the three deltas to one 8-bit HSV pixel.
///
/// Hue wraps into `0..180`; saturation and value are scaled by `1 + delta`
/// and clamped to `0..=255`. Results truncate toward zero.
#[inline]
pub fn adjust_hsv(hsv: [u8; 3], delta_hue: f32, delta_saturation: f32, delta_value: f32) -> [u8; 3] {
    let mut h = (hsv[0] as f32 + delta_hue).rem_euclid(HUE_RANGE);
    if h >= HUE_RANGE {
        h = 0.0; // rem_euclid can round up to the range for tiny negatives
    }
    let s = (hsv[1] as f32 * (1.0 + delta_saturation)).clamp(0.0, 255.0);
    let v = (hsv[2] as f32 * (1.0 + delta_value)).clamp(0.0, 255.0);
    [h as u8, s as u8, v as u8]
}

/// Recolor the masked region of `image`.
///
/// Any mask value > 0 counts as inside. Pixels whose HSV triple does not
/// change keep their original color, so zero deltas return the input
/// unchanged even though the 8-bit HSV round trip is lossy.
pub fn recolor(
    image: &ColorImage,
    mask: &MaskImage,
    delta_hue: f32,
    delta_saturation: f32,
    delta_value: f32,
) -> Result<ColorImage> {
    // 1) Sizes must agree; we never crop or pad a mask.
    if image.dimensions() != mask.dimensions() {
        return Err(Error::ShapeMismatch {
            image_w: image.width(),
            image_h: image.height(),
            mask_w: mask.width(),
            mask_h: mask.height(),
        });
    }

    let tables = HsvTables::shared();
    let mut out = image.clone();
    let mut touched = 0usize;

    // 2) Per pixel select: recolored where mask > 0, original elsewhere.
    for (px, m) in out.pixels_mut().zip(mask.pixels()) {
        if m[0] == 0 {
            continue;
        }
        let hsv = tables.rgb_to_hsv(px.0);
        let shifted = adjust_hsv(hsv, delta_hue, delta_saturation, delta_value);
        if shifted == hsv {
            continue;
        }
        px.0 = hsv_to_rgb(shifted);
        touched += 1;
    }

    debug!(
        dh = delta_hue,
        ds = delta_saturation,
        dv = delta_value,
        touched,
        "recolored {}x{} image",
        image.width(),
        image.height()
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    fn gradient(w: u32, h: u32) -> ColorImage {
        ColorImage::from_fn(w, h, |x, y| Rgb([(x * 37 % 256) as u8, (y * 53 % 256) as u8, ((x + y) * 11 % 256) as u8]))
    }

    #[test]
    fn zero_deltas_are_identity() {
        let img = gradient(16, 9);
        let mask = MaskImage::from_pixel(16, 9, Luma([255]));
        assert_eq!(recolor(&img, &mask, 0.0, 0.0, 0.0).unwrap(), img);
    }

    #[test]
    fn hue_wraps_modulo_180() {
        assert_eq!(adjust_hsv([170, 10, 10], 20.0, 0.0, 0.0)[0], 10);
        assert_eq!(adjust_hsv([10, 10, 10], -20.0, 0.0, 0.0)[0], 170);
        for h in [0u8, 1, 89, 179] {
            assert_eq!(adjust_hsv([h, 100, 100], 180.0, 0.7, -0.3)[0], h);
            assert_eq!(adjust_hsv([h, 100, 100], -360.0, 0.0, 0.0)[0], h);
        }
    }

    #[test]
    fn saturation_and_value_clamp() {
        assert_eq!(adjust_hsv([0, 200, 200], 0.0, 1.0, -2.0), [0, 255, 0]);
        assert_eq!(adjust_hsv([0, 100, 100], 0.0, 0.5, 0.25), [0, 150, 125]);
    }

    #[test]
    fn unmasked_pixels_are_untouched() {
        let img = ColorImage::from_pixel(4, 4, Rgb([255, 0, 0]));
        let mut mask = MaskImage::new(4, 4);
        mask.put_pixel(1, 1, Luma([7])); // any positive value counts
        let out = recolor(&img, &mask, 60.0, 0.0, 0.0).unwrap();
        assert_eq!(out.get_pixel(1, 1), &Rgb([0, 255, 0]));
        assert_eq!(out.get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert_eq!(out.get_pixel(3, 2), &Rgb([255, 0, 0]));
    }

    #[test]
    fn mismatched_mask_is_rejected() {
        let img = gradient(8, 8);
        let mask = MaskImage::new(8, 7);
        let err = recolor(&img, &mask, 10.0, 0.0, 0.0).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { mask_h: 7, .. }));
    }
}
