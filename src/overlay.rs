// Overlay compositor: perspective-warp an RGBA part (a wheel, a spoiler) onto
// the base photo and alpha-blend it in.
// Visual expectation: the wheel image appears stretched into the four points
// the user picked; everything outside that quad is the untouched base photo.

use image::Rgba;
use nalgebra::Matrix3;
use tracing::debug;

use crate::error::{Error, Result};
use crate::homography::{estimate_homography, project};
use crate::types::{ColorImage, OverlayImage, Point, Quad, corner_quad};

// Sample coordinates this close to a pixel center are treated as exact, so
// pure translations do not pick up interpolation noise.
const SNAP: f64 = 1e-6;

/// Overlay `overlay` so its corners land on `dst`
/// (top-left, top-right, bottom-right, bottom-left).
pub fn overlay_wheel(base: &ColorImage, overlay: &OverlayImage, dst: &Quad) -> Result<ColorImage> {
    let src = corner_quad(overlay.width(), overlay.height());
    overlay_quad(base, overlay, &src, dst)
}

/// Overlay with explicit source points: `src[i]` in overlay pixels maps to
/// `dst[i]` in base pixels. Useful when the part sits inside a larger sprite.
pub fn overlay_quad(base: &ColorImage, overlay: &OverlayImage, src: &Quad, dst: &Quad) -> Result<ColorImage> {
    // 1) Empty buffers cannot be warped or blended.
    if base.width() == 0 || base.height() == 0 || overlay.width() == 0 || overlay.height() == 0 {
        return Err(Error::InvalidRequest("overlay: images must be at least 1x1".into()));
    }

    // 2) Source -> destination map, then its inverse for backward sampling.
    let h = estimate_homography(src, dst)?;
    debug!(?dst, "overlay homography {:?}", h);

    // 3) Warp into a canvas the size of the base, then blend.
    let warped = warp_perspective(overlay, &h, base.width(), base.height())?;
    let mut out = base.clone();
    composite_in_place(&mut out, &warped)?;
    Ok(out)
}

/// Warp `src` through `h` (source -> destination) into a `width x height`
/// canvas. Destination pixels that map outside the source stay fully
/// transparent; nothing is clamped or wrapped from the source borders.
pub fn warp_perspective(src: &OverlayImage, h: &Matrix3<f64>, width: u32, height: u32) -> Result<OverlayImage> {
    let inv = h
        .try_inverse()
        .ok_or_else(|| Error::DegenerateQuad("homography not invertible".into()))?;

    let mut dst = OverlayImage::new(width, height); // all zero = transparent
    for (x, y, px) in dst.enumerate_pixels_mut() {
        let Some(p) = project(&inv, Point::new(x as f64, y as f64)) else {
            continue; // maps to infinity: nothing of the source lands here
        };
        if let Some(sample) = sample_bilinear(src, snap(p.x), snap(p.y)) {
            *px = sample;
        }
    }
    Ok(dst)
}

/// Blend `warped` over `base`: `out = base*(1-a) + color*a`, `a = alpha/255`.
pub fn composite_in_place(base: &mut ColorImage, warped: &OverlayImage) -> Result<()> {
    if base.dimensions() != warped.dimensions() {
        return Err(Error::InvalidRequest("composite: dimension mismatch".into()));
    }

    for (b, w) in base.pixels_mut().zip(warped.pixels()) {
        let a = w[3];
        if a == 0 {
            continue; // keep the base exactly
        }
        if a == 255 {
            b.0 = [w[0], w[1], w[2]];
            continue;
        }
        let a = a as f32 / 255.0;
        let inv = 1.0 - a;
        for c in 0..3 {
            let v = b[c] as f32 * inv + w[c] as f32 * a;
            b[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    Ok(())
}

#[inline]
fn snap(v: f64) -> f64 {
    let r = v.round();
    if (v - r).abs() < SNAP { r } else { v }
}

/// Bilinear sample at a fractional position. Only positions inside the
/// overlay's pixel grid, `[0, w-1] x [0, h-1]`, are sampled; anything past
/// the outermost pixel centers is transparent, so the warp never paints a
/// fringe beyond the quad. Color is interpolated alpha-weighted so
/// transparent taps never tint the result. `None` when nothing opaque is hit.
fn sample_bilinear(img: &OverlayImage, x: f64, y: f64) -> Option<Rgba<u8>> {
    let (w, h) = (img.width() as f64, img.height() as f64);
    let (max_x, max_y) = (w - 1.0, h - 1.0);
    if !x.is_finite() || !y.is_finite() || x < -SNAP || y < -SNAP || x > max_x + SNAP || y > max_y + SNAP {
        return None;
    }
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);

    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let taps = [
        (x0, y0, (1.0 - fx) * (1.0 - fy)),
        (x0 + 1.0, y0, fx * (1.0 - fy)),
        (x0, y0 + 1.0, (1.0 - fx) * fy),
        (x0 + 1.0, y0 + 1.0, fx * fy),
    ];

    let mut acc_a = 0.0f64;
    let mut acc_c = [0.0f64; 3];
    for (tx, ty, wt) in taps {
        if wt <= 0.0 || tx < 0.0 || ty < 0.0 || tx >= w || ty >= h {
            continue;
        }
        let p = img.get_pixel(tx as u32, ty as u32);
        let wa = wt * p[3] as f64;
        acc_a += wa;
        for c in 0..3 {
            acc_c[c] += wa * p[c] as f64;
        }
    }
    if acc_a <= 0.0 {
        return None;
    }

    let to_u8 = |v: f64| v.round().clamp(0.0, 255.0) as u8;
    Some(Rgba([
        to_u8(acc_c[0] / acc_a),
        to_u8(acc_c[1] / acc_a),
        to_u8(acc_c[2] / acc_a),
        to_u8(acc_a),
    ]))
}
