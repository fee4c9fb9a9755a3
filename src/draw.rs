// Software drawing for placement guides.
// Visual: the base photo with the four picked points marked by crosshairs and
// joined by a thin outline, so a user can check the wheel quad before the
// overlay is rendered.

use image::Rgb;

use crate::types::{ColorImage, Point, Quad};

/// Guide color used when the caller does not pick one (warm yellow).
pub const GUIDE_COLOR: Rgb<u8> = Rgb([0xFF, 0xCC, 0x33]);

/// Put a pixel if (x,y) is inside bounds.
#[inline]
fn put_pixel(img: &mut ColorImage, x: i64, y: i64, color: Rgb<u8>) {
    if x < 0 || y < 0 || x >= img.width() as i64 || y >= img.height() as i64 {
        return;
    }
    img.put_pixel(x as u32, y as u32, color);
}

/// Thin line between (x0,y0) and (x1,y1) using Bresenham; clipped per pixel.
pub fn draw_line(img: &mut ColorImage, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgb<u8>) {
    let (mut x0, mut y0) = (x0, y0);
    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        put_pixel(img, x0, y0, color);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

/// Small "+" centered at (cx,cy) with a 1-pixel gap around the center dot.
pub fn draw_crosshair(img: &mut ColorImage, cx: i64, cy: i64, size: i64, color: Rgb<u8>) {
    draw_line(img, cx - size, cy, cx - 2, cy, color);
    draw_line(img, cx + 2, cy, cx + size, cy, color);
    draw_line(img, cx, cy - size, cx, cy - 2, color);
    draw_line(img, cx, cy + 2, cx, cy + size, color);
    put_pixel(img, cx, cy, color);
}

/// Cut the segment `a -> b` to the box `[0, max_x] x [0, max_y]`
/// (Liang-Barsky). The kept part lies on the original line; `None` when the
/// segment misses the box.
fn clip_segment(a: Point, b: Point, max_x: f64, max_y: f64) -> Option<(Point, Point)> {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    for (p, q) in [(-dx, a.x), (dx, max_x - a.x), (-dy, a.y), (dy, max_y - a.y)] {
        if p == 0.0 {
            if q < 0.0 {
                return None; // parallel to this edge and outside it
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }
    Some((
        Point::new(a.x + t0 * dx, a.y + t0 * dy),
        Point::new(a.x + t1 * dx, a.y + t1 * dy),
    ))
}

/// Segment between two sub-pixel points, clipped to the image first so far
/// away endpoints neither bend the line nor make Bresenham walk off screen.
pub fn draw_segment(img: &mut ColorImage, a: Point, b: Point, color: Rgb<u8>) {
    if img.width() == 0 || img.height() == 0 {
        return;
    }
    if ![a.x, a.y, b.x, b.y].iter().all(|v| v.is_finite()) {
        return;
    }
    let max_x = (img.width() - 1) as f64;
    let max_y = (img.height() - 1) as f64;
    if let Some((p, q)) = clip_segment(a, b, max_x, max_y) {
        draw_line(
            img,
            p.x.round() as i64,
            p.y.round() as i64,
            q.x.round() as i64,
            q.y.round() as i64,
            color,
        );
    }
}

/// Outline `quad` and mark each corner. Points off the image are clipped,
/// not rejected.
pub fn draw_quad_guide(img: &mut ColorImage, quad: &Quad, color: Rgb<u8>) {
    for i in 0..4 {
        draw_segment(img, quad[i], quad[(i + 1) % 4], color);
    }

    // crosshairs only where one can reach the image
    let size = (img.width().min(img.height()) as i64 / 20).clamp(3, 12);
    let reach = size as f64;
    let (w, h) = (img.width() as f64, img.height() as f64);
    for p in quad {
        if !p.x.is_finite() || !p.y.is_finite() {
            continue;
        }
        if p.x < -reach || p.y < -reach || p.x > w + reach || p.y > h + reach {
            continue;
        }
        draw_crosshair(img, p.x.round() as i64, p.y.round() as i64, size, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

    #[test]
    fn line_hits_both_endpoints() {
        let mut img = ColorImage::from_pixel(10, 10, BLACK);
        draw_line(&mut img, 1, 1, 8, 5, WHITE);
        assert_eq!(img.get_pixel(1, 1), &WHITE);
        assert_eq!(img.get_pixel(8, 5), &WHITE);
        assert_eq!(img.get_pixel(8, 1), &BLACK);
    }

    #[test]
    fn crosshair_leaves_gap_around_center() {
        let mut img = ColorImage::from_pixel(21, 21, BLACK);
        draw_crosshair(&mut img, 10, 10, 6, WHITE);
        assert_eq!(img.get_pixel(10, 10), &WHITE);
        assert_eq!(img.get_pixel(11, 10), &BLACK);
        assert_eq!(img.get_pixel(12, 10), &WHITE);
        assert_eq!(img.get_pixel(10, 4), &WHITE);
        assert_eq!(img.get_pixel(13, 13), &BLACK);
    }

    #[test]
    fn guide_clips_points_outside_image() {
        let mut img = ColorImage::from_pixel(20, 20, BLACK);
        let quad = [
            Point::new(-5.0, 2.0),
            Point::new(15.0, 2.0),
            Point::new(15.0, 40.0),
            Point::new(-5.0, 40.0),
        ];
        draw_quad_guide(&mut img, &quad, GUIDE_COLOR);
        assert_eq!(img.dimensions(), (20, 20));
        assert_eq!(img.get_pixel(5, 2), &GUIDE_COLOR); // top edge
        assert_eq!(img.get_pixel(15, 10), &GUIDE_COLOR); // right edge
        assert_eq!(img.get_pixel(8, 10), &BLACK); // interior untouched
    }

    #[test]
    fn far_endpoint_keeps_line_direction() {
        let mut img = ColorImage::from_pixel(20, 20, BLACK);
        // slope 1/2 toward a point far off the right edge
        draw_segment(&mut img, Point::new(5.0, 5.0), Point::new(100_005.0, 50_005.0), WHITE);
        assert_eq!(img.get_pixel(5, 5), &WHITE);
        assert_eq!(img.get_pixel(15, 10), &WHITE);
        assert_eq!(img.get_pixel(19, 12), &WHITE);
        assert_eq!(img.get_pixel(19, 19), &BLACK); // a clamped corner would pull the line here
    }

    #[test]
    fn segment_missing_the_image_draws_nothing() {
        let mut img = ColorImage::from_pixel(10, 10, BLACK);
        draw_segment(&mut img, Point::new(-50.0, -5.0), Point::new(50.0, -1.0), WHITE);
        draw_segment(&mut img, Point::new(f64::NAN, 0.0), Point::new(5.0, 5.0), WHITE);
        assert!(img.pixels().all(|p| p == &BLACK));
    }
}
