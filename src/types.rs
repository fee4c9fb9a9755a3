// Core types shared by the three transforms and the store.

use image::{GrayImage, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};

/// 3-channel color image (R,G,B order, 8 bits per channel).
pub type ColorImage = RgbImage;
/// 4-channel color+alpha image; overlays (wheels, parts) come in this shape.
pub type OverlayImage = RgbaImage;
/// Single-channel mask; 0 = excluded, 255 = included.
pub type MaskImage = GrayImage;

/// A pixel-space position. May lie outside the image (perspective targets do).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// Four corners in top-left, top-right, bottom-right, bottom-left order.
pub type Quad = [Point; 4];

/// Corners of a `width x height` image in `Quad` order:
/// (0,0), (w-1,0), (w-1,h-1), (0,h-1).
pub fn corner_quad(width: u32, height: u32) -> Quad {
    let r = width as f64 - 1.0;
    let b = height as f64 - 1.0;
    [
        Point::new(0.0, 0.0),
        Point::new(r, 0.0),
        Point::new(r, b),
        Point::new(0.0, b),
    ]
}

/// Seed rectangle for the segmenter, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedRect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl SeedRect {
    /// Clip to a `w x h` image: origin pulled inside, extent cut at the
    /// right/bottom edges. May come out empty.
    pub fn clipped(self, w: u32, h: u32) -> SeedRect {
        let x = self.x.max(0);
        let y = self.y.max(0);
        let width = self.width.min(w as i64 - x).max(0);
        let height = self.height.min(h as i64 - y).max(0);
        SeedRect { x, y, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    #[inline]
    pub fn contains(&self, px: u32, py: u32) -> bool {
        let (px, py) = (px as i64, py as i64);
        px >= self.x && px < self.x + self.width && py >= self.y && py < self.y + self.height
    }
}

/// Map any positive mask value to 255, keep 0 as 0.
pub fn binarize_mask(mask: &MaskImage) -> MaskImage {
    let mut out = mask.clone();
    for v in out.iter_mut() {
        *v = if *v > 0 { 255 } else { 0 };
    }
    out
}

/// Packed 0x00RRGGBB pixels, the layout a preview window expects.
#[derive(Clone)]
pub struct FrameBuffer {
    pub width: usize,     // frame width in pixels
    pub height: usize,    // frame height in pixels
    pub pixels: Vec<u32>, // each entry is 0x00RRGGBB
}

impl FrameBuffer {
    pub fn from_rgb(img: &ColorImage) -> Self {
        let (w, h) = img.dimensions();
        let mut pixels = Vec::with_capacity((w as usize) * (h as usize));
        for p in img.pixels() {
            let r = p[0] as u32;
            let g = p[1] as u32;
            let b = p[2] as u32;
            pixels.push((r << 16) | (g << 8) | b);
        }
        Self { width: w as usize, height: h as usize, pixels }
    }
}
