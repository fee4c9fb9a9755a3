// 8-bit HSV conversion with half-degree hue (0..180), fixed-point like the
// common computer-vision convention so stored variants stay comparable.
// RGB -> HSV uses two division tables built once; HSV -> RGB goes through f32.

use std::sync::LazyLock;

const HSV_SHIFT: u32 = 12;
const HALF: i32 = 1 << (HSV_SHIFT - 1);

/// Hue units per full turn.
pub const HUE_RANGE: f32 = 180.0;

static SHARED: LazyLock<HsvTables> = LazyLock::new(HsvTables::new);

pub struct HsvTables {
    // (255 << 12) / v, for saturation = diff / v
    sdiv: [i32; 256],
    // (180 << 12) / (6 * diff), for hue = 30 * num / diff
    hdiv: [i32; 256],
}

impl HsvTables {
    /// Build both tables. Index 0 maps to 0 (black / gray pixels).
    pub fn new() -> Self {
        let mut sdiv = [0i32; 256];
        let mut hdiv = [0i32; 256];
        for i in 1..256 {
            let d = i as f64;
            sdiv[i] = ((255 << HSV_SHIFT) as f64 / d).round_ties_even() as i32;
            hdiv[i] = ((180 << HSV_SHIFT) as f64 / (6.0 * d)).round_ties_even() as i32;
        }
        Self { sdiv, hdiv }
    }

    /// Process-wide tables; they never change after construction.
    pub fn shared() -> &'static HsvTables {
        &SHARED
    }

    /// `[r, g, b]` -> `[h, s, v]`, h in 0..180.
    #[inline]
    pub fn rgb_to_hsv(&self, rgb: [u8; 3]) -> [u8; 3] {
        let (r, g, b) = (rgb[0] as i32, rgb[1] as i32, rgb[2] as i32);
        let v = r.max(g).max(b);
        let vmin = r.min(g).min(b);
        let diff = v - vmin;

        // all-ones masks pick the branch for whichever channel is the max
        let vr = if v == r { -1 } else { 0 };
        let vg = if v == g { -1 } else { 0 };

        let s = (diff * self.sdiv[v as usize] + HALF) >> HSV_SHIFT;
        let num = (vr & (g - b)) + (!vr & ((vg & (b - r + 2 * diff)) + (!vg & (r - g + 4 * diff))));
        let mut h = (num * self.hdiv[diff as usize] + HALF) >> HSV_SHIFT;
        if h < 0 {
            h += HUE_RANGE as i32;
        }

        [h as u8, s as u8, v as u8]
    }
}

impl Default for HsvTables {
    fn default() -> Self {
        Self::new()
    }
}

// Which tab entry feeds b, g, r for each 60-degree sector.
const SECTOR_BGR: [[usize; 3]; 6] = [[1, 3, 0], [1, 0, 2], [3, 0, 1], [0, 2, 1], [0, 1, 3], [2, 1, 0]];

/// `[h, s, v]` (h in 0..180) -> `[r, g, b]`.
#[inline]
pub fn hsv_to_rgb(hsv: [u8; 3]) -> [u8; 3] {
    let s = hsv[1] as f32 * (1.0 / 255.0);
    let v = hsv[2] as f32 * (1.0 / 255.0);

    let (r, g, b) = if s == 0.0 {
        (v, v, v)
    } else {
        let mut h = hsv[0] as f32 * (6.0 / HUE_RANGE);
        while h >= 6.0 {
            h -= 6.0;
        }
        let mut sector = h.floor() as usize;
        h -= sector as f32;
        if sector >= 6 {
            sector = 0;
            h = 0.0;
        }

        let tab = [v, v * (1.0 - s), v * (1.0 - s * h), v * (1.0 - s * (1.0 - h))];
        let idx = SECTOR_BGR[sector];
        (tab[idx[2]], tab[idx[1]], tab[idx[0]])
    };

    [to_u8(r), to_u8(g), to_u8(b)]
}

#[inline]
fn to_u8(c: f32) -> u8 {
    (c * 255.0).round_ties_even().clamp(0.0, 255.0) as u8
}
