//! Segmenter: automatic foreground mask for the central subject of a photo.
//!
//! A seed rectangle marks "background outside, probably foreground inside";
//! two Gaussian mixture color models and an 8-connected graph cut then
//! refine the inside over a few rounds (GrabCut).
//!
//! **Never fails.** Any internal failure (too-small image, empty seed,
//! degenerate color model) produces an all-foreground mask. The failure is
//! not lost: it comes back as [`Segmentation::Degraded`] with the reason.

mod gmm;
mod graph;

use image::Luma;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::SegmentParams;
use crate::types::{ColorImage, MaskImage, SeedRect};
use gmm::{Gmm, Rng32, kmeans};
use graph::FlowGraph;

const KMEANS_ITERS: usize = 10;
const KMEANS_SEED: u32 = 0x5EED_CA75;

/// Why the segmenter fell back to an all-foreground mask.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SegmentError {
    #[error("image is empty")]
    EmptyImage,
    #[error("seed rectangle {0:?} is empty after clipping")]
    EmptySeed(SeedRect),
    #[error("no {0} pixels to learn from")]
    NoSamples(&'static str),
    #[error("too few samples for the color model: need {needed}, got {got}")]
    TooFewSamples { needed: usize, got: usize },
    #[error("color model collapsed (singular covariance)")]
    SingularModel,
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
}

/// Outcome of [`segment`].
#[derive(Debug, Clone, PartialEq)]
pub enum Segmentation {
    Complete(MaskImage),
    /// Mask is all 255; `reason` says what went wrong.
    Degraded { mask: MaskImage, reason: SegmentError },
}

impl Segmentation {
    pub fn mask(&self) -> &MaskImage {
        match self {
            Segmentation::Complete(mask) | Segmentation::Degraded { mask, .. } => mask,
        }
    }

    pub fn into_mask(self) -> MaskImage {
        match self {
            Segmentation::Complete(mask) | Segmentation::Degraded { mask, .. } => mask,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Segmentation::Degraded { .. })
    }

    pub fn reason(&self) -> Option<&SegmentError> {
        match self {
            Segmentation::Complete(_) => None,
            Segmentation::Degraded { reason, .. } => Some(reason),
        }
    }
}

// Per-pixel labels. Definite background is fixed by the seed; the probable
// labels are what the graph cut moves around.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Label {
    Bgd,
    ProbBgd,
    ProbFgd,
}

impl Label {
    #[inline]
    fn is_foreground(self) -> bool {
        self == Label::ProbFgd
    }

    #[inline]
    fn is_probable(self) -> bool {
        matches!(self, Label::ProbBgd | Label::ProbFgd)
    }
}

/// Foreground mask of `image`: 255 for (probable) foreground, 0 otherwise.
pub fn segment(image: &ColorImage, params: &SegmentParams) -> Segmentation {
    let (w, h) = image.dimensions();
    match grabcut(image, params) {
        Ok(labels) => {
            let mut mask = MaskImage::new(w, h);
            for (px, label) in mask.pixels_mut().zip(&labels) {
                *px = Luma([if label.is_foreground() { 255 } else { 0 }]);
            }
            Segmentation::Complete(mask)
        }
        Err(reason) => {
            warn!(%reason, "segmentation degraded to all-foreground mask ({w}x{h})");
            Segmentation::Degraded { mask: MaskImage::from_pixel(w, h, Luma([255])), reason }
        }
    }
}

fn grabcut(image: &ColorImage, params: &SegmentParams) -> Result<Vec<Label>, SegmentError> {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return Err(SegmentError::EmptyImage);
    }
    if params.components == 0 {
        return Err(SegmentError::InvalidParams("components must be > 0".into()));
    }
    if !params.gamma.is_finite() || params.gamma < 0.0 {
        return Err(SegmentError::InvalidParams(format!("gamma {}", params.gamma)));
    }

    // 1) Seed: background outside the rectangle, probable foreground inside.
    let rect = params.seed_rect(w, h).clipped(w, h);
    if rect.is_empty() {
        return Err(SegmentError::EmptySeed(rect));
    }
    let mut labels: Vec<Label> = Vec::with_capacity(w as usize * h as usize);
    for y in 0..h {
        for x in 0..w {
            labels.push(if rect.contains(x, y) { Label::ProbFgd } else { Label::Bgd });
        }
    }
    let colors: Vec<[f64; 3]> = image
        .pixels()
        .map(|p| [p[0] as f64, p[1] as f64, p[2] as f64])
        .collect();

    // 2) Initial color models from k-means clusters of each side.
    let k = params.components;
    let mut rng = Rng32::from_seed(KMEANS_SEED);
    let (mut bgd, mut fgd) = init_models(&colors, &labels, k, &mut rng)?;
    debug!(?rect, k, "grabcut models initialised");
    if params.iterations == 0 {
        return Ok(labels);
    }

    // 3) Smoothness weights depend only on the image; compute once.
    let links = NeighbourLinks::new(&colors, w as usize, h as usize, params.gamma);
    let lambda = 9.0 * params.gamma;

    let mut comp = vec![0usize; colors.len()];
    for round in 0..params.iterations {
        // a) each pixel picks the best component of its side's model
        for ((c, label), slot) in colors.iter().zip(&labels).zip(comp.iter_mut()) {
            *slot = if label.is_foreground() {
                fgd.most_likely_component(c)
            } else {
                bgd.most_likely_component(c)
            };
        }

        // b) re-learn both models from those assignments
        bgd = Gmm::learn(
            k,
            colors.iter().zip(&labels).zip(&comp).filter(|((_, l), _)| !l.is_foreground()).map(|((c, _), &ci)| (ci, c)),
        )?;
        fgd = Gmm::learn(
            k,
            colors.iter().zip(&labels).zip(&comp).filter(|((_, l), _)| l.is_foreground()).map(|((c, _), &ci)| (ci, c)),
        )?;

        // c) graph cut; only probable labels may flip
        let mut graph = build_graph(&colors, &labels, &links, &bgd, &fgd, lambda);
        let flow = graph.max_flow();
        let side = graph.source_side();
        let mut flipped = 0usize;
        for (label, &fg) in labels.iter_mut().zip(&side) {
            if label.is_probable() {
                let next = if fg { Label::ProbFgd } else { Label::ProbBgd };
                if next != *label {
                    flipped += 1;
                }
                *label = next;
            }
        }
        debug!(round, flow, flipped, "grabcut round");
    }

    Ok(labels)
}

fn init_models(
    colors: &[[f64; 3]],
    labels: &[Label],
    k: usize,
    rng: &mut Rng32,
) -> Result<(Gmm, Gmm), SegmentError> {
    let mut bgd_samples = Vec::new();
    let mut fgd_samples = Vec::new();
    for (c, l) in colors.iter().zip(labels) {
        if l.is_foreground() {
            fgd_samples.push(*c);
        } else {
            bgd_samples.push(*c);
        }
    }
    if bgd_samples.is_empty() {
        return Err(SegmentError::NoSamples("background"));
    }
    if fgd_samples.is_empty() {
        return Err(SegmentError::NoSamples("foreground"));
    }

    let bgd_labels = kmeans(&bgd_samples, k, KMEANS_ITERS, rng)?;
    let fgd_labels = kmeans(&fgd_samples, k, KMEANS_ITERS, rng)?;
    let bgd = Gmm::learn(k, bgd_labels.into_iter().zip(&bgd_samples))?;
    let fgd = Gmm::learn(k, fgd_labels.into_iter().zip(&fgd_samples))?;
    Ok((bgd, fgd))
}

/// Edge weights to the left, up-left, up and up-right neighbour of each
/// pixel: `gamma * exp(-beta * |Δc|²)`, diagonals divided by √2.
struct NeighbourLinks {
    width: usize,
    height: usize,
    left: Vec<f64>,
    up_left: Vec<f64>,
    up: Vec<f64>,
    up_right: Vec<f64>,
}

impl NeighbourLinks {
    fn new(colors: &[[f64; 3]], w: usize, h: usize, gamma: f64) -> Self {
        let d2 = |a: &[f64; 3], b: &[f64; 3]| {
            let d = [a[0] - b[0], a[1] - b[1], a[2] - b[2]];
            d[0] * d[0] + d[1] * d[1] + d[2] * d[2]
        };

        // beta = 1 / (2 * mean squared difference over all neighbour pairs)
        let mut sum = 0.0;
        for y in 0..h {
            for x in 0..w {
                let c = &colors[y * w + x];
                if x > 0 {
                    sum += d2(c, &colors[y * w + x - 1]);
                }
                if y > 0 && x > 0 {
                    sum += d2(c, &colors[(y - 1) * w + x - 1]);
                }
                if y > 0 {
                    sum += d2(c, &colors[(y - 1) * w + x]);
                }
                if y > 0 && x + 1 < w {
                    sum += d2(c, &colors[(y - 1) * w + x + 1]);
                }
            }
        }
        let pairs = (4 * w * h) as f64 - (3 * w) as f64 - (3 * h) as f64 + 2.0;
        let beta = if sum <= f64::EPSILON || pairs <= 0.0 { 0.0 } else { 1.0 / (2.0 * sum / pairs) };

        let diag = gamma / std::f64::consts::SQRT_2;
        let n = w * h;
        let mut links = NeighbourLinks {
            width: w,
            height: h,
            left: vec![0.0; n],
            up_left: vec![0.0; n],
            up: vec![0.0; n],
            up_right: vec![0.0; n],
        };
        for y in 0..h {
            for x in 0..w {
                let i = y * w + x;
                let c = &colors[i];
                if x > 0 {
                    links.left[i] = gamma * (-beta * d2(c, &colors[i - 1])).exp();
                }
                if y > 0 && x > 0 {
                    links.up_left[i] = diag * (-beta * d2(c, &colors[i - w - 1])).exp();
                }
                if y > 0 {
                    links.up[i] = gamma * (-beta * d2(c, &colors[i - w])).exp();
                }
                if y > 0 && x + 1 < w {
                    links.up_right[i] = diag * (-beta * d2(c, &colors[i - w + 1])).exp();
                }
            }
        }
        links
    }
}

/// Data cost of a color under a model; zero likelihood becomes a large finite
/// cost so the flow stays finite.
#[inline]
fn data_cost(model: &Gmm, c: &[f64; 3]) -> f64 {
    -model.probability(c).max(f64::MIN_POSITIVE).ln()
}

fn build_graph(
    colors: &[[f64; 3]],
    labels: &[Label],
    links: &NeighbourLinks,
    bgd: &Gmm,
    fgd: &Gmm,
    lambda: f64,
) -> FlowGraph {
    let (w, h) = (links.width, links.height);
    let n = w * h;
    let mut g = FlowGraph::with_capacity(n, 5 * n);

    for y in 0..h {
        for x in 0..w {
            let i = y * w + x;
            let c = &colors[i];

            // terminal links
            let (from_source, to_sink) = match labels[i] {
                Label::ProbBgd | Label::ProbFgd => (data_cost(bgd, c), data_cost(fgd, c)),
                Label::Bgd => (0.0, lambda),
            };
            g.add_terminal_weights(i, from_source, to_sink);

            // neighbour links
            if x > 0 {
                let wgt = links.left[i];
                g.add_edge(i, i - 1, wgt, wgt);
            }
            if y > 0 && x > 0 {
                let wgt = links.up_left[i];
                g.add_edge(i, i - w - 1, wgt, wgt);
            }
            if y > 0 {
                let wgt = links.up[i];
                g.add_edge(i, i - w, wgt, wgt);
            }
            if y > 0 && x + 1 < w {
                let wgt = links.up_right[i];
                g.add_edge(i, i - w + 1, wgt, wgt);
            }
        }
    }
    g
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    // blue backdrop with a red "car" in the middle
    fn red_on_blue(w: u32, h: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> ColorImage {
        ColorImage::from_fn(w, h, |x, y| {
            if (x0..x1).contains(&x) && (y0..y1).contains(&y) {
                Rgb([220, 20, 30])
            } else {
                Rgb([20, 40, 200])
            }
        })
    }

    #[test]
    fn finds_central_subject() {
        let img = red_on_blue(40, 30, 12, 10, 28, 20);
        let seg = segment(&img, &SegmentParams::default());
        assert!(!seg.is_degraded(), "{:?}", seg.reason());
        let mask = seg.mask();
        assert_eq!(mask.dimensions(), (40, 30));
        assert_eq!(mask.get_pixel(20, 15)[0], 255);
        assert_eq!(mask.get_pixel(12, 10)[0], 255);
        assert_eq!(mask.get_pixel(5, 15)[0], 0);
        assert_eq!(mask.get_pixel(0, 0)[0], 0);
        assert!(mask.iter().all(|&v| v == 0 || v == 255));
    }

    #[test]
    fn outside_seed_is_always_background() {
        let img = red_on_blue(40, 30, 0, 0, 40, 30); // all red
        let seg = segment(&img, &SegmentParams::default());
        let mask = seg.mask();
        // left 2 columns and top 3 rows sit outside the default seed
        for y in 0..30 {
            assert_eq!(mask.get_pixel(0, y)[0], 0);
        }
        for x in 0..40 {
            assert_eq!(mask.get_pixel(x, 0)[0], 0);
        }
    }

    #[test]
    fn one_pixel_image_degrades_to_foreground() {
        let img = ColorImage::from_pixel(1, 1, Rgb([9, 9, 9]));
        let seg = segment(&img, &SegmentParams::default());
        assert!(seg.is_degraded());
        assert!(matches!(seg.reason(), Some(SegmentError::EmptySeed(_))));
        assert_eq!(seg.into_mask().as_raw(), &vec![255]);
    }

    #[test]
    fn solid_color_gives_uniform_mask() {
        let img = ColorImage::from_pixel(10, 10, Rgb([120, 120, 120]));
        let seg = segment(&img, &SegmentParams::default());
        let mask = seg.mask();
        assert_eq!(mask.dimensions(), (10, 10));
        let first = mask.get_pixel(0, 0)[0];
        assert!(first == 0 || first == 255);
        assert!(mask.iter().all(|&v| v == first));
    }

    #[test]
    fn seed_covering_everything_degrades() {
        let img = red_on_blue(12, 12, 4, 4, 8, 8);
        let params = SegmentParams {
            rect: Some(SeedRect { x: 0, y: 0, width: 12, height: 12 }),
            ..Default::default()
        };
        let seg = segment(&img, &params);
        assert_eq!(seg.reason(), Some(&SegmentError::NoSamples("background")));
        assert!(seg.mask().iter().all(|&v| v == 255));
    }

    #[test]
    fn zero_iterations_returns_seed() {
        let img = red_on_blue(20, 20, 5, 5, 15, 15);
        let params = SegmentParams { iterations: 0, ..Default::default() };
        let seg = segment(&img, &params);
        let rect = params.seed_rect(20, 20);
        for (x, y, p) in seg.mask().enumerate_pixels() {
            let expected = if rect.contains(x, y) { 255 } else { 0 };
            assert_eq!(p[0], expected);
        }
    }
}
