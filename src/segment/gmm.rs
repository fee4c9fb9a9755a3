// Gaussian mixture color model (full 3x3 covariance per component) plus the
// k-means used to seed it.

use super::SegmentError;

/// Variance added to the diagonal when a component collapses to a point
/// (flat-colored regions).
const VARIANCE_FLOOR: f64 = 0.01;

// ----------------------------- tiny RNG (no external crate) -----------------------------

/// Deterministic xorshift32 so the same photo always gives the same mask.
#[derive(Clone)]
pub(crate) struct Rng32 {
    state: u32,
}

impl Rng32 {
    pub fn from_seed(seed: u32) -> Self {
        Self { state: seed | 1 }
    }

    #[inline]
    fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Uniform [0,1)
    #[inline]
    fn next_f64(&mut self) -> f64 {
        (self.next_u32() >> 8) as f64 / ((1u32 << 24) as f64)
    }

    /// Uniform index in 0..n (n > 0)
    #[inline]
    fn below(&mut self, n: usize) -> usize {
        ((self.next_f64() * n as f64) as usize).min(n - 1)
    }
}

#[inline]
fn dist2(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    let d0 = a[0] - b[0];
    let d1 = a[1] - b[1];
    let d2 = a[2] - b[2];
    d0 * d0 + d1 * d1 + d2 * d2
}

// ----------------------------- k-means ------------------------------------------------

/// Cluster `samples` into `k` groups: k-means++ seeding, then at most `iters`
/// Lloyd rounds. Returns one label per sample.
pub(crate) fn kmeans(
    samples: &[[f64; 3]],
    k: usize,
    iters: usize,
    rng: &mut Rng32,
) -> Result<Vec<usize>, SegmentError> {
    let n = samples.len();
    if k == 0 || n < k {
        return Err(SegmentError::TooFewSamples { needed: k.max(1), got: n });
    }

    // 1) k-means++: each next center is drawn proportional to D².
    let mut centers = Vec::with_capacity(k);
    centers.push(samples[rng.below(n)]);
    let mut nearest: Vec<f64> = samples.iter().map(|s| dist2(s, &centers[0])).collect();
    while centers.len() < k {
        let total: f64 = nearest.iter().sum();
        let pick = if total > 0.0 {
            let mut r = rng.next_f64() * total;
            let mut idx = n - 1;
            for (i, d) in nearest.iter().enumerate() {
                if r < *d {
                    idx = i;
                    break;
                }
                r -= d;
            }
            idx
        } else {
            rng.below(n) // every sample already sits on a center
        };
        let c = samples[pick];
        for (d, s) in nearest.iter_mut().zip(samples) {
            *d = d.min(dist2(s, &c));
        }
        centers.push(c);
    }

    // 2) Lloyd rounds until labels settle.
    let mut labels = vec![usize::MAX; n];
    for _ in 0..iters.max(1) {
        let mut changed = false;
        for (label, s) in labels.iter_mut().zip(samples) {
            let mut best = 0;
            let mut best_d = dist2(s, &centers[0]);
            for (ci, c) in centers.iter().enumerate().skip(1) {
                let d = dist2(s, c);
                if d < best_d {
                    best = ci;
                    best_d = d;
                }
            }
            if *label != best {
                *label = best;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let mut sums = vec![[0.0f64; 3]; k];
        let mut counts = vec![0usize; k];
        for (&l, s) in labels.iter().zip(samples) {
            counts[l] += 1;
            for c in 0..3 {
                sums[l][c] += s[c];
            }
        }
        for ci in 0..k {
            if counts[ci] > 0 {
                let m = counts[ci] as f64;
                centers[ci] = [sums[ci][0] / m, sums[ci][1] / m, sums[ci][2] / m];
            } // empty cluster keeps its old center
        }
    }

    Ok(labels)
}

// ----------------------------- mixture model ------------------------------------------

#[derive(Clone, Debug)]
struct Component {
    weight: f64,
    mean: [f64; 3],
    inv_cov: [[f64; 3]; 3],
    inv_sqrt_det: f64,
}

impl Component {
    const EMPTY: Component = Component {
        weight: 0.0,
        mean: [0.0; 3],
        inv_cov: [[0.0; 3]; 3],
        inv_sqrt_det: 0.0,
    };

    /// Unweighted Gaussian density (without the constant 2π factor).
    #[inline]
    fn density(&self, c: &[f64; 3]) -> f64 {
        if self.weight <= 0.0 {
            return 0.0;
        }
        let d = [c[0] - self.mean[0], c[1] - self.mean[1], c[2] - self.mean[2]];
        let ic = &self.inv_cov;
        let mult = d[0] * (d[0] * ic[0][0] + d[1] * ic[1][0] + d[2] * ic[2][0])
            + d[1] * (d[0] * ic[0][1] + d[1] * ic[1][1] + d[2] * ic[2][1])
            + d[2] * (d[0] * ic[0][2] + d[1] * ic[1][2] + d[2] * ic[2][2]);
        self.inv_sqrt_det * (-0.5 * mult).exp()
    }
}

/// Color model of one side (foreground or background).
#[derive(Clone, Debug)]
pub(crate) struct Gmm {
    components: Vec<Component>,
}

impl Gmm {
    /// Mixture likelihood of a color.
    pub fn probability(&self, c: &[f64; 3]) -> f64 {
        self.components.iter().map(|k| k.weight * k.density(c)).sum()
    }

    /// Index of the component that explains `c` best.
    pub fn most_likely_component(&self, c: &[f64; 3]) -> usize {
        let mut best = 0;
        let mut best_p = 0.0;
        for (i, k) in self.components.iter().enumerate() {
            let p = k.density(c);
            if p > best_p {
                best = i;
                best_p = p;
            }
        }
        best
    }

    /// Fit `k` components from `(component, color)` samples.
    pub fn learn<'a, I>(k: usize, samples: I) -> Result<Gmm, SegmentError>
    where
        I: IntoIterator<Item = (usize, &'a [f64; 3])>,
    {
        let mut acc = vec![Accum::default(); k];
        let mut total = 0usize;
        for (ci, c) in samples {
            acc[ci].add(c);
            total += 1;
        }

        let mut components = Vec::with_capacity(k);
        for a in &acc {
            if a.count == 0 {
                components.push(Component::EMPTY);
                continue;
            }
            components.push(a.finish(a.count as f64 / total as f64)?);
        }
        Ok(Gmm { components })
    }
}

#[derive(Clone, Default)]
struct Accum {
    sums: [f64; 3],
    prods: [[f64; 3]; 3],
    count: usize,
}

impl Accum {
    fn add(&mut self, c: &[f64; 3]) {
        for i in 0..3 {
            self.sums[i] += c[i];
            for j in 0..3 {
                self.prods[i][j] += c[i] * c[j];
            }
        }
        self.count += 1;
    }

    fn finish(&self, weight: f64) -> Result<Component, SegmentError> {
        let n = self.count as f64;
        let mean = [self.sums[0] / n, self.sums[1] / n, self.sums[2] / n];
        let mut cov = [[0.0f64; 3]; 3];
        for i in 0..3 {
            for j in 0..3 {
                cov[i][j] = self.prods[i][j] / n - mean[i] * mean[j];
            }
        }

        let mut det = det3(&cov);
        if det <= f64::EPSILON {
            for (i, row) in cov.iter_mut().enumerate() {
                row[i] += VARIANCE_FLOOR;
            }
            det = det3(&cov);
        }
        if !det.is_finite() || det <= f64::EPSILON {
            return Err(SegmentError::SingularModel);
        }

        // adjugate / det
        let c = &cov;
        let inv_cov = [
            [
                (c[1][1] * c[2][2] - c[1][2] * c[2][1]) / det,
                -(c[0][1] * c[2][2] - c[0][2] * c[2][1]) / det,
                (c[0][1] * c[1][2] - c[0][2] * c[1][1]) / det,
            ],
            [
                -(c[1][0] * c[2][2] - c[1][2] * c[2][0]) / det,
                (c[0][0] * c[2][2] - c[0][2] * c[2][0]) / det,
                -(c[0][0] * c[1][2] - c[0][2] * c[1][0]) / det,
            ],
            [
                (c[1][0] * c[2][1] - c[1][1] * c[2][0]) / det,
                -(c[0][0] * c[2][1] - c[0][1] * c[2][0]) / det,
                (c[0][0] * c[1][1] - c[0][1] * c[1][0]) / det,
            ],
        ];

        Ok(Component {
            weight,
            mean,
            inv_cov,
            inv_sqrt_det: 1.0 / det.sqrt(),
        })
    }
}

fn det3(c: &[[f64; 3]; 3]) -> f64 {
    c[0][0] * (c[1][1] * c[2][2] - c[1][2] * c[2][1]) - c[0][1] * (c[1][0] * c[2][2] - c[1][2] * c[2][0])
        + c[0][2] * (c[1][0] * c[2][1] - c[1][1] * c[2][0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kmeans_separates_two_blobs() {
        let mut samples = Vec::new();
        for i in 0..20 {
            samples.push([10.0 + (i % 3) as f64, 10.0, 10.0]);
            samples.push([200.0, 190.0 + (i % 2) as f64, 50.0]);
        }
        let mut rng = Rng32::from_seed(7);
        let labels = kmeans(&samples, 2, 10, &mut rng).unwrap();
        for pair in labels.chunks(2) {
            assert_ne!(pair[0], pair[1]);
        }
        assert!(labels.iter().step_by(2).all(|&l| l == labels[0]));
    }

    #[test]
    fn kmeans_handles_identical_samples() {
        let samples = vec![[5.0, 5.0, 5.0]; 12];
        let mut rng = Rng32::from_seed(1);
        let labels = kmeans(&samples, 5, 10, &mut rng).unwrap();
        assert_eq!(labels.len(), 12);
        assert!(labels.iter().all(|&l| l == labels[0]));
    }

    #[test]
    fn kmeans_needs_k_samples() {
        let mut rng = Rng32::from_seed(1);
        let err = kmeans(&[[0.0; 3]; 3], 5, 10, &mut rng).unwrap_err();
        assert_eq!(err, SegmentError::TooFewSamples { needed: 5, got: 3 });
    }

    #[test]
    fn flat_component_gets_variance_floor() {
        let red = [250.0, 5.0, 5.0];
        let gmm = Gmm::learn(2, std::iter::repeat_n((0usize, &red), 30)).unwrap();
        assert!(gmm.probability(&red) > 0.0);
        assert_eq!(gmm.most_likely_component(&red), 0);
        // far colors are practically impossible under a point-like model
        assert!(gmm.probability(&[5.0, 5.0, 250.0]) < 1e-100);
    }

    #[test]
    fn mixture_prefers_closer_component() {
        let dark = [[20.0, 20.0, 20.0], [24.0, 18.0, 21.0], [18.0, 22.0, 19.0], [21.0, 21.0, 24.0]];
        let light = [[220.0, 220.0, 220.0], [215.0, 226.0, 219.0], [222.0, 218.0, 216.0], [219.0, 221.0, 223.0]];
        let samples = dark.iter().map(|c| (0usize, c)).chain(light.iter().map(|c| (1usize, c)));
        let gmm = Gmm::learn(2, samples).unwrap();
        assert_eq!(gmm.most_likely_component(&[22.0, 19.0, 20.0]), 0);
        assert_eq!(gmm.most_likely_component(&[218.0, 222.0, 220.0]), 1);
    }
}
