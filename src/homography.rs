//! Point-to-point homography via normalized DLT.
//!
//! Four correspondences determine the 3×3 projective map exactly; more are
//! solved in the least-squares sense. Degenerate inputs (coincident or
//! collinear points) are reported instead of producing a garbage matrix.

use nalgebra::{DMatrix, Matrix3, SymmetricEigen, Vector3};

use crate::error::{Error, Result};
use crate::types::Point;

const EPS: f64 = 1e-12;

// ── Projection ───────────────────────────────────────────────────────────

/// Map `p` through `h`. `None` when the point lands at infinity.
pub fn project(h: &Matrix3<f64>, p: Point) -> Option<Point> {
    let v = h * Vector3::new(p.x, p.y, 1.0);
    let w = v[2];
    if !w.is_finite() || w.abs() <= EPS || !v[0].is_finite() || !v[1].is_finite() {
        return None;
    }
    Some(Point::new(v[0] / w, v[1] / w))
}

// ── Hartley normalization ────────────────────────────────────────────────

/// Translate the centroid to the origin and scale so the mean distance is
/// √2. Fails when every point coincides.
fn normalize_points(pts: &[Point]) -> Result<(Matrix3<f64>, Vec<Point>)> {
    let n = pts.len() as f64;
    let cx = pts.iter().map(|p| p.x).sum::<f64>() / n;
    let cy = pts.iter().map(|p| p.y).sum::<f64>() / n;

    let mean_dist = pts
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;

    if !mean_dist.is_finite() || mean_dist <= EPS {
        return Err(Error::DegenerateQuad("points coincide".into()));
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;

    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalized = pts.iter().map(|p| Point::new(s * (p.x - cx), s * (p.y - cy))).collect();
    Ok((t, normalized))
}

/// True when the points cannot anchor a projective map: for exactly four
/// points any three on a line, otherwise all of them on one line.
fn degenerate(pts: &[Point]) -> bool {
    let mut min_area = f64::INFINITY;
    let mut max_area = 0.0f64;
    for i in 0..pts.len() {
        for j in (i + 1)..pts.len() {
            for k in (j + 1)..pts.len() {
                let (a, b, c) = (pts[i], pts[j], pts[k]);
                let area = ((b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)).abs();
                min_area = min_area.min(area);
                max_area = max_area.max(area);
            }
        }
    }
    // normalized coordinates, so a fixed tolerance is scale free
    if pts.len() == 4 { min_area <= 1e-9 } else { max_area <= 1e-9 }
}

// ── DLT ──────────────────────────────────────────────────────────────────

/// Estimate `H` with `dst ≈ project(H, src)` from ≥ 4 correspondences.
///
/// The result is scaled so `H[(2,2)] == 1` when that entry is non-zero.
pub fn estimate_homography(src: &[Point], dst: &[Point]) -> Result<Matrix3<f64>> {
    let n = src.len();
    if n < 4 || src.len() != dst.len() {
        return Err(Error::DegenerateQuad(format!(
            "need at least 4 matching point pairs, got {} -> {}",
            src.len(),
            dst.len()
        )));
    }
    if src.iter().chain(dst).any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return Err(Error::DegenerateQuad("non-finite point".into()));
    }

    let (t_src, src_n) = normalize_points(src)?;
    let (t_dst, dst_n) = normalize_points(dst)?;
    if degenerate(&src_n) || degenerate(&dst_n) {
        return Err(Error::DegenerateQuad("points are collinear".into()));
    }

    // Build 2n × 9 matrix A
    let mut a = DMatrix::zeros(2 * n, 9);
    for i in 0..n {
        let (sx, sy) = (src_n[i].x, src_n[i].y);
        let (dx, dy) = (dst_n[i].x, dst_n[i].y);

        // Row 2i:   [  0  0  0 | -sx -sy -1 | dy*sx  dy*sy  dy ]
        a[(2 * i, 3)] = -sx;
        a[(2 * i, 4)] = -sy;
        a[(2 * i, 5)] = -1.0;
        a[(2 * i, 6)] = dy * sx;
        a[(2 * i, 7)] = dy * sy;
        a[(2 * i, 8)] = dy;

        // Row 2i+1: [ sx  sy  1 |  0  0  0 | -dx*sx -dx*sy -dx ]
        a[(2 * i + 1, 0)] = sx;
        a[(2 * i + 1, 1)] = sy;
        a[(2 * i + 1, 2)] = 1.0;
        a[(2 * i + 1, 6)] = -dx * sx;
        a[(2 * i + 1, 7)] = -dx * sy;
        a[(2 * i + 1, 8)] = -dx;
    }

    // h is the eigenvector of AᵀA with the smallest eigenvalue.
    let ata = a.transpose() * &a;
    let eig = SymmetricEigen::new(ata);
    let mut min_idx = 0;
    for i in 1..9 {
        if eig.eigenvalues[i].abs() < eig.eigenvalues[min_idx].abs() {
            min_idx = i;
        }
    }
    let col = eig.eigenvectors.column(min_idx);
    let h_norm = Matrix3::new(
        col[0], col[1], col[2],
        col[3], col[4], col[5],
        col[6], col[7], col[8],
    );

    // Denormalize: H = T_dst⁻¹ · H_norm · T_src
    let t_dst_inv = t_dst
        .try_inverse()
        .ok_or_else(|| Error::DegenerateQuad("destination normalization not invertible".into()))?;
    let mut h = t_dst_inv * h_norm * t_src;

    let scale = h[(2, 2)];
    if scale.abs() > EPS {
        h /= scale;
    }

    if h.iter().any(|v| !v.is_finite()) {
        return Err(Error::DegenerateQuad("non-finite homography".into()));
    }
    let det = h.determinant();
    if !det.is_finite() || det.abs() <= EPS {
        return Err(Error::DegenerateQuad("singular homography".into()));
    }
    Ok(h)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_h() -> Matrix3<f64> {
        Matrix3::new(
            0.9, -0.1, 40.0,
            0.05, 1.1, 25.0,
            1e-4, 2e-4, 1.0,
        )
    }

    #[test]
    fn exact_four_points_recover_matrix() {
        let h_true = sample_h();
        let src = [
            Point::new(0.0, 0.0),
            Point::new(99.0, 0.0),
            Point::new(99.0, 59.0),
            Point::new(0.0, 59.0),
        ];
        let dst: Vec<Point> = src.iter().map(|&p| project(&h_true, p).unwrap()).collect();
        let h = estimate_homography(&src, &dst).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                assert!((h[(i, j)] - h_true[(i, j)]).abs() < 1e-6, "H[{i},{j}]");
            }
        }
    }

    #[test]
    fn translation_maps_interior_points() {
        let src = [
            Point::new(0.0, 0.0),
            Point::new(9.0, 0.0),
            Point::new(9.0, 9.0),
            Point::new(0.0, 9.0),
        ];
        let dst: Vec<Point> = src.iter().map(|p| Point::new(p.x + 5.0, p.y + 3.0)).collect();
        let h = estimate_homography(&src, &dst).unwrap();
        let q = project(&h, Point::new(4.0, 6.0)).unwrap();
        assert!((q.x - 9.0).abs() < 1e-9);
        assert!((q.y - 9.0).abs() < 1e-9);
    }

    #[test]
    fn overdetermined_fit() {
        let h_true = sample_h();
        let src: Vec<Point> = (0..5)
            .flat_map(|i| (0..4).map(move |j| Point::new(i as f64 * 20.0, j as f64 * 15.0)))
            .collect();
        let dst: Vec<Point> = src.iter().map(|&p| project(&h_true, p).unwrap()).collect();
        let h = estimate_homography(&src, &dst).unwrap();
        let q = project(&h, Point::new(33.0, 21.0)).unwrap();
        let e = project(&h_true, Point::new(33.0, 21.0)).unwrap();
        assert!((q.x - e.x).abs() < 1e-6 && (q.y - e.y).abs() < 1e-6);
    }

    #[test]
    fn collinear_points_are_rejected() {
        let src = [
            Point::new(0.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(2.0, 2.0),
            Point::new(3.0, 3.0),
        ];
        let dst = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ];
        assert!(matches!(estimate_homography(&src, &dst), Err(Error::DegenerateQuad(_))));
    }

    #[test]
    fn three_collinear_corners_are_rejected() {
        let src = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ];
        let dst = [
            Point::new(0.0, 0.0),
            Point::new(5.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(0.0, 10.0),
        ];
        assert!(estimate_homography(&src, &dst).is_err());
    }

    #[test]
    fn coincident_and_too_few_points_are_rejected() {
        let same = [Point::new(3.0, 3.0); 4];
        let quad = [
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        ];
        assert!(estimate_homography(&quad, &same).is_err());
        assert!(estimate_homography(&quad[..3], &quad[..3]).is_err());
    }

    #[test]
    fn point_at_infinity_projects_to_none() {
        let h = Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0);
        assert!(project(&h, Point::new(0.0, 5.0)).is_none());
    }
}
