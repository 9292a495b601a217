//! Planar homographies between the canonical sheet frame and scan pixels.
//!
//! Estimation is the classic DLT with `h33 = 1`, solved in the least-squares
//! sense on Hartley-normalized coordinates (centroid at the origin, mean
//! distance √2) so that sheets scanned at 600 dpi do not blow up the
//! conditioning of the normal equations.
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

const EPS: f32 = 1e-9;

/// Map a single point, `None` if it lands at infinity.
pub fn apply_homography(h: &Matrix3<f32>, p: [f32; 2]) -> Option<[f32; 2]> {
    let v = h * Vector3::new(p[0], p[1], 1.0);
    let w = v[2];
    if !w.is_finite() || w.abs() <= EPS || !v[0].is_finite() || !v[1].is_finite() {
        return None;
    }
    Some([v[0] / w, v[1] / w])
}

pub fn apply_homography_points(h: &Matrix3<f32>, pts: &[[f32; 2]]) -> Option<Vec<[f32; 2]>> {
    pts.iter().map(|&p| apply_homography(h, p)).collect()
}

fn normalizing_transform(pts: &[[f32; 2]]) -> Option<Matrix3<f64>> {
    let n = pts.len() as f64;
    let cx = pts.iter().map(|p| p[0] as f64).sum::<f64>() / n;
    let cy = pts.iter().map(|p| p[1] as f64).sum::<f64>() / n;
    let mean_dist = pts
        .iter()
        .map(|p| ((p[0] as f64 - cx).powi(2) + (p[1] as f64 - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if !mean_dist.is_finite() || mean_dist <= 1e-12 {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    Some(Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0))
}

/// Estimate `H` with `dst ≈ H · src` from at least four correspondences.
///
/// Returns `None` for fewer than four pairs, mismatched lengths or a
/// degenerate configuration (e.g. three collinear points).
pub fn estimate_homography(src: &[[f32; 2]], dst: &[[f32; 2]]) -> Option<Matrix3<f32>> {
    if src.len() != dst.len() || src.len() < 4 {
        return None;
    }
    let t_src = normalizing_transform(src)?;
    let t_dst = normalizing_transform(dst)?;

    let n = src.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 8);
    let mut b = DVector::<f64>::zeros(2 * n);
    for (i, (s, d)) in src.iter().zip(dst).enumerate() {
        let ps = t_src * Vector3::new(s[0] as f64, s[1] as f64, 1.0);
        let pd = t_dst * Vector3::new(d[0] as f64, d[1] as f64, 1.0);
        let (x, y) = (ps[0], ps[1]);
        let (u, v) = (pd[0], pd[1]);
        let r0 = 2 * i;
        let r1 = r0 + 1;
        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -u * x;
        a[(r0, 7)] = -u * y;
        b[r0] = u;
        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -v * x;
        a[(r1, 7)] = -v * y;
        b[r1] = v;
    }
    let ata = a.transpose() * &a;
    let atb = a.transpose() * &b;
    let sv = ata.clone().svd(false, false).singular_values;
    let (sv_max, sv_min) = (sv.max(), sv.min());
    if !(sv_max > 0.0) || sv_min / sv_max < 1e-12 {
        return None;
    }
    let h = ata.lu().solve(&atb)?;
    let hn = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);
    let full = t_dst.try_inverse()? * hn * t_src;
    let scale = full[(2, 2)];
    if !scale.is_finite() || scale.abs() < 1e-12 || full.determinant().abs() < 1e-18 {
        return None;
    }
    let out: Matrix3<f32> = (full / scale).cast::<f32>();
    out.iter().all(|v| v.is_finite()).then_some(out)
}

/// Root-mean-square distance between `H · src` and `dst`, in `dst` pixels.
pub fn reprojection_rmse(h: &Matrix3<f32>, src: &[[f32; 2]], dst: &[[f32; 2]]) -> Option<f32> {
    if src.is_empty() || src.len() != dst.len() {
        return None;
    }
    let mapped = apply_homography_points(h, src)?;
    let acc: f32 = mapped
        .iter()
        .zip(dst)
        .map(|(p, d)| (p[0] - d[0]).powi(2) + (p[1] - d[1]).powi(2))
        .sum();
    Some((acc / src.len() as f32).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: [f32; 2], b: [f32; 2], tol: f32) -> bool {
        (a[0] - b[0]).abs() < tol && (a[1] - b[1]).abs() < tol
    }

    #[test]
    fn recovers_known_projective_map() {
        let truth = Matrix3::new(1.1, 0.05, 30.0, -0.08, 0.95, 12.0, 1e-4, -5e-5, 1.0);
        let src = [[0.0, 0.0], [800.0, 0.0], [800.0, 1100.0], [0.0, 1100.0], [400.0, 550.0]];
        let dst = apply_homography_points(&truth, &src).unwrap();
        let h = estimate_homography(&src, &dst).unwrap();
        for (s, d) in src.iter().zip(&dst) {
            assert!(close(apply_homography(&h, *s).unwrap(), *d, 1e-2));
        }
        assert!(reprojection_rmse(&h, &src, &dst).unwrap() < 1e-2);
    }

    #[test]
    fn rejects_collinear_points() {
        let src = [[0.0, 0.0], [1.0, 1.0], [2.0, 2.0], [3.0, 3.0]];
        let dst = [[0.0, 0.0], [2.0, 2.0], [4.0, 4.0], [6.0, 6.0]];
        assert!(estimate_homography(&src, &dst).is_none());
    }

    #[test]
    fn requires_four_pairs() {
        let src = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        assert!(estimate_homography(&src, &src).is_none());
    }
}
