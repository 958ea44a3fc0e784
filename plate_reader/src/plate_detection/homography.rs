use opencv::core::{self, Mat, Point2d};
use opencv::prelude::*;

use crate::error::{PlateError, Result};

type Matrix3 = [[f64; 3]; 3];

/// Sine of the smallest angle three points may span before they count as
/// collinear.
const COLLINEAR_SINE: f64 = 1e-6;
/// Ratio of the 8th to the 1st singular value below which the DLT system has
/// more than one solution.
const RANK_TOLERANCE: f64 = 1e-10;

/// Projective transform of the plane, stored row-major.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    m: Matrix3,
}

impl Homography {
    pub fn from_rows(m: Matrix3) -> Self {
        Self { m }
    }

    pub fn rows(&self) -> Matrix3 {
        self.m
    }

    /// Maps a point; `None` when it lands on the line at infinity.
    pub fn apply(&self, p: Point2d) -> Option<Point2d> {
        let m = &self.m;
        let x = m[0][0] * p.x + m[0][1] * p.y + m[0][2];
        let y = m[1][0] * p.x + m[1][1] * p.y + m[1][2];
        let w = m[2][0] * p.x + m[2][1] * p.y + m[2][2];
        if w.abs() <= f64::EPSILON || !w.is_finite() {
            return None;
        }
        Some(Point2d::new(x / w, y / w))
    }

    pub fn inverse(&self) -> Result<Homography> {
        let m = &self.m;
        let det = m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0]);
        let scale = m
            .iter()
            .flatten()
            .fold(0.0f64, |acc, v| acc.max(v.abs()));

        if !det.is_finite() || det.abs() <= f64::EPSILON * scale.powi(3) {
            return Err(PlateError::DegenerateGeometry(format!(
                "homography is singular (det {det:e})"
            )));
        }

        let inv_det = 1.0 / det;
        let mut inv = [[0.0f64; 3]; 3];
        inv[0][0] = (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det;
        inv[0][1] = (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det;
        inv[0][2] = (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det;
        inv[1][0] = (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det;
        inv[1][1] = (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det;
        inv[1][2] = (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det;
        inv[2][0] = (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det;
        inv[2][1] = (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det;
        inv[2][2] = (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det;

        Ok(Homography { m: inv })
    }

    pub fn to_mat(&self) -> Result<Mat> {
        Ok(Mat::from_slice_2d(&self.m)?)
    }
}

fn multiply(a: &Matrix3, b: &Matrix3) -> Matrix3 {
    let mut out = [[0.0f64; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

/// Fails when any three of the four points are (nearly) collinear or two
/// coincide.
pub fn check_non_collinear(points: &[Point2d; 4]) -> Result<()> {
    const TRIPLES: [[usize; 3]; 4] = [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];

    for [i, j, k] in TRIPLES {
        let (a, b, c) = (points[i], points[j], points[k]);
        let (abx, aby) = (b.x - a.x, b.y - a.y);
        let (acx, acy) = (c.x - a.x, c.y - a.y);
        let lengths = abx.hypot(aby) * acx.hypot(acy);
        let cross = abx * acy - aby * acx;

        if !lengths.is_finite() || lengths == 0.0 || cross.abs() < COLLINEAR_SINE * lengths {
            return Err(PlateError::DegenerateGeometry(format!(
                "points {i}, {j} and {k} are collinear: ({:.3}, {:.3}) ({:.3}, {:.3}) ({:.3}, {:.3})",
                a.x, a.y, b.x, b.y, c.x, c.y
            )));
        }
    }
    Ok(())
}

// Hartley normalization: centroid to the origin, mean distance sqrt(2).
fn normalizing_transform(points: &[Point2d; 4]) -> (Matrix3, Matrix3) {
    let cx = points.iter().map(|p| p.x).sum::<f64>() / 4.0;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / 4.0;
    let mean_dist = points
        .iter()
        .map(|p| (p.x - cx).hypot(p.y - cy))
        .sum::<f64>()
        / 4.0;
    let s = std::f64::consts::SQRT_2 / mean_dist;

    let t = [[s, 0.0, -s * cx], [0.0, s, -s * cy], [0.0, 0.0, 1.0]];
    let t_inv = [[1.0 / s, 0.0, cx], [0.0, 1.0 / s, cy], [0.0, 0.0, 1.0]];
    (t, t_inv)
}

fn transform_points(t: &Matrix3, points: &[Point2d; 4]) -> [Point2d; 4] {
    points.map(|p| Point2d::new(t[0][0] * p.x + t[0][2], t[1][1] * p.y + t[1][2]))
}

/// Solves the homography taking each `source` point onto the matching
/// `target` point with the direct linear transform.
///
/// Points are homogeneous with an implicit weight of one. The 8x9 system
/// gets two rows per correspondence and its null vector, the last right
/// singular vector, is the homography. Coordinates are normalized first so
/// pixel-sized inputs stay well conditioned.
pub fn solve_homography(source: &[Point2d; 4], target: &[Point2d; 4]) -> Result<Homography> {
    check_non_collinear(source)?;
    check_non_collinear(target)?;

    let (t_src, _) = normalizing_transform(source);
    let (t_dst, t_dst_inv) = normalizing_transform(target);
    let src = transform_points(&t_src, source);
    let dst = transform_points(&t_dst, target);

    let mut rows = [[0.0f64; 9]; 8];
    for i in 0..4 {
        let xi = [src[i].x, src[i].y, 1.0];
        let (tx, ty, tw) = (dst[i].x, dst[i].y, 1.0);
        for k in 0..3 {
            rows[2 * i][3 + k] = -tw * xi[k];
            rows[2 * i][6 + k] = ty * xi[k];
            rows[2 * i + 1][k] = tw * xi[k];
            rows[2 * i + 1][6 + k] = -tx * xi[k];
        }
    }

    let a = Mat::from_slice_2d(&rows)?;
    let mut w = Mat::default();
    let mut u = Mat::default();
    let mut vt = Mat::default();
    core::sv_decomp(&a, &mut w, &mut u, &mut vt, core::SVD_FULL_UV)?;

    let largest = *w.at::<f64>(0)?;
    let eighth = *w.at::<f64>(7)?;
    if !largest.is_finite() || !eighth.is_finite() || eighth <= RANK_TOLERANCE * largest {
        return Err(PlateError::DegenerateGeometry(format!(
            "correspondences do not fix a unique homography (singular values {largest:e}, {eighth:e})"
        )));
    }

    let mut h_norm = [[0.0f64; 3]; 3];
    for (idx, cell) in h_norm.iter_mut().flatten().enumerate() {
        *cell = *vt.at_2d::<f64>(8, idx as i32)?;
    }

    let mut h = multiply(&multiply(&t_dst_inv, &h_norm), &t_src);
    let norm = h.iter().flatten().map(|v| v * v).sum::<f64>().sqrt();
    if !norm.is_finite() || norm == 0.0 {
        return Err(PlateError::DegenerateGeometry(
            "homography collapsed to zero".to_string(),
        ));
    }
    let sign = if h[2][2] < 0.0 { -1.0 } else { 1.0 };
    for v in h.iter_mut().flatten() {
        *v *= sign / norm;
    }

    Ok(Homography::from_rows(h))
}
