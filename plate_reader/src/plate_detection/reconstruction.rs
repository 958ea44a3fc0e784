use opencv::core::{Mat, Point2d, Scalar, Size, BORDER_CONSTANT};
use opencv::imgproc::{warp_perspective, INTER_LINEAR};
use opencv::prelude::*;
use tracing::{debug, info};

use super::homography::solve_homography;
use super::nms::non_max_suppression;
use super::output_tensor::OutputTensor;
use super::region::Region;
use super::{PlateCrop, PlateLayout};
use crate::config::ReconstructionConfig;
use crate::error::{PlateError, Result};

/// Downsampling between network input pixels and output cells: four
/// stride-2 pooling stages.
pub const NET_STRIDE: f64 = 16.0;
/// Plate side, in output cells, the detector's affine parameters are
/// expressed against.
pub const PLATE_SIDE: f64 = ((208.0 + 40.0) / 2.0) / NET_STRIDE;

const PLATE_CLASS: i32 = 0;

/// Unit square, top-left first and clockwise.
const BASE: [(f64, f64); 4] = [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)];

/// Quad proposals decoded from one output tensor.
#[derive(Debug, Clone, Default)]
pub struct Candidates {
    /// The full affine quads, used for rectification.
    pub affine: Vec<Region>,
    /// Same cells with shear and rotation dropped, used to pick the layout.
    pub frontal: Vec<Region>,
}

impl PlateLayout {
    pub fn from_frontal(region: &Region) -> Self {
        let wh = region.wh();
        if wh.x / wh.y < Self::TWO_LINES_MAX_ASPECT {
            PlateLayout::TwoLines
        } else {
            PlateLayout::OneLine
        }
    }
}

/// Applies a 2x3 affine to the unit square and maps the result from cell
/// units around `(col, row)` to coordinates normalized by the network input.
fn project_quad(
    affine: &[[f64; 3]; 2],
    row: usize,
    col: usize,
    grid: (f64, f64),
) -> [Point2d; 4] {
    let center = (col as f64 + 0.5, row as f64 + 0.5);
    BASE.map(|(bx, by)| {
        let x = affine[0][0] * bx + affine[0][1] * by + affine[0][2];
        let y = affine[1][0] * bx + affine[1][1] * by + affine[1][2];
        Point2d::new(
            (x * PLATE_SIDE + center.0) / grid.0,
            (y * PLATE_SIDE + center.1) / grid.1,
        )
    })
}

/// Turns every cell above `threshold` into an affine and a frontal quad.
pub fn decode_candidates(output: &OutputTensor, resized: Size, threshold: f32) -> Candidates {
    let grid = (
        f64::from(resized.width) / NET_STRIDE,
        f64::from(resized.height) / NET_STRIDE,
    );
    let mut candidates = Candidates::default();

    for row in 0..output.rows() {
        for col in 0..output.cols() {
            let prob = output.probability(row, col);
            // NaN never exceeds the threshold.
            if prob.is_nan() || prob <= threshold {
                continue;
            }

            let p = output.affine(row, col).map(f64::from);
            let sx = p[0].max(0.0);
            let sy = p[4].max(0.0);
            let affine = [[sx, p[1], p[2]], [p[3], sy, p[5]]];
            let frontal = [[sx, 0.0, 0.0], [0.0, sy, 0.0]];

            candidates.affine.push(Region::from_corners(
                PLATE_CLASS,
                project_quad(&affine, row, col, grid),
                Some(prob),
            ));
            candidates.frontal.push(Region::from_corners(
                PLATE_CLASS,
                project_quad(&frontal, row, col, grid),
                Some(prob),
            ));
        }
    }
    candidates
}

/// Rectifies every plate found in `output` out of `original`.
///
/// `resized` is the size of the image the network saw. Crops come back in
/// descending confidence, all warped to the layout chosen from the most
/// confident frontal box.
pub fn reconstruct(
    original: &Mat,
    resized: Size,
    output: &OutputTensor,
    config: &ReconstructionConfig,
) -> Result<Vec<PlateCrop>> {
    let candidates = decode_candidates(output, resized, config.confidence_threshold);
    debug!(
        "{} cells above {:.2} on a {}x{} grid",
        candidates.affine.len(),
        config.confidence_threshold,
        output.cols(),
        output.rows()
    );

    let plates = non_max_suppression(candidates.affine, config.nms_iou_threshold);
    let frontal = non_max_suppression(candidates.frontal, config.nms_iou_threshold);
    let best_frontal = frontal.first().ok_or(PlateError::NoPlateFound)?;

    let layout = PlateLayout::from_frontal(best_frontal);
    let out_size = layout.size();
    let (out_w, out_h) = (f64::from(out_size.width), f64::from(out_size.height));
    let target = [
        Point2d::new(0.0, 0.0),
        Point2d::new(out_w, 0.0),
        Point2d::new(out_w, out_h),
        Point2d::new(0.0, out_h),
    ];
    let (img_w, img_h) = (f64::from(original.cols()), f64::from(original.rows()));

    let mut crops = Vec::with_capacity(plates.len());
    for region in &plates {
        let corners = region
            .corners()
            .map(|c| Point2d::new(c.x * img_w, c.y * img_h));
        let homography = solve_homography(&corners, &target)?;

        let mut image = Mat::default();
        warp_perspective(
            original,
            &mut image,
            &homography.to_mat()?,
            out_size,
            INTER_LINEAR,
            BORDER_CONSTANT,
            Scalar::all(0.0),
        )?;

        let confidence = region.confidence().unwrap_or_default();
        info!(
            "plate {:?} at ({:.0}, {:.0}) confidence {:.3}",
            layout, corners[0].x, corners[0].y, confidence
        );
        crops.push(PlateCrop {
            image,
            corners,
            layout,
            confidence,
        });
    }
    Ok(crops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Vec3b, CV_8UC3};

    /// One hot cell at (row, col) with the given affine, zeros elsewhere.
    fn tensor_with_cell(
        rows: usize,
        cols: usize,
        at: (usize, usize),
        prob: f32,
        affine: [f32; 6],
    ) -> OutputTensor {
        let mut data = vec![0.0f32; rows * cols * 8];
        let base = (at.0 * cols + at.1) * 8;
        data[base] = prob;
        data[base + 2..base + 8].copy_from_slice(&affine);
        OutputTensor::new(rows, cols, 8, data).unwrap()
    }

    fn assert_near(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-9, "expected {expected}, got {actual}");
    }

    #[test]
    fn identity_affine_decodes_to_a_centred_square() {
        let output = tensor_with_cell(16, 16, (8, 8), 0.9, [1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        let candidates = decode_candidates(&output, Size::new(256, 256), 0.5);
        assert_eq!(candidates.affine.len(), 1);
        assert_eq!(candidates.frontal.len(), 1);

        let quad = candidates.affine[0].corners();
        let lo = (8.5 - 0.5 * PLATE_SIDE) / 16.0;
        let hi = (8.5 + 0.5 * PLATE_SIDE) / 16.0;
        assert_near(quad[0].x, lo);
        assert_near(quad[0].y, lo);
        assert_near(quad[2].x, hi);
        assert_near(quad[2].y, hi);
        assert_eq!(candidates.affine[0].confidence(), Some(0.9));
    }

    #[test]
    fn negative_scales_are_clamped() {
        let output = tensor_with_cell(4, 4, (1, 2), 0.8, [-1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        let candidates = decode_candidates(&output, Size::new(64, 64), 0.5);
        let wh = candidates.affine[0].wh();
        assert_near(wh.x, 0.0);
        assert!(wh.y > 0.0);
    }

    #[test]
    fn frontal_drops_shear() {
        let output = tensor_with_cell(8, 8, (3, 3), 0.7, [1.0, 0.4, 0.0, 0.3, 0.5, 0.0]);
        let candidates = decode_candidates(&output, Size::new(128, 128), 0.5);
        let frontal = candidates.frontal[0];
        assert_ne!(candidates.affine[0].corners(), frontal.corners());
        // Axis-aligned: top edge horizontal, left edge vertical.
        let c = frontal.corners();
        assert_near(c[0].y, c[1].y);
        assert_near(c[0].x, c[3].x);
        assert_near(frontal.wh().x / frontal.wh().y, 2.0);
    }

    #[test]
    fn threshold_is_exclusive() {
        let output = tensor_with_cell(4, 4, (0, 0), 0.5, [1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        assert!(decode_candidates(&output, Size::new(64, 64), 0.5).affine.is_empty());
    }

    #[test]
    fn nan_probability_is_not_a_candidate() {
        let output = tensor_with_cell(4, 4, (2, 2), f32::NAN, [1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        let candidates = decode_candidates(&output, Size::new(64, 64), 0.5);
        assert!(candidates.affine.is_empty());
        assert!(candidates.frontal.is_empty());
    }

    #[test]
    fn layout_follows_frontal_aspect() {
        let square = Region::new(0, Point2d::new(0.0, 0.0), Point2d::new(1.0, 1.0), None);
        let wide = Region::new(0, Point2d::new(0.0, 0.0), Point2d::new(4.0, 1.0), None);
        let edge = Region::new(0, Point2d::new(0.0, 0.0), Point2d::new(1.7, 1.0), None);
        assert_eq!(PlateLayout::from_frontal(&square), PlateLayout::TwoLines);
        assert_eq!(PlateLayout::from_frontal(&wide), PlateLayout::OneLine);
        assert_eq!(PlateLayout::from_frontal(&edge), PlateLayout::OneLine);
    }

    #[test]
    fn nothing_above_threshold_is_no_plate() {
        let output = tensor_with_cell(4, 4, (1, 1), 0.2, [1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        let image = Mat::new_rows_cols_with_default(128, 128, CV_8UC3, Scalar::all(0.0)).unwrap();
        let err = reconstruct(&image, Size::new(64, 64), &output, &ReconstructionConfig::default())
            .unwrap_err();
        assert!(err.is_no_plate());
    }

    #[test]
    fn warps_a_wide_plate_into_the_one_line_rectangle() {
        let output = tensor_with_cell(16, 16, (8, 8), 0.95, [1.6, 0.0, 0.0, 0.0, 0.4, 0.0]);
        let image =
            Mat::new_rows_cols_with_default(512, 512, CV_8UC3, Scalar::new(10.0, 200.0, 30.0, 0.0))
                .unwrap();

        let crops =
            reconstruct(&image, Size::new(256, 256), &output, &ReconstructionConfig::default())
                .unwrap();
        assert_eq!(crops.len(), 1);
        let crop = &crops[0];
        assert_eq!(crop.layout, PlateLayout::OneLine);
        assert_eq!(crop.image.cols(), 470);
        assert_eq!(crop.image.rows(), 110);
        assert_eq!(crop.confidence, 0.95);

        // Corners are in original pixels: 512 / 16 = 32 pixels per cell.
        let half_w = 0.5 * 1.6 * PLATE_SIDE;
        let half_h = 0.5 * 0.4 * PLATE_SIDE;
        assert!((crop.corners[0].x - (8.5 - half_w) * 32.0).abs() < 1e-6);
        assert!((crop.corners[0].y - (8.5 - half_h) * 32.0).abs() < 1e-6);
        assert!((crop.corners[2].x - (8.5 + half_w) * 32.0).abs() < 1e-6);
        assert!((crop.corners[2].y - (8.5 + half_h) * 32.0).abs() < 1e-6);

        // The quad lies inside the uniform image, so the crop is uniform too.
        let centre = crop.image.at_2d::<Vec3b>(55, 235).unwrap();
        assert_eq!(centre.0, [10, 200, 30]);
    }

    #[test]
    fn every_survivor_is_warped_with_the_best_frontal_layout() {
        // Square plate at (4, 4) and a wide one at (12, 8); their boxes are
        // disjoint so both survive suppression.
        let mut data = vec![0.0f32; 16 * 16 * 8];
        for (row, col, prob, affine) in [
            (4usize, 4usize, 0.9f32, [1.0f32, 0.0, 0.0, 0.0, 1.0, 0.0]),
            (12, 8, 0.7, [1.6, 0.0, 0.0, 0.0, 0.4, 0.0]),
        ] {
            let base = (row * 16 + col) * 8;
            data[base] = prob;
            data[base + 2..base + 8].copy_from_slice(&affine);
        }
        let output = OutputTensor::new(16, 16, 8, data).unwrap();
        let image =
            Mat::new_rows_cols_with_default(512, 512, CV_8UC3, Scalar::all(128.0)).unwrap();

        let crops =
            reconstruct(&image, Size::new(256, 256), &output, &ReconstructionConfig::default())
                .unwrap();

        assert_eq!(crops.len(), 2);
        let confidences: Vec<f32> = crops.iter().map(|c| c.confidence).collect();
        assert_eq!(confidences, vec![0.9, 0.7]);
        for crop in &crops {
            assert_eq!(crop.layout, PlateLayout::TwoLines);
            assert_eq!((crop.image.cols(), crop.image.rows()), (280, 200));
        }
        // The wide quad keeps its own corners even though its layout is not.
        assert!(crops[1].corners[1].x - crops[1].corners[0].x > 300.0);
    }

    #[test]
    fn collapsed_quad_is_degenerate() {
        let output = tensor_with_cell(16, 16, (8, 8), 0.9, [-1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        let image = Mat::new_rows_cols_with_default(512, 512, CV_8UC3, Scalar::all(0.0)).unwrap();

        let err = reconstruct(&image, Size::new(256, 256), &output, &ReconstructionConfig::default())
            .unwrap_err();
        assert!(matches!(err, PlateError::DegenerateGeometry(_)));
    }
}
