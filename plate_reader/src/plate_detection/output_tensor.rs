use opencv::core::{Mat, CV_32F};
use opencv::prelude::*;

use crate::error::{PlateError, Result};

pub const PROBABILITY_CHANNEL: usize = 0;
/// First of the six affine parameter channels.
pub const AFFINE_CHANNEL: usize = 2;
pub const MIN_CHANNELS: usize = AFFINE_CHANNEL + 6;

/// Dense detector output: one probability and one affine transform per grid
/// cell, stored row-major as (rows, cols, channels).
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
    rows: usize,
    cols: usize,
    channels: usize,
    data: Vec<f32>,
}

impl OutputTensor {
    pub fn new(rows: usize, cols: usize, channels: usize, data: Vec<f32>) -> Result<Self> {
        if channels < MIN_CHANNELS || data.len() != rows * cols * channels {
            return Err(PlateError::PredictorShapeMismatch {
                expected: format!(
                    "({rows}, {cols}, >={MIN_CHANNELS}) with {} values",
                    rows * cols * channels.max(MIN_CHANNELS)
                ),
                actual: format!("({rows}, {cols}, {channels}) with {} values", data.len()),
            });
        }
        Ok(Self {
            rows,
            cols,
            channels,
            data,
        })
    }

    /// Reads a `CV_32F` blob shaped (1, H, W, C) or (H, W, C).
    pub fn from_dnn_output(blob: &Mat) -> Result<Self> {
        let dims: Vec<i32> = blob.mat_size().iter().copied().collect();
        let shape = match dims.as_slice() {
            [1, h, w, c] | [h, w, c] => (*h as usize, *w as usize, *c as usize),
            _ => {
                return Err(PlateError::PredictorShapeMismatch {
                    expected: "(1, H, W, C) or (H, W, C)".to_string(),
                    actual: format!("{dims:?}"),
                })
            }
        };
        if blob.typ() != CV_32F {
            return Err(PlateError::PredictorShapeMismatch {
                expected: "CV_32F elements".to_string(),
                actual: format!("opencv type {}", blob.typ()),
            });
        }

        let data = if blob.is_continuous() {
            blob.data_typed::<f32>()?.to_vec()
        } else {
            blob.try_clone()?.data_typed::<f32>()?.to_vec()
        };
        Self::new(shape.0, shape.1, shape.2, data)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    fn cell(&self, row: usize, col: usize) -> &[f32] {
        let start = (row * self.cols + col) * self.channels;
        &self.data[start..start + self.channels]
    }

    pub fn probability(&self, row: usize, col: usize) -> f32 {
        self.cell(row, col)[PROBABILITY_CHANNEL]
    }

    pub fn affine(&self, row: usize, col: usize) -> [f32; 6] {
        let mut affine = [0.0f32; 6];
        affine.copy_from_slice(&self.cell(row, col)[AFFINE_CHANNEL..AFFINE_CHANNEL + 6]);
        affine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, Vector};

    #[test]
    fn rejects_too_few_channels() {
        let err = OutputTensor::new(2, 2, 6, vec![0.0; 24]).unwrap_err();
        assert!(matches!(err, PlateError::PredictorShapeMismatch { .. }));
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(OutputTensor::new(2, 3, 8, vec![0.0; 47]).is_err());
    }

    #[test]
    fn indexes_cells_row_major() {
        let mut data = vec![0.0f32; 2 * 3 * 8];
        let base = (3 + 2) * 8;
        data[base] = 0.75;
        for k in 0..6 {
            data[base + 2 + k] = k as f32;
        }
        let tensor = OutputTensor::new(2, 3, 8, data).unwrap();
        assert_eq!(tensor.probability(1, 2), 0.75);
        assert_eq!(tensor.affine(1, 2), [0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(tensor.probability(0, 0), 0.0);
    }

    #[test]
    fn reads_four_dimensional_blobs() {
        let sizes = Vector::<i32>::from_slice(&[1, 2, 2, 8]);
        let blob = Mat::new_nd_vec_with_default(&sizes, CV_32F, Scalar::all(0.5)).unwrap();
        let tensor = OutputTensor::from_dnn_output(&blob).unwrap();
        assert_eq!((tensor.rows(), tensor.cols(), tensor.channels()), (2, 2, 8));
        assert_eq!(tensor.probability(1, 1), 0.5);
    }

    #[test]
    fn two_dimensional_blob_is_a_mismatch() {
        let blob = Mat::new_rows_cols_with_default(4, 8, CV_32F, Scalar::all(0.0)).unwrap();
        assert!(matches!(
            OutputTensor::from_dnn_output(&blob),
            Err(PlateError::PredictorShapeMismatch { .. })
        ));
    }
}
