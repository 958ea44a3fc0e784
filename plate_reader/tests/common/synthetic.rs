#![allow(dead_code)]

use opencv::core::{Mat, Rect, Scalar, CV_8UC3};
use opencv::imgproc::{rectangle, FILLED, LINE_8};
use opencv::prelude::*;
use plate_reader::plate_detection::output_tensor::OutputTensor;
use plate_reader::plate_detection::segmentation::Glyph;
use plate_reader::{CharacterClassifier, PlateError, PlatePredictor, Result};

pub const IDENTITY: [f32; 6] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
pub const WIDE: [f32; 6] = [1.6, 0.0, 0.0, 0.0, 0.4, 0.0];

/// White BGR canvas.
pub fn blank(width: i32, height: i32) -> Mat {
    Mat::new_rows_cols_with_default(height, width, CV_8UC3, Scalar::all(255.0)).unwrap()
}

pub fn fill(image: &mut Mat, rect: Rect) {
    rectangle(image, rect, Scalar::all(0.0), FILLED, LINE_8, 0).unwrap();
}

/// A 280x100 plate with six 24x60 character blocks and two marks that must
/// not be read as characters: a thin underline and a small dot.
pub fn drawn_plate() -> Mat {
    let mut plate = blank(280, 100);
    for i in 0..6 {
        fill(&mut plate, Rect::new(20 + 40 * i, 20, 24, 60));
    }
    fill(&mut plate, Rect::new(20, 90, 240, 5));
    fill(&mut plate, Rect::new(255, 6, 6, 6));
    plate
}

/// Output grid with a single confident cell, zeros everywhere else.
pub fn tensor_with_cell(
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

/// Predictor that lights the centre cell of whatever grid it is asked for
/// and remembers the sizes it was fed.
pub struct CentreCellPredictor {
    pub prob: f32,
    pub affine: [f32; 6],
    pub seen: Vec<(i32, i32)>,
}

impl CentreCellPredictor {
    pub fn new(prob: f32, affine: [f32; 6]) -> Self {
        Self {
            prob,
            affine,
            seen: Vec::new(),
        }
    }
}

impl PlatePredictor for CentreCellPredictor {
    fn predict(&mut self, image: &Mat) -> Result<OutputTensor> {
        self.seen.push((image.cols(), image.rows()));
        let rows = (image.rows() / 16) as usize;
        let cols = (image.cols() / 16) as usize;
        Ok(tensor_with_cell(
            rows,
            cols,
            (rows / 2, cols / 2),
            self.prob,
            self.affine,
        ))
    }
}

/// Predictor that always returns the same tensor.
pub struct FixedPredictor(pub OutputTensor);

impl PlatePredictor for FixedPredictor {
    fn predict(&mut self, _image: &Mat) -> Result<OutputTensor> {
        Ok(self.0.clone())
    }
}

pub struct FailingPredictor;

impl PlatePredictor for FailingPredictor {
    fn predict(&mut self, _image: &Mat) -> Result<OutputTensor> {
        Err(PlateError::Config("model not loaded".to_string()))
    }
}

/// Labels glyphs from a fixed string by reading rank.
pub struct ScriptedClassifier(pub &'static str);

impl CharacterClassifier for ScriptedClassifier {
    fn classify(&mut self, glyph: &Glyph) -> Result<String> {
        Ok(self.0[glyph.rank..glyph.rank + 1].to_string())
    }
}
