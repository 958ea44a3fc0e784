use std::fs;
use std::path::Path;

use opencv::core::{Mat, Scalar, Size, Vector, CV_32F};
use opencv::dnn;
use opencv::dnn::blob_from_image;
use opencv::dnn::Net;
use opencv::dnn::DNN_BACKEND_CUDA;
use opencv::dnn::DNN_BACKEND_OPENCV;
use opencv::dnn::DNN_TARGET_CPU;
use opencv::dnn::DNN_TARGET_CUDA;
use opencv::imgproc::{cvt_color, COLOR_GRAY2BGR};
use opencv::prelude::*;
use tracing::{debug, info};

use super::detector::{detect_plates, PlatePredictor};
use super::segmentation::{segment_characters, Glyph};
use super::PlateCrop;
use crate::config::ReaderConfig;
use crate::error::{PlateError, Result};

/// Labels a single character image.
pub trait CharacterClassifier {
    fn classify(&mut self, glyph: &Glyph) -> Result<String>;
}

/// Reads one label per line, skipping blank lines.
pub fn load_labels(path: &Path) -> Result<Vec<String>> {
    let labels: Vec<String> = fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();
    if labels.is_empty() {
        return Err(PlateError::Config(format!(
            "label file {} is empty",
            path.display()
        )));
    }
    Ok(labels)
}

/// Glyph classifier running an ONNX export through the OpenCV DNN module.
///
/// Glyphs are replicated to three channels and resized to the square
/// network input; the highest scoring output index picks the label.
pub struct DnnCharacterClassifier {
    net: Net,
    labels: Vec<String>,
    input_size: i32,
}

impl DnnCharacterClassifier {
    pub const INPUT_SIZE: i32 = 80;

    pub fn from_files(model: &Path, labels: &Path, use_gpu: bool) -> Result<Self> {
        let labels = load_labels(labels)?;
        let model = model
            .to_str()
            .ok_or_else(|| PlateError::Config(format!("model path {model:?} is not UTF-8")))?;
        let mut net = dnn::read_net_from_onnx(model)?;

        if use_gpu {
            net.set_preferable_backend(DNN_BACKEND_CUDA)?;
            net.set_preferable_target(DNN_TARGET_CUDA)?;
        } else {
            net.set_preferable_backend(DNN_BACKEND_OPENCV)?;
            net.set_preferable_target(DNN_TARGET_CPU)?;
        }
        info!(
            "loaded character classifier from {model} with {} labels",
            labels.len()
        );

        Ok(Self {
            net,
            labels,
            input_size: Self::INPUT_SIZE,
        })
    }
}

fn argmax(scores: &[f32]) -> Option<usize> {
    scores
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(idx, _)| idx)
}

impl CharacterClassifier for DnnCharacterClassifier {
    fn classify(&mut self, glyph: &Glyph) -> Result<String> {
        let mut bgr = Mat::default();
        cvt_color(&glyph.image, &mut bgr, COLOR_GRAY2BGR, 0)?;

        // The classifier was trained on raw 0-255 intensities.
        let blob = blob_from_image(
            &bgr,
            1.0,
            Size::new(self.input_size, self.input_size),
            Scalar::default(),
            false,
            false,
            CV_32F,
        )?;
        self.net.set_input(&blob, "", 1.0, Scalar::default())?;

        let output_names = self.net.get_unconnected_out_layers_names()?;
        let mut outputs = Vector::<Mat>::new();
        self.net.forward(&mut outputs, &output_names)?;
        let scores = outputs.get(0)?;

        let best = argmax(scores.data_typed::<f32>()?).ok_or_else(|| {
            PlateError::PredictorShapeMismatch {
                expected: format!("{} class scores", self.labels.len()),
                actual: "no scores".to_string(),
            }
        })?;
        self.labels
            .get(best)
            .cloned()
            .ok_or_else(|| PlateError::PredictorShapeMismatch {
                expected: format!("{} class scores", self.labels.len()),
                actual: format!("class index {best}"),
            })
    }
}

unsafe impl Send for DnnCharacterClassifier {}
unsafe impl Sync for DnnCharacterClassifier {}

/// Concatenates the labels of `glyphs`, which must already be in reading
/// order.
pub fn classify_glyphs<C>(classifier: &mut C, glyphs: &[Glyph]) -> Result<String>
where
    C: CharacterClassifier + ?Sized,
{
    let mut text = String::new();
    for glyph in glyphs {
        text.push_str(&classifier.classify(glyph)?);
    }
    Ok(text)
}

#[derive(Debug, Clone)]
pub struct PlateReading {
    pub crop: PlateCrop,
    pub glyphs: Vec<Glyph>,
    pub text: String,
}

/// Detection, segmentation and classification behind one call.
pub struct PlateReader<P, C> {
    predictor: P,
    classifier: C,
    config: ReaderConfig,
}

impl<P: PlatePredictor, C: CharacterClassifier> PlateReader<P, C> {
    pub fn new(predictor: P, classifier: C, config: ReaderConfig) -> Self {
        Self {
            predictor,
            classifier,
            config,
        }
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Reads every plate in `image`, most confident first. An image without
    /// plates gives an empty vector.
    pub fn read(&mut self, image: &Mat) -> Result<Vec<PlateReading>> {
        let crops = match detect_plates(&mut self.predictor, image, &self.config.detection) {
            Ok(crops) => crops,
            Err(PlateError::NoPlateFound) => {
                debug!("no plate in {}x{} image", image.cols(), image.rows());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let mut readings = Vec::with_capacity(crops.len());
        for crop in crops {
            let glyphs = segment_characters(&crop.image, &self.config.segmentation)?;
            let text = classify_glyphs(&mut self.classifier, &glyphs)?;
            info!(
                "read {:?} from {:?} plate ({} glyphs)",
                text,
                crop.layout,
                glyphs.len()
            );
            readings.push(PlateReading { crop, glyphs, text });
        }
        Ok(readings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Rect, CV_8UC1};
    use std::io::Write;

    struct ByRank(Vec<&'static str>);

    impl CharacterClassifier for ByRank {
        fn classify(&mut self, glyph: &Glyph) -> Result<String> {
            Ok(self.0[glyph.rank].to_string())
        }
    }

    fn glyph(rank: usize) -> Glyph {
        Glyph {
            image: Mat::new_rows_cols_with_default(60, 30, CV_8UC1, Scalar::all(0.0)).unwrap(),
            bounds: Rect::new(rank as i32 * 40, 0, 30, 60),
            rank,
        }
    }

    #[test]
    fn labels_are_concatenated_in_order() {
        let mut classifier = ByRank(vec!["5", "1", "A"]);
        let glyphs: Vec<Glyph> = (0..3).map(glyph).collect();
        assert_eq!(classify_glyphs(&mut classifier, &glyphs).unwrap(), "51A");
        assert_eq!(classify_glyphs(&mut classifier, &[]).unwrap(), "");
    }

    #[test]
    fn argmax_picks_the_highest_score() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn label_file_skips_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0\n1\n\n A \n").unwrap();
        assert_eq!(load_labels(file.path()).unwrap(), vec!["0", "1", "A"]);
    }

    #[test]
    fn empty_label_file_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            load_labels(file.path()),
            Err(PlateError::Config(_))
        ));
    }
}
