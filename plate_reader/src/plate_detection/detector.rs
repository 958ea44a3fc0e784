use std::path::Path;

use opencv::core::{Mat, Scalar, Size, Vector, CV_32F};
use opencv::dnn;
use opencv::dnn::blob_from_image;
use opencv::dnn::Net;
use opencv::dnn::DNN_BACKEND_CUDA;
use opencv::dnn::DNN_BACKEND_OPENCV;
use opencv::dnn::DNN_TARGET_CPU;
use opencv::dnn::DNN_TARGET_CUDA;
use opencv::imgproc::resize;
use opencv::imgproc::INTER_LINEAR;
use opencv::prelude::*;
use tracing::{debug, info};

use super::output_tensor::{OutputTensor, MIN_CHANNELS};
use super::reconstruction::{reconstruct, NET_STRIDE};
use super::PlateCrop;
use crate::config::DetectionConfig;
use crate::error::{PlateError, Result};

/// The plate detection network, seen as a black box.
///
/// Takes the resized 8-bit BGR image and returns one cell per 16x16 input
/// block. Implementations own their input normalization. Inference needs
/// `&mut self`: a predictor is never shared between concurrent calls.
pub trait PlatePredictor {
    fn predict(&mut self, image: &Mat) -> Result<OutputTensor>;
}

/// Size the image is resized to before inference.
///
/// The smaller side goes to `min_dimension` scaled by the aspect ratio,
/// capped at `max_dimension`; the other side follows proportionally. Both
/// are then rounded up to a whole number of output cells.
pub fn network_input_size(image: Size, config: &DetectionConfig) -> Size {
    let short = f64::from(image.width.min(image.height));
    let long = f64::from(image.width.max(image.height));
    let side = ((long / short) * f64::from(config.min_dimension)) as i32;
    let bound = side.min(config.max_dimension);
    let factor = f64::from(bound) / short;

    let stride = NET_STRIDE as i32;
    let round_up = |v: f64| {
        let v = (v as i32).max(1);
        (v + stride - 1) / stride * stride
    };
    Size::new(
        round_up(f64::from(image.width) * factor),
        round_up(f64::from(image.height) * factor),
    )
}

fn check_output_shape(output: &OutputTensor, resized: Size) -> Result<()> {
    let stride = NET_STRIDE as i32;
    let rows = (resized.height / stride) as usize;
    let cols = (resized.width / stride) as usize;
    if output.rows() != rows || output.cols() != cols || output.channels() < MIN_CHANNELS {
        return Err(PlateError::PredictorShapeMismatch {
            expected: format!("({rows}, {cols}, >={MIN_CHANNELS})"),
            actual: format!("({}, {}, {})", output.rows(), output.cols(), output.channels()),
        });
    }
    Ok(())
}

/// Finds and rectifies the plates in `image`.
///
/// Fails with [`PlateError::NoPlateFound`] when no cell clears the
/// confidence threshold. Predictor errors are passed through untouched.
pub fn detect_plates<P>(
    predictor: &mut P,
    image: &Mat,
    config: &DetectionConfig,
) -> Result<Vec<PlateCrop>>
where
    P: PlatePredictor + ?Sized,
{
    if image.empty() {
        return Err(PlateError::EmptyImage);
    }

    let size = network_input_size(Size::new(image.cols(), image.rows()), config);
    let mut resized = Mat::default();
    resize(image, &mut resized, size, 0.0, 0.0, INTER_LINEAR)?;
    debug!(
        "resized {}x{} to {}x{} for detection",
        image.cols(),
        image.rows(),
        size.width,
        size.height
    );

    let output = predictor.predict(&resized)?;
    check_output_shape(&output, size)?;

    reconstruct(image, size, &output, &config.reconstruction)
}

/// Plate detector running an ONNX export through the OpenCV DNN module.
pub struct DnnPlatePredictor {
    net: Net,
}

impl DnnPlatePredictor {
    pub fn from_onnx(path: &Path, use_gpu: bool) -> Result<Self> {
        let path = path
            .to_str()
            .ok_or_else(|| PlateError::Config(format!("model path {path:?} is not UTF-8")))?;
        let mut net = dnn::read_net_from_onnx(path)?;

        if use_gpu {
            net.set_preferable_backend(DNN_BACKEND_CUDA)?;
            net.set_preferable_target(DNN_TARGET_CUDA)?;
        } else {
            net.set_preferable_backend(DNN_BACKEND_OPENCV)?;
            net.set_preferable_target(DNN_TARGET_CPU)?;
        }
        info!("loaded plate detector from {path} (gpu: {use_gpu})");

        Ok(Self { net })
    }
}

impl PlatePredictor for DnnPlatePredictor {
    fn predict(&mut self, image: &Mat) -> Result<OutputTensor> {
        // RGB in [0, 1], at the size we were given.
        let blob = blob_from_image(
            image,
            1.0 / 255.0,
            Size::new(image.cols(), image.rows()),
            Scalar::default(),
            true,
            false,
            CV_32F,
        )?;
        self.net.set_input(&blob, "", 1.0, Scalar::default())?;

        let output_names = self.net.get_unconnected_out_layers_names()?;
        let mut outputs = Vector::<Mat>::new();
        self.net.forward(&mut outputs, &output_names)?;

        let first = outputs.get(0)?;
        OutputTensor::from_dnn_output(&first)
    }
}

unsafe impl Send for DnnPlatePredictor {}
unsafe impl Sync for DnnPlatePredictor {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landscape_image_is_scaled_by_its_aspect_ratio() {
        // ratio 2, side 512, bound 512, factor 512 / 300.
        let size = network_input_size(Size::new(600, 300), &DetectionConfig::default());
        assert_eq!(size, Size::new(1024, 512));
    }

    #[test]
    fn very_wide_image_is_capped() {
        // ratio 4 gives side 1024, capped to 608.
        let size = network_input_size(Size::new(1600, 400), &DetectionConfig::default());
        assert_eq!(size.height, 608);
        assert_eq!(size.width, 2432);
    }

    #[test]
    fn sides_round_up_to_whole_cells() {
        let size = network_input_size(Size::new(250, 250), &DetectionConfig::default());
        assert_eq!(size, Size::new(256, 256));
        let odd = network_input_size(Size::new(333, 250), &DetectionConfig::default());
        assert_eq!(odd.width % 16, 0);
        assert_eq!(odd.height % 16, 0);
    }

    #[test]
    fn output_grid_must_match_the_input() {
        let output = OutputTensor::new(4, 5, 8, vec![0.0; 160]).unwrap();
        assert!(check_output_shape(&output, Size::new(80, 64)).is_ok());
        assert!(matches!(
            check_output_shape(&output, Size::new(64, 64)),
            Err(PlateError::PredictorShapeMismatch { .. })
        ));
    }
}
